//! Pre-defined intersection scenarios for testing.

/// One simulated vehicle: identity port (doubles as its beacon port), the
/// path it will take, and when it starts approaching.
#[derive(Debug, Clone)]
pub struct VehiclePlan {
    pub port: u16,
    pub entry: String,
    pub exit: String,
    pub approach_after_ms: u64,
}

/// A named scenario consisting of multiple vehicles with paths.
pub struct Scenario {
    pub name: String,
    pub vehicles: Vec<VehiclePlan>,
}

fn plan(port: u16, entry: &str, exit: &str, approach_after_ms: u64) -> VehiclePlan {
    VehiclePlan {
        port,
        entry: entry.to_string(),
        exit: exit.to_string(),
        approach_after_ms,
    }
}

/// Two vehicles on perpendicular through movements (paths cross at the
/// center).
pub fn create_crossing_scenario(base_port: u16) -> Scenario {
    Scenario {
        name: "crossing".to_string(),
        vehicles: vec![
            plan(base_port, "E1", "X3", 0),
            plan(base_port + 1, "E2", "X4", 0),
        ],
    }
}

/// Two vehicles on opposing through movements (no conflict; both may cross
/// at once under the decentralized policies).
pub fn create_opposing_scenario(base_port: u16) -> Scenario {
    Scenario {
        name: "opposing".to_string(),
        vehicles: vec![
            plan(base_port, "E1", "X3", 0),
            plan(base_port + 1, "E3", "X1", 0),
        ],
    }
}

/// Four vehicles, one per arm, arriving staggered.
pub fn create_converging_scenario(base_port: u16) -> Scenario {
    let paths = [("E1", "X3"), ("E2", "X4"), ("E3", "X1"), ("E4", "X2")];
    let vehicles = paths
        .iter()
        .enumerate()
        .map(|(i, (entry, exit))| plan(base_port + i as u16, entry, exit, i as u64 * 300))
        .collect();

    Scenario {
        name: "converging".to_string(),
        vehicles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imc_core::IntersectionSpecs;

    #[test]
    fn crossing_scenario_has_two_vehicles() {
        let scenario = create_crossing_scenario(9100);
        assert_eq!(scenario.name, "crossing");
        assert_eq!(scenario.vehicles.len(), 2);
    }

    #[test]
    fn converging_scenario_has_four_staggered_vehicles() {
        let scenario = create_converging_scenario(9100);
        assert_eq!(scenario.vehicles.len(), 4);
        assert!(scenario.vehicles.windows(2).all(|pair| {
            pair[0].approach_after_ms < pair[1].approach_after_ms && pair[0].port != pair[1].port
        }));
    }

    #[test]
    fn every_planned_path_exists_in_the_topology() {
        let topology = IntersectionSpecs::two_lane_four_way();
        for scenario in [
            create_crossing_scenario(9100),
            create_opposing_scenario(9100),
            create_converging_scenario(9100),
        ] {
            for vehicle in &scenario.vehicles {
                let exits = topology
                    .valid_exits(&vehicle.entry)
                    .unwrap_or_else(|| panic!("unknown entry {}", vehicle.entry));
                assert!(
                    exits.contains(&vehicle.exit),
                    "{} -> {} not reachable",
                    vehicle.entry,
                    vehicle.exit
                );
            }
        }
    }

    #[test]
    fn opposing_paths_do_not_conflict_but_crossing_paths_do() {
        let topology = IntersectionSpecs::two_lane_four_way();
        let opposing = create_opposing_scenario(9100);
        let [a, b] = &opposing.vehicles[..] else {
            panic!("expected two vehicles");
        };
        assert!(!topology.will_intersect(&a.entry, &a.exit, &b.entry, &b.exit));

        let crossing = create_crossing_scenario(9100);
        let [a, b] = &crossing.vehicles[..] else {
            panic!("expected two vehicles");
        };
        assert!(topology.will_intersect(&a.entry, &a.exit, &b.entry, &b.exit));
    }
}
