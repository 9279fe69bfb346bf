//! Static intersection topology and the path conflict predicate.
//!
//! The topology is pure data: roads, entry/exit points with positions in a
//! local metric frame, and a mapping from each entry to the exits reachable
//! from it. `will_intersect` is the only geometric operation policies rely
//! on; it is symmetric and deterministic so policies can be tested against
//! any topology.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Approach heading, one of the eight cardinal/intercardinal directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Heading {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

/// Position in the intersection-local frame, meters. +x is east, +y is north.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A point where vehicles enter the intersection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryPoint {
    pub id: String,
    pub heading: Heading,
    pub position: Point,
}

/// A point where vehicles leave the intersection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitPoint {
    pub id: String,
    pub heading: Heading,
    pub position: Point,
}

/// One physical road segment: the ordered entry and exit points on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Road {
    pub name: String,
    pub entries: Vec<String>,
    pub exits: Vec<String>,
}

/// Errors detected while validating a topology at startup.
///
/// Any of these indicates a broken deployment configuration and is fatal;
/// none of them can occur at runtime once construction succeeded.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("road {road} references undeclared entry point {id}")]
    UndeclaredEntry { road: String, id: String },
    #[error("road {road} references undeclared exit point {id}")]
    UndeclaredExit { road: String, id: String },
    #[error("entry point {0} has no valid-exit mapping")]
    UnmappedEntry(String),
    #[error("valid-exit mapping references unknown entry point {0}")]
    UnknownMappedEntry(String),
    #[error("valid exits for entry {entry} reference unknown exit point {id}")]
    UnknownMappedExit { entry: String, id: String },
}

/// Static description of one intersection.
#[derive(Debug, Clone)]
pub struct IntersectionSpecs {
    roads: Vec<Road>,
    entries: HashMap<String, EntryPoint>,
    exits: HashMap<String, ExitPoint>,
    valid_exits: HashMap<String, Vec<String>>,
}

impl IntersectionSpecs {
    /// Build and validate a topology.
    ///
    /// Every entry point referenced by a road must be declared and must
    /// appear exactly once as a key of `valid_exits`; every referenced exit
    /// point must be declared.
    pub fn new(
        roads: Vec<Road>,
        entries: Vec<EntryPoint>,
        exits: Vec<ExitPoint>,
        valid_exits: HashMap<String, Vec<String>>,
    ) -> Result<Self, TopologyError> {
        let entries: HashMap<String, EntryPoint> =
            entries.into_iter().map(|e| (e.id.clone(), e)).collect();
        let exits: HashMap<String, ExitPoint> =
            exits.into_iter().map(|x| (x.id.clone(), x)).collect();

        for road in &roads {
            for id in &road.entries {
                if !entries.contains_key(id) {
                    return Err(TopologyError::UndeclaredEntry {
                        road: road.name.clone(),
                        id: id.clone(),
                    });
                }
                if !valid_exits.contains_key(id) {
                    return Err(TopologyError::UnmappedEntry(id.clone()));
                }
            }
            for id in &road.exits {
                if !exits.contains_key(id) {
                    return Err(TopologyError::UndeclaredExit {
                        road: road.name.clone(),
                        id: id.clone(),
                    });
                }
            }
        }

        for (entry, reachable) in &valid_exits {
            if !entries.contains_key(entry) {
                return Err(TopologyError::UnknownMappedEntry(entry.clone()));
            }
            for id in reachable {
                if !exits.contains_key(id) {
                    return Err(TopologyError::UnknownMappedExit {
                        entry: entry.clone(),
                        id: id.clone(),
                    });
                }
            }
        }

        Ok(Self {
            roads,
            entries,
            exits,
            valid_exits,
        })
    }

    pub fn roads(&self) -> &[Road] {
        &self.roads
    }

    pub fn entry(&self, id: &str) -> Option<&EntryPoint> {
        self.entries.get(id)
    }

    pub fn exit(&self, id: &str) -> Option<&ExitPoint> {
        self.exits.get(id)
    }

    /// Exits reachable from an entry (no U-turns by default).
    pub fn valid_exits(&self, entry: &str) -> Option<&[String]> {
        self.valid_exits.get(entry).map(|v| v.as_slice())
    }

    /// Whether the paths `entry1 -> exit1` and `entry2 -> exit2` cross
    /// inside the intersection.
    ///
    /// Symmetric in the two paths and evaluated purely from the four
    /// endpoints. Sharing an entry (same approach lane) or an exit (merge)
    /// counts as a conflict. Unknown ids conflict with everything, which is
    /// the fail-safe answer; validated topologies never hit that case.
    pub fn will_intersect(&self, entry1: &str, exit1: &str, entry2: &str, exit2: &str) -> bool {
        if entry1 == entry2 || exit1 == exit2 {
            return true;
        }
        let (Some(e1), Some(x1), Some(e2), Some(x2)) = (
            self.entries.get(entry1),
            self.exits.get(exit1),
            self.entries.get(entry2),
            self.exits.get(exit2),
        ) else {
            return true;
        };
        segments_cross(e1.position, x1.position, e2.position, x2.position)
    }

    /// The canonical two-lane four-way intersection.
    ///
    /// Arms are numbered clockwise from north: roads 1..4 with entries
    /// `E1..E4` and exits `X1..X4`. Entry and exit points sit on opposite
    /// lanes of each arm (right-hand traffic), so opposing through
    /// movements such as `E1 -> X3` and `E3 -> X1` do not conflict.
    pub fn two_lane_four_way() -> Self {
        // Half-width of the approach (arm length) and half-lane offset.
        let arm = 20.0;
        let lane = 1.75;

        let entries = vec![
            entry("E1", Heading::South, -lane, arm),
            entry("E2", Heading::West, arm, lane),
            entry("E3", Heading::North, lane, -arm),
            entry("E4", Heading::East, -arm, -lane),
        ];
        let exits = vec![
            exit("X1", Heading::North, lane, arm),
            exit("X2", Heading::East, arm, -lane),
            exit("X3", Heading::South, -lane, -arm),
            exit("X4", Heading::West, -arm, lane),
        ];
        let roads = vec![
            road("north", "E1", "X1"),
            road("east", "E2", "X2"),
            road("south", "E3", "X3"),
            road("west", "E4", "X4"),
        ];

        let mut valid_exits = HashMap::new();
        for i in 1..=4u32 {
            let reachable: Vec<String> = (1..=4u32)
                .filter(|j| *j != i)
                .map(|j| format!("X{j}"))
                .collect();
            valid_exits.insert(format!("E{i}"), reachable);
        }

        Self::new(roads, entries, exits, valid_exits)
            .expect("built-in four-way topology is valid")
    }
}

fn entry(id: &str, heading: Heading, x: f64, y: f64) -> EntryPoint {
    EntryPoint {
        id: id.to_string(),
        heading,
        position: Point::new(x, y),
    }
}

fn exit(id: &str, heading: Heading, x: f64, y: f64) -> ExitPoint {
    ExitPoint {
        id: id.to_string(),
        heading,
        position: Point::new(x, y),
    }
}

fn road(name: &str, entry: &str, exit: &str) -> Road {
    Road {
        name: name.to_string(),
        entries: vec![entry.to_string()],
        exits: vec![exit.to_string()],
    }
}

const EPS: f64 = 1e-9;

/// Orientation of the ordered triple (a, b, c): positive for counter-
/// clockwise, negative for clockwise, zero for collinear.
fn orientation(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn on_segment(a: Point, b: Point, p: Point) -> bool {
    p.x <= a.x.max(b.x) + EPS
        && p.x >= a.x.min(b.x) - EPS
        && p.y <= a.y.max(b.y) + EPS
        && p.y >= a.y.min(b.y) - EPS
}

/// Segment intersection including touching endpoints and collinear overlap.
fn segments_cross(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    let o1 = orientation(a1, a2, b1);
    let o2 = orientation(a1, a2, b2);
    let o3 = orientation(b1, b2, a1);
    let o4 = orientation(b1, b2, a2);

    if (o1 * o2) < -EPS && (o3 * o4) < -EPS {
        return true;
    }

    (o1.abs() <= EPS && on_segment(a1, a2, b1))
        || (o2.abs() <= EPS && on_segment(a1, a2, b2))
        || (o3.abs() <= EPS && on_segment(b1, b2, a1))
        || (o4.abs() <= EPS && on_segment(b1, b2, a2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_way() -> IntersectionSpecs {
        IntersectionSpecs::two_lane_four_way()
    }

    fn all_paths(topo: &IntersectionSpecs) -> Vec<(String, String)> {
        let mut paths = Vec::new();
        for i in 1..=4 {
            let entry = format!("E{i}");
            for exit in topo.valid_exits(&entry).unwrap() {
                paths.push((entry.clone(), exit.clone()));
            }
        }
        paths
    }

    #[test]
    fn conflict_predicate_is_symmetric() {
        let topo = four_way();
        let paths = all_paths(&topo);
        for (e1, x1) in &paths {
            for (e2, x2) in &paths {
                assert_eq!(
                    topo.will_intersect(e1, x1, e2, x2),
                    topo.will_intersect(e2, x2, e1, x1),
                    "asymmetric for ({e1},{x1}) vs ({e2},{x2})"
                );
            }
        }
    }

    #[test]
    fn opposing_through_movements_do_not_conflict() {
        let topo = four_way();
        assert!(!topo.will_intersect("E1", "X3", "E3", "X1"));
        assert!(!topo.will_intersect("E2", "X4", "E4", "X2"));
    }

    #[test]
    fn perpendicular_through_movements_conflict() {
        let topo = four_way();
        assert!(topo.will_intersect("E1", "X3", "E4", "X2"));
        assert!(topo.will_intersect("E3", "X1", "E2", "X4"));
    }

    #[test]
    fn left_turn_crosses_opposing_through() {
        let topo = four_way();
        // Northbound left turn vs southbound through.
        assert!(topo.will_intersect("E3", "X4", "E1", "X3"));
    }

    #[test]
    fn right_turn_avoids_opposing_through() {
        let topo = four_way();
        // Northbound right turn stays clear of the southbound through lane.
        assert!(!topo.will_intersect("E3", "X2", "E1", "X3"));
    }

    #[test]
    fn shared_entry_or_exit_conflicts() {
        let topo = four_way();
        assert!(topo.will_intersect("E1", "X2", "E1", "X3"));
        assert!(topo.will_intersect("E1", "X2", "E3", "X2"));
    }

    #[test]
    fn unknown_ids_conflict_fail_safe() {
        let topo = four_way();
        assert!(topo.will_intersect("E9", "X3", "E3", "X1"));
    }

    #[test]
    fn every_entry_maps_to_three_exits() {
        let topo = four_way();
        for i in 1..=4 {
            let entry = format!("E{i}");
            let exits = topo.valid_exits(&entry).unwrap();
            assert_eq!(exits.len(), 3, "no U-turn for {entry}");
            assert!(!exits.contains(&format!("X{i}")));
        }
    }

    #[test]
    fn undeclared_entry_is_a_startup_error() {
        let roads = vec![road("north", "E1", "X1")];
        let exits = vec![exit("X1", Heading::North, 1.0, 20.0)];
        let result = IntersectionSpecs::new(roads, Vec::new(), exits, HashMap::new());
        assert!(matches!(result, Err(TopologyError::UndeclaredEntry { .. })));
    }

    #[test]
    fn unmapped_entry_is_a_startup_error() {
        let roads = vec![road("north", "E1", "X1")];
        let entries = vec![entry("E1", Heading::South, -1.0, 20.0)];
        let exits = vec![exit("X1", Heading::North, 1.0, 20.0)];
        let result = IntersectionSpecs::new(roads, entries, exits, HashMap::new());
        assert!(matches!(result, Err(TopologyError::UnmappedEntry(_))));
    }
}
