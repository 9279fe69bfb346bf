//! Drives simulated vehicles through the intersection lifecycle.
//!
//! The runner stands in for the navigation layer: it raises the approach,
//! entry, and exit sensor events on a schedule and records when each
//! vehicle was admitted. Beacons travel over real loopback UDP sockets, so
//! a scenario exercises the same transport path as deployed vehicles.

use anyhow::{bail, Context, Result};
use imc_core::messages::VehicleId;
use imc_core::policy::AdmissionPolicy;
use imc_core::topology::IntersectionSpecs;
use imc_vehicle::{
    BeaconLink, DriveState, Navigation, ServerClient, VehicleConfig, VehicleCoordinator,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

use super::scenarios::Scenario;

const POLL_PERIOD: Duration = Duration::from_millis(20);

/// Navigation stub for simulated vehicles: motion is just a flag.
#[derive(Default)]
pub struct SimNavigation {
    paused: AtomicBool,
}

impl SimNavigation {
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

impl Navigation for SimNavigation {
    fn pause_motion(&self) {
        self.paused.store(true, Ordering::SeqCst);
        tracing::debug!("sim: motion paused");
    }

    fn resume_motion(&self) {
        self.paused.store(false, Ordering::SeqCst);
        tracing::debug!("sim: motion resumed");
    }
}

/// How to run a scenario.
pub struct SimOptions {
    pub policy: AdmissionPolicy,
    /// Admission server URL; required for [`AdmissionPolicy::Serial`]
    pub server_url: Option<String>,
    pub vehicle: VehicleConfig,
    /// Delay between the approach and entry sensor events
    pub entry_after: Duration,
    /// Give up on a vehicle not admitted within this window
    pub admission_timeout: Duration,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            policy: AdmissionPolicy::Parallel,
            server_url: None,
            vehicle: VehicleConfig::default(),
            entry_after: Duration::from_millis(200),
            admission_timeout: Duration::from_secs(30),
        }
    }
}

/// Timings for one vehicle's crossing, in ms since scenario start.
#[derive(Debug)]
pub struct VehicleReport {
    pub vehicle: VehicleId,
    pub entered_ms: u64,
    pub crossed_ms: u64,
    pub exited_ms: u64,
}

/// Raise the lifecycle events for one vehicle and report its timings.
pub async fn drive_vehicle(
    coordinator: Arc<VehicleCoordinator>,
    start: Instant,
    approach_after: Duration,
    entry_after: Duration,
    cross_duration: Duration,
    admission_timeout: Duration,
) -> Result<VehicleReport> {
    sleep(approach_after).await;
    coordinator.on_approaching();

    sleep(entry_after).await;
    coordinator.on_entering();
    let entered_ms = start.elapsed().as_millis() as u64;

    timeout(admission_timeout, async {
        while coordinator.state() != DriveState::Crossing {
            sleep(POLL_PERIOD).await;
        }
    })
    .await
    .with_context(|| format!("{}: not admitted in time", coordinator.id()))?;
    let crossed_ms = start.elapsed().as_millis() as u64;

    sleep(cross_duration).await;
    coordinator.on_exiting();
    let exited_ms = start.elapsed().as_millis() as u64;

    Ok(VehicleReport {
        vehicle: coordinator.id().clone(),
        entered_ms,
        crossed_ms,
        exited_ms,
    })
}

/// Run every vehicle of a scenario to completion.
pub async fn run_scenario(scenario: Scenario, options: SimOptions) -> Result<Vec<VehicleReport>> {
    if options.policy == AdmissionPolicy::Serial && options.server_url.is_none() {
        bail!("the serial policy needs a server URL");
    }

    let topology = Arc::new(IntersectionSpecs::two_lane_four_way());
    let start = Instant::now();
    let mut loop_handles = Vec::new();
    let mut drivers = Vec::new();

    for plan in &scenario.vehicles {
        let peers: Vec<SocketAddr> = scenario
            .vehicles
            .iter()
            .filter(|other| other.port != plan.port)
            .map(|other| SocketAddr::from(([127, 0, 0, 1], other.port)))
            .collect();
        let bind = SocketAddr::from(([127, 0, 0, 1], plan.port));
        let link = Arc::new(
            BeaconLink::open(bind, peers)
                .await
                .with_context(|| format!("binding beacon socket on {bind}"))?,
        );

        let mut coordinator = VehicleCoordinator::new(
            VehicleId::new("127.0.0.1", plan.port),
            plan.entry.clone(),
            plan.exit.clone(),
            options.policy,
            topology.clone(),
            Arc::new(SimNavigation::default()),
            options.vehicle.clone(),
        )?;
        if let Some(url) = &options.server_url {
            coordinator = coordinator.with_server(ServerClient::new(url.clone()));
        }
        let coordinator = Arc::new(coordinator);
        loop_handles.extend(coordinator.spawn_loops(Some(link)));

        drivers.push(tokio::spawn(drive_vehicle(
            coordinator,
            start,
            Duration::from_millis(plan.approach_after_ms),
            options.entry_after,
            Duration::from_millis(options.vehicle.cross_duration_ms),
            options.admission_timeout,
        )));
    }

    let mut reports = Vec::with_capacity(drivers.len());
    for driver in drivers {
        reports.push(driver.await.context("driver task panicked")??);
    }
    for handle in loop_handles {
        handle.abort();
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::scenarios::{create_crossing_scenario, create_opposing_scenario};
    use imc_server::loops::run_grant_loop;
    use imc_server::state::AppState;
    use imc_vehicle::RetryPolicy;

    fn fast_vehicle() -> VehicleConfig {
        VehicleConfig {
            cycle_ms: 20,
            beacon_period_ms: 40,
            request_timeout_ms: 500,
            poll_ms: 25,
            retry: RetryPolicy {
                base_delay: Duration::from_millis(20),
                ..RetryPolicy::default()
            },
            stale_after: Some(Duration::from_millis(500)),
            cross_duration_ms: 200,
        }
    }

    fn fast_options() -> SimOptions {
        SimOptions {
            vehicle: fast_vehicle(),
            entry_after: Duration::from_millis(50),
            admission_timeout: Duration::from_secs(10),
            ..SimOptions::default()
        }
    }

    async fn spawn_server() -> String {
        let state = Arc::new(AppState::new(32));
        let app = imc_server::api::routes().with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        tokio::spawn(run_grant_loop(state, Duration::from_millis(20)));
        format!("http://{addr}")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn opposing_vehicles_complete_under_the_parallel_policy() {
        let scenario = create_opposing_scenario(42110);
        let reports = run_scenario(scenario, fast_options()).await.unwrap();

        assert_eq!(reports.len(), 2);
        for report in &reports {
            assert!(report.entered_ms <= report.crossed_ms);
            assert!(report.crossed_ms < report.exited_ms);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn serial_crossing_vehicles_never_overlap() {
        let url = spawn_server().await;
        let scenario = create_crossing_scenario(42120);
        let options = SimOptions {
            policy: AdmissionPolicy::Serial,
            server_url: Some(url),
            ..fast_options()
        };
        let reports = run_scenario(scenario, options).await.unwrap();

        let [a, b] = &reports[..] else {
            panic!("expected two reports");
        };
        // One vehicle must fully clear before the other is admitted.
        assert!(
            a.exited_ms <= b.crossed_ms || b.exited_ms <= a.crossed_ms,
            "crossings overlapped: {a:?} vs {b:?}"
        );
    }
}
