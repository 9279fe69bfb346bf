//! Single simulated vehicle for ad-hoc testing.
//!
//! Drives one vehicle through a single crossing against live peers (and a
//! live admission server under the serial policy). Useful for poking at a
//! running deployment from the command line:
//!
//!   cargo run -p imc-cli --bin run_vehicle -- \
//!       --port 9100 --entry E1 --exit X3 --peers 127.0.0.1:9101

use anyhow::Context;
use clap::{Parser, ValueEnum};
use imc_cli::sim::{drive_vehicle, SimNavigation};
use imc_core::messages::VehicleId;
use imc_core::policy::AdmissionPolicy;
use imc_core::topology::IntersectionSpecs;
use imc_vehicle::{BeaconLink, ServerClient, VehicleConfig, VehicleCoordinator};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, ValueEnum)]
enum PolicyType {
    Serial,
    Parallel,
    Reservation,
}

/// One simulated vehicle
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Beacon port; also this vehicle's identity
    #[arg(long)]
    port: u16,

    /// Entry point id (e.g. E1)
    #[arg(long)]
    entry: String,

    /// Exit point id (e.g. X3)
    #[arg(long)]
    exit: String,

    /// Admission policy
    #[arg(long, value_enum, default_value = "parallel")]
    policy: PolicyType,

    /// Admission server URL (serial policy)
    #[arg(long, default_value = "http://localhost:4000")]
    url: String,

    /// Peer beacon addresses, host:port
    #[arg(long, value_delimiter = ',')]
    peers: Vec<SocketAddr>,

    /// How long the crossing takes, in milliseconds
    #[arg(long, default_value_t = 3000)]
    cross_duration_ms: u64,

    /// Delay before the vehicle reaches the entry, in milliseconds
    #[arg(long, default_value_t = 1000)]
    approach_ms: u64,

    /// Give up when not admitted within this many seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imc_vehicle=info".into()),
        )
        .init();

    let args = Args::parse();
    let policy = match args.policy {
        PolicyType::Serial => AdmissionPolicy::Serial,
        PolicyType::Parallel => AdmissionPolicy::Parallel,
        PolicyType::Reservation => AdmissionPolicy::Reservation,
    };

    let bind = SocketAddr::from(([127, 0, 0, 1], args.port));
    let link = Arc::new(
        BeaconLink::open(bind, args.peers.clone())
            .await
            .with_context(|| format!("binding beacon socket on {bind}"))?,
    );

    let topology = Arc::new(IntersectionSpecs::two_lane_four_way());
    let mut coordinator = VehicleCoordinator::new(
        VehicleId::new("127.0.0.1", args.port),
        args.entry.clone(),
        args.exit.clone(),
        policy,
        topology,
        Arc::new(SimNavigation::default()),
        VehicleConfig {
            cross_duration_ms: args.cross_duration_ms,
            ..VehicleConfig::default()
        },
    )?;
    if policy == AdmissionPolicy::Serial {
        coordinator = coordinator.with_server(ServerClient::new(args.url.clone()));
    }
    let coordinator = Arc::new(coordinator);
    let loops = coordinator.spawn_loops(Some(link));

    println!(
        "Vehicle 127.0.0.1:{} taking {} -> {} ({policy:?}, {} peer(s))",
        args.port,
        args.entry,
        args.exit,
        args.peers.len()
    );

    let report = drive_vehicle(
        coordinator,
        Instant::now(),
        Duration::from_millis(args.approach_ms),
        Duration::from_millis(200),
        Duration::from_millis(args.cross_duration_ms),
        Duration::from_secs(args.timeout_secs),
    )
    .await?;

    for handle in loops {
        handle.abort();
    }
    println!(
        "Done: entered {}ms, admitted {}ms (waited {}ms), exited {}ms",
        report.entered_ms,
        report.crossed_ms,
        report.crossed_ms - report.entered_ms,
        report.exited_ms
    );
    Ok(())
}
