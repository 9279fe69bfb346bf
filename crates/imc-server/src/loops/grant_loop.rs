//! Background FCFS grant loop.
//!
//! Grant decisions run here on a fixed tick rather than inside request
//! handlers, so the HTTP path never blocks on queue bookkeeping and the
//! at-most-one-grant invariant has a single writer.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::state::AppState;

/// Start the grant loop. Runs forever.
pub async fn run_grant_loop(state: Arc<AppState>, tick: Duration) {
    let mut ticker = interval(tick);
    loop {
        ticker.tick().await;
        if let Some(vehicle) = state.grant_next() {
            tracing::info!("granted intersection access to {vehicle}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imc_core::messages::{AccessRequest, VehicleId};

    #[tokio::test(start_paused = true)]
    async fn loop_grants_the_head_within_one_tick() {
        let state = Arc::new(AppState::new(8));
        state.request_access(&AccessRequest {
            vehicle: VehicleId::new("10.0.0.1", 9000),
            entry: "E1".to_string(),
            exit: "X3".to_string(),
            eta_ms: None,
            cross_duration_ms: None,
        });

        tokio::spawn(run_grant_loop(state.clone(), Duration::from_millis(50)));
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(state.holder(), Some(VehicleId::new("10.0.0.1", 9000)));
    }
}
