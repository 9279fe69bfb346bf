//! Server configuration from environment.

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    /// Maximum number of queued access requests
    pub queue_capacity: usize,
    /// Period of the background grant loop, milliseconds
    pub grant_tick_ms: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            server_port: env::var("IMC_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4000),
            queue_capacity: env::var("IMC_QUEUE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(32),
            grant_tick_ms: env::var("IMC_GRANT_TICK_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
        }
    }
}
