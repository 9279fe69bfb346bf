//! Wire message types shared by vehicles and the admission server.
//!
//! Beacons travel as unacknowledged JSON datagrams; the server messages ride
//! a reliable point-to-point channel. All protocol timestamps are integer
//! milliseconds since the Unix epoch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Network identity of a vehicle: address plus port.
///
/// The derived ordering doubles as the tie-breaking total order for equal
/// ETAs in the reservation policy.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VehicleId {
    pub host: String,
    pub port: u16,
}

impl VehicleId {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A vehicle's locally-known status, broadcast to neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleStatus {
    /// Stopped at the entry, waiting for admission
    Requesting,
    /// Inside the intersection
    Crossing,
    /// Cleared the intersection
    Exited,
}

/// Periodic broadcast announcing a vehicle's status and intended path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beacon {
    pub sender: VehicleId,
    pub status: VehicleStatus,
    pub entry: String,
    pub exit: String,
    pub seqno: u64,
    pub sent_at_ms: u64,
    /// Estimated arrival at the intersection (reservation policy only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_ms: Option<u64>,
    /// Estimated time needed to clear the intersection (reservation only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_duration_ms: Option<u64>,
}

/// Vehicle -> server: ask for exclusive intersection access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRequest {
    pub vehicle: VehicleId,
    pub entry: String,
    pub exit: String,
    #[serde(default)]
    pub eta_ms: Option<u64>,
    #[serde(default)]
    pub cross_duration_ms: Option<u64>,
}

/// Server -> vehicle: current standing of an access request.
///
/// `granted == true` is the GrantAccess signal; vehicles poll for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessStatus {
    pub granted: bool,
    /// Zero-based position in the FCFS queue, if queued
    pub position: Option<usize>,
}

/// Vehicle -> server: the vehicle has cleared the intersection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exiting {
    pub vehicle: VehicleId,
}

/// Server -> vehicle: exit handshake acknowledgment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitingAcknowledged {
    pub vehicle: VehicleId,
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
