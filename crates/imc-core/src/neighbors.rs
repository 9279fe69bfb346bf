//! Per-vehicle table of other vehicles' last-known state.
//!
//! Fed by inbound beacons on the receive path, read by admission policies on
//! the evaluation path. A single mutex guards the table; policy evaluation
//! happens on a snapshot, never under the lock.

use crate::messages::{Beacon, VehicleId, VehicleStatus};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Last-known state of one neighbor, mirroring its latest beacon.
#[derive(Debug, Clone)]
pub struct NeighborState {
    pub vehicle: VehicleId,
    pub status: VehicleStatus,
    pub entry: String,
    pub exit: String,
    pub seqno: u64,
    pub sent_at_ms: u64,
    pub eta_ms: Option<u64>,
    pub cross_duration_ms: Option<u64>,
    pub last_seen: Instant,
}

impl NeighborState {
    fn from_beacon(beacon: &Beacon, now: Instant) -> Self {
        Self {
            vehicle: beacon.sender.clone(),
            status: beacon.status,
            entry: beacon.entry.clone(),
            exit: beacon.exit.clone(),
            seqno: beacon.seqno,
            sent_at_ms: beacon.sent_at_ms,
            eta_ms: beacon.eta_ms,
            cross_duration_ms: beacon.cross_duration_ms,
            last_seen: now,
        }
    }

    /// Overwrite the mutable fields in place. The entry itself is never
    /// replaced, so identity is preserved across policy layers.
    fn apply(&mut self, beacon: &Beacon, now: Instant) {
        self.status = beacon.status;
        self.entry = beacon.entry.clone();
        self.exit = beacon.exit.clone();
        self.seqno = beacon.seqno;
        self.sent_at_ms = beacon.sent_at_ms;
        self.eta_ms = beacon.eta_ms;
        self.cross_duration_ms = beacon.cross_duration_ms;
        self.last_seen = now;
    }
}

/// Mutex-guarded neighbor table.
///
/// Beacons always win last-write: a stale beacon arriving after a fresher
/// one rolls the neighbor's apparent state back. That is an accepted
/// limitation of the unordered beacon channel.
pub struct NeighborTracker {
    own_id: VehicleId,
    stale_after: Option<Duration>,
    table: Mutex<HashMap<VehicleId, NeighborState>>,
}

impl NeighborTracker {
    /// Tracker without expiry: a silent neighbor stays visible forever.
    pub fn new(own_id: VehicleId) -> Self {
        Self {
            own_id,
            stale_after: None,
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Tracker that drops neighbors not heard from within `stale_after`.
    pub fn with_stale_after(own_id: VehicleId, stale_after: Duration) -> Self {
        Self {
            stale_after: Some(stale_after),
            ..Self::new(own_id)
        }
    }

    pub fn own_id(&self) -> &VehicleId {
        &self.own_id
    }

    /// Apply an inbound beacon. Self-beacons are ignored.
    ///
    /// Returns whether the table was touched. Never blocks on anything but
    /// the table mutex.
    pub fn update(&self, beacon: &Beacon) -> bool {
        if beacon.sender == self.own_id {
            return false;
        }
        let now = Instant::now();
        let mut table = self.table.lock().expect("neighbor table poisoned");
        table
            .entry(beacon.sender.clone())
            .and_modify(|state| state.apply(beacon, now))
            .or_insert_with(|| NeighborState::from_beacon(beacon, now));
        true
    }

    /// Consistent point-in-time copy of all live neighbors.
    ///
    /// Neighbors silent for longer than the staleness window are excluded;
    /// with no window configured everything ever heard from is returned.
    pub fn snapshot(&self) -> Vec<NeighborState> {
        let now = Instant::now();
        let mut table = self.table.lock().expect("neighbor table poisoned");
        if let Some(ttl) = self.stale_after {
            table.retain(|_, state| now.duration_since(state.last_seen) <= ttl);
        }
        table.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.table.lock().expect("neighbor table poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
