//! In-memory admission state: the FCFS queue plus per-vehicle records.
//!
//! The queue is the safety-critical part and lives behind one mutex; the
//! per-vehicle records are observability only and live in a DashMap keyed
//! by vehicle identity.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use imc_core::messages::{AccessRequest, AccessStatus, VehicleId};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One queued access request.
///
/// Created on RequestAccess, removed once the Exiting handshake has been
/// acknowledged.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub vehicle: VehicleId,
    pub entry: String,
    pub exit: String,
    pub eta_ms: Option<u64>,
    /// Estimated time of clearance, when the vehicle announced its timing
    pub etc_ms: Option<u64>,
    pub enqueued_at: DateTime<Utc>,
    pub granted: bool,
}

/// Access history of one vehicle, for the listing endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct VehicleRecord {
    pub vehicle: VehicleId,
    pub entry: String,
    pub exit: String,
    pub requested_at: DateTime<Utc>,
    pub granted_at: Option<DateTime<Utc>>,
    pub exited_at: Option<DateTime<Utc>>,
    /// Completed crossings under this server
    pub crossings: u32,
}

/// Outcome of a RequestAccess message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Newly enqueued at this position
    Queued(usize),
    /// Duplicate request; still at this position
    AlreadyQueued(usize),
    /// Queue at capacity, request dropped
    Full,
}

#[derive(Default)]
struct QueueInner {
    entries: VecDeque<QueueEntry>,
    /// The single vehicle currently holding a grant, if any
    holder: Option<VehicleId>,
}

/// Application state shared across handlers and the grant loop.
pub struct AppState {
    queue: Mutex<QueueInner>,
    capacity: usize,
    vehicles: DashMap<String, VehicleRecord>,
}

impl AppState {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(QueueInner::default()),
            capacity,
            vehicles: DashMap::new(),
        }
    }

    /// Enqueue an access request. Duplicate requests from an already-queued
    /// vehicle are idempotent no-ops.
    pub fn request_access(&self, request: &AccessRequest) -> RequestOutcome {
        let mut queue = self.queue.lock().expect("queue poisoned");

        if let Some(position) = queue
            .entries
            .iter()
            .position(|e| e.vehicle == request.vehicle)
        {
            return RequestOutcome::AlreadyQueued(position);
        }
        if queue.entries.len() >= self.capacity {
            return RequestOutcome::Full;
        }

        let now = Utc::now();
        queue.entries.push_back(QueueEntry {
            vehicle: request.vehicle.clone(),
            entry: request.entry.clone(),
            exit: request.exit.clone(),
            eta_ms: request.eta_ms,
            etc_ms: request
                .eta_ms
                .zip(request.cross_duration_ms)
                .map(|(eta, duration)| eta.saturating_add(duration)),
            enqueued_at: now,
            granted: false,
        });
        let position = queue.entries.len() - 1;

        self.vehicles
            .entry(request.vehicle.to_string())
            .and_modify(|record| {
                record.entry = request.entry.clone();
                record.exit = request.exit.clone();
                record.requested_at = now;
                record.granted_at = None;
                record.exited_at = None;
            })
            .or_insert_with(|| VehicleRecord {
                vehicle: request.vehicle.clone(),
                entry: request.entry.clone(),
                exit: request.exit.clone(),
                requested_at: now,
                granted_at: None,
                exited_at: None,
                crossings: 0,
            });

        RequestOutcome::Queued(position)
    }

    /// Grant the queue head if nothing is currently granted.
    ///
    /// At most one vehicle holds a grant at any time; the previous holder
    /// must complete the Exiting handshake before the next grant.
    pub fn grant_next(&self) -> Option<VehicleId> {
        let mut queue = self.queue.lock().expect("queue poisoned");
        if queue.holder.is_some() {
            return None;
        }
        let head = queue.entries.front_mut()?;
        head.granted = true;
        let vehicle = head.vehicle.clone();
        queue.holder = Some(vehicle.clone());
        if let Some(mut record) = self.vehicles.get_mut(&vehicle.to_string()) {
            record.granted_at = Some(Utc::now());
        }
        Some(vehicle)
    }

    /// Standing of one vehicle's request, for grant polling.
    pub fn status_of(&self, vehicle: &VehicleId) -> AccessStatus {
        let queue = self.queue.lock().expect("queue poisoned");
        let position = queue.entries.iter().position(|e| e.vehicle == *vehicle);
        AccessStatus {
            granted: queue.holder.as_ref() == Some(vehicle),
            position,
        }
    }

    /// Complete the Exiting handshake: drop the vehicle's queue entry and
    /// release its grant. Idempotent; an unknown vehicle is still
    /// acknowledged.
    pub fn complete_exit(&self, vehicle: &VehicleId) -> bool {
        let mut queue = self.queue.lock().expect("queue poisoned");
        let known = match queue.entries.iter().position(|e| e.vehicle == *vehicle) {
            Some(position) => {
                queue.entries.remove(position);
                true
            }
            None => false,
        };
        if queue.holder.as_ref() == Some(vehicle) {
            queue.holder = None;
            if let Some(mut record) = self.vehicles.get_mut(&vehicle.to_string()) {
                record.exited_at = Some(Utc::now());
                record.crossings += 1;
            }
        }
        known
    }

    /// The vehicle currently holding a grant, if any.
    pub fn holder(&self) -> Option<VehicleId> {
        self.queue.lock().expect("queue poisoned").holder.clone()
    }

    pub fn queue_snapshot(&self) -> Vec<QueueEntry> {
        self.queue
            .lock()
            .expect("queue poisoned")
            .entries
            .iter()
            .cloned()
            .collect()
    }

    pub fn vehicle_records(&self) -> Vec<VehicleRecord> {
        self.vehicles.iter().map(|r| r.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(port: u16) -> AccessRequest {
        AccessRequest {
            vehicle: VehicleId::new("10.0.0.1", port),
            entry: "E1".to_string(),
            exit: "X3".to_string(),
            eta_ms: Some(1_000),
            cross_duration_ms: Some(2_000),
        }
    }

    #[test]
    fn grants_follow_arrival_order() {
        let state = AppState::new(8);
        state.request_access(&request(9000));
        state.request_access(&request(9001));

        assert_eq!(state.grant_next(), Some(VehicleId::new("10.0.0.1", 9000)));
        // Second grant blocked until the holder exits.
        assert_eq!(state.grant_next(), None);

        state.complete_exit(&VehicleId::new("10.0.0.1", 9000));
        assert_eq!(state.grant_next(), Some(VehicleId::new("10.0.0.1", 9001)));
    }

    #[test]
    fn duplicate_requests_are_idempotent() {
        let state = AppState::new(8);
        assert_eq!(state.request_access(&request(9000)), RequestOutcome::Queued(0));
        assert_eq!(
            state.request_access(&request(9000)),
            RequestOutcome::AlreadyQueued(0)
        );
        assert_eq!(state.queue_snapshot().len(), 1);
    }

    #[test]
    fn queue_capacity_is_bounded() {
        let state = AppState::new(2);
        assert_eq!(state.request_access(&request(9000)), RequestOutcome::Queued(0));
        assert_eq!(state.request_access(&request(9001)), RequestOutcome::Queued(1));
        assert_eq!(state.request_access(&request(9002)), RequestOutcome::Full);
    }

    #[test]
    fn exit_of_non_holder_keeps_the_grant() {
        let state = AppState::new(8);
        state.request_access(&request(9000));
        state.request_access(&request(9001));
        state.grant_next();

        // A queued-but-not-granted vehicle abandons its request.
        state.complete_exit(&VehicleId::new("10.0.0.1", 9001));
        assert_eq!(state.holder(), Some(VehicleId::new("10.0.0.1", 9000)));
        assert_eq!(state.queue_snapshot().len(), 1);
    }

    #[test]
    fn at_most_one_grant_over_any_event_sequence() {
        // Replay an interleaved request/grant/exit sequence and check the
        // mutual exclusion invariant after every step.
        let state = AppState::new(16);
        let vehicles: Vec<VehicleId> =
            (0..6).map(|i| VehicleId::new("10.0.0.1", 9000 + i)).collect();

        let mut holders_seen = 0;
        for round in 0..4 {
            for (i, vehicle) in vehicles.iter().enumerate() {
                if (round + i) % 2 == 0 {
                    state.request_access(&AccessRequest {
                        vehicle: vehicle.clone(),
                        entry: "E1".to_string(),
                        exit: "X3".to_string(),
                        eta_ms: None,
                        cross_duration_ms: None,
                    });
                }
                if state.grant_next().is_some() {
                    holders_seen += 1;
                }
                // Invariant: never more than one outstanding grant.
                let granted: Vec<_> = state
                    .queue_snapshot()
                    .into_iter()
                    .filter(|e| e.granted)
                    .collect();
                assert!(granted.len() <= 1);
                if let Some(holder) = state.holder() {
                    assert_eq!(granted.len(), 1);
                    assert_eq!(granted[0].vehicle, holder);
                }
                if (round + i) % 3 == 0 {
                    if let Some(holder) = state.holder() {
                        state.complete_exit(&holder);
                    }
                }
            }
        }
        assert!(holders_seen > 1);
    }

    #[test]
    fn records_track_the_crossing_lifecycle() {
        let state = AppState::new(8);
        state.request_access(&request(9000));
        let vehicle = VehicleId::new("10.0.0.1", 9000);

        state.grant_next();
        state.complete_exit(&vehicle);

        let records = state.vehicle_records();
        assert_eq!(records.len(), 1);
        assert!(records[0].granted_at.is_some());
        assert!(records[0].exited_at.is_some());
        assert_eq!(records[0].crossings, 1);
    }
}
