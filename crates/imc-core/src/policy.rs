//! Admission policies: when is it safe to enter the intersection?
//!
//! Three interchangeable strategies behind one interface. Serial defers to
//! the central server; Parallel admits any path disjoint from every crossing
//! neighbor; Reservation extends Parallel with announced-time reasoning. The
//! strategies are a plain enum, and the conflict check they share is one
//! function, so a coordination client picks a policy purely by value.

use crate::messages::{VehicleId, VehicleStatus};
use crate::neighbors::NeighborState;
use crate::topology::IntersectionSpecs;

/// Outcome of one admission check.
///
/// `safe == false` means not currently computable as safe. `safe == true`
/// with `safe_at_ms <= now` means cross immediately; a future `safe_at_ms`
/// (reservation only) means safe starting at that instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafeState {
    pub safe: bool,
    pub safe_at_ms: u64,
}

impl SafeState {
    /// Not safe on current data.
    pub fn not_yet() -> Self {
        Self {
            safe: false,
            safe_at_ms: 0,
        }
    }

    /// Safe starting at `safe_at_ms`.
    pub fn at(safe_at_ms: u64) -> Self {
        Self {
            safe: true,
            safe_at_ms,
        }
    }

    /// Whether crossing may begin at `now_ms`.
    pub fn ready_by(&self, now_ms: u64) -> bool {
        self.safe && self.safe_at_ms <= now_ms
    }
}

/// The local vehicle's own crossing intent.
#[derive(Debug, Clone)]
pub struct CrossingIntent {
    pub vehicle: VehicleId,
    pub entry: String,
    pub exit: String,
    /// Estimated arrival at the entry point
    pub eta_ms: u64,
    /// Estimated time to clear the intersection
    pub cross_duration_ms: u64,
}

/// Strategy selector for admission control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionPolicy {
    /// Centralized FCFS: cross only after the server granted access
    Serial,
    /// Decentralized: cross alongside neighbors with disjoint paths
    Parallel,
    /// Decentralized, time-aware: additionally schedules around announced
    /// ETAs and crossing durations
    Reservation,
}

impl AdmissionPolicy {
    /// Decide whether the local vehicle may cross.
    ///
    /// `granted` reflects the server grant state and is only consulted by
    /// the Serial policy; the decentralized policies only read the neighbor
    /// snapshot. Non-blocking and side-effect free, meant to be polled from
    /// the evaluation loop.
    pub fn is_safe_to_cross(
        &self,
        topology: &IntersectionSpecs,
        intent: &CrossingIntent,
        neighbors: &[NeighborState],
        granted: bool,
        now_ms: u64,
    ) -> SafeState {
        match self {
            AdmissionPolicy::Serial => {
                if granted {
                    SafeState::at(now_ms)
                } else {
                    SafeState::not_yet()
                }
            }
            AdmissionPolicy::Parallel => parallel(topology, intent, neighbors, now_ms),
            AdmissionPolicy::Reservation => reservation(topology, intent, neighbors, now_ms),
        }
    }
}

fn conflicts(topology: &IntersectionSpecs, intent: &CrossingIntent, other: &NeighborState) -> bool {
    topology.will_intersect(&intent.entry, &intent.exit, &other.entry, &other.exit)
}

/// Safe now iff no CROSSING neighbor's path conflicts with ours.
///
/// REQUESTING neighbors are deliberately not considered; that small
/// false-unsafe margin keeps the policy simple.
fn parallel(
    topology: &IntersectionSpecs,
    intent: &CrossingIntent,
    neighbors: &[NeighborState],
    now_ms: u64,
) -> SafeState {
    let blocked = neighbors
        .iter()
        .filter(|n| n.vehicle != intent.vehicle)
        .filter(|n| n.status == VehicleStatus::Crossing)
        .any(|n| conflicts(topology, intent, n));
    if blocked {
        SafeState::not_yet()
    } else {
        SafeState::at(now_ms)
    }
}

/// Announced time at which a neighbor will have cleared the intersection.
fn clearance_ms(neighbor: &NeighborState) -> Option<u64> {
    match (neighbor.eta_ms, neighbor.cross_duration_ms) {
        (Some(eta), Some(duration)) => Some(eta.saturating_add(duration)),
        _ => None,
    }
}

/// Time-reservation admission.
///
/// If no crossing neighbor conflicts and we hold the earliest ETA among all
/// requesting neighbors (ties broken by vehicle id), we may go immediately.
/// Otherwise the earliest admissible instant is bounded below by the
/// announced clearance time of every conflicting crosser and of every
/// conflicting requester due before us; a requester with an earlier ETA but
/// a disjoint path imposes nothing. Returns not-safe whenever a conflicting
/// neighbor's timing is unknown, since no bound is computable then.
fn reservation(
    topology: &IntersectionSpecs,
    intent: &CrossingIntent,
    neighbors: &[NeighborState],
    now_ms: u64,
) -> SafeState {
    let others: Vec<&NeighborState> = neighbors
        .iter()
        .filter(|n| n.vehicle != intent.vehicle)
        .collect();

    let clear_of_crossers = !others
        .iter()
        .filter(|n| n.status == VehicleStatus::Crossing)
        .any(|n| conflicts(topology, intent, n));

    let requesting: Vec<&NeighborState> = others
        .iter()
        .copied()
        .filter(|n| n.status == VehicleStatus::Requesting)
        .collect();

    let highest_priority = requesting.iter().all(|n| match n.eta_ms {
        Some(eta) => (intent.eta_ms, &intent.vehicle) < (eta, &n.vehicle),
        // A requester of unknown ETA cannot be ranked against us.
        None => false,
    });
    if clear_of_crossers && highest_priority {
        return SafeState::at(now_ms);
    }

    let mut safe_at = now_ms.max(intent.eta_ms);

    for crosser in others
        .iter()
        .filter(|n| n.status == VehicleStatus::Crossing)
        .filter(|n| conflicts(topology, intent, n))
    {
        match clearance_ms(crosser) {
            Some(clear) => safe_at = safe_at.max(clear),
            None => return SafeState::not_yet(),
        }
    }

    // Earliest-first, so every raise of the bound is already accounted for
    // by the time later requesters are considered.
    let mut due: Vec<&NeighborState> = requesting
        .iter()
        .copied()
        .filter(|n| n.eta_ms.is_some() || conflicts(topology, intent, n))
        .collect();
    due.sort_by(|a, b| (a.eta_ms, &a.vehicle).cmp(&(b.eta_ms, &b.vehicle)));

    for requester in due {
        let Some(eta) = requester.eta_ms else {
            // Conflicting requester with unknown timing: no bound exists.
            return SafeState::not_yet();
        };
        if (eta, &requester.vehicle) >= (safe_at, &intent.vehicle) {
            continue;
        }
        if conflicts(topology, intent, requester) {
            match requester.cross_duration_ms {
                Some(duration) => safe_at = safe_at.max(eta.saturating_add(duration)),
                None => return SafeState::not_yet(),
            }
        }
    }

    SafeState::at(safe_at)
}
