//! The per-vehicle coordination state machine.
//!
//! `IDLE -> APPROACHING -> REQUESTING -> CROSSING -> IDLE`, driven by sensor
//! events from the navigation layer and by the admission policy. The
//! coordinator owns three concurrent activities: the evaluation loop, the
//! beacon loop, and (Serial policy) the request/grant messaging task. They
//! share only the neighbor tracker and the state fields behind one mutex;
//! everything across vehicles is message passing.

use crate::beacon::BeaconLink;
use crate::client::ServerClient;
use crate::retry::{RetryError, RetryPolicy};
use imc_core::messages::{now_ms, AccessRequest, Beacon, VehicleId, VehicleStatus};
use imc_core::neighbors::NeighborTracker;
use imc_core::policy::{AdmissionPolicy, CrossingIntent};
use imc_core::topology::IntersectionSpecs;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::interval;

/// Motion control surface of the external navigation layer.
pub trait Navigation: Send + Sync {
    fn pause_motion(&self);
    fn resume_motion(&self);
}

/// Where the vehicle is in its crossing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveState {
    Idle,
    Approaching,
    /// Stopped at the entry, polling the admission policy
    Requesting,
    Crossing,
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("unknown entry point {0}")]
    UnknownEntry(String),
    #[error("exit {exit} is not reachable from entry {entry}")]
    UnreachableExit { entry: String, exit: String },
}

/// Tunables for one vehicle.
#[derive(Debug, Clone)]
pub struct VehicleConfig {
    /// Evaluation loop period
    pub cycle_ms: u64,
    /// Beacon transmission period
    pub beacon_period_ms: u64,
    /// Serial policy: re-send RequestAccess if no grant within this window
    pub request_timeout_ms: u64,
    /// Serial policy: grant poll period
    pub poll_ms: u64,
    /// Reliable-send retry budget
    pub retry: RetryPolicy,
    /// Drop neighbors silent for this long; None keeps them forever
    pub stale_after: Option<Duration>,
    /// Announced estimate of how long crossing takes
    pub cross_duration_ms: u64,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            cycle_ms: 50,
            beacon_period_ms: 200,
            request_timeout_ms: 2_000,
            poll_ms: 100,
            retry: RetryPolicy::default(),
            stale_after: Some(Duration::from_millis(2_000)),
            cross_duration_ms: 3_000,
        }
    }
}

struct Inner {
    state: DriveState,
    /// Broadcast status; None until the vehicle first requests
    status: Option<VehicleStatus>,
    seqno: u64,
    eta_ms: Option<u64>,
    granted: bool,
    /// Bumped whenever the vehicle leaves REQUESTING, so messaging tasks
    /// from a finished request cycle abandon themselves
    epoch: u64,
}

pub struct VehicleCoordinator {
    id: VehicleId,
    entry: String,
    exit: String,
    policy: AdmissionPolicy,
    topology: Arc<IntersectionSpecs>,
    tracker: Arc<NeighborTracker>,
    nav: Arc<dyn Navigation>,
    server: Option<ServerClient>,
    config: VehicleConfig,
    inner: Mutex<Inner>,
}

impl VehicleCoordinator {
    /// Build a coordinator, validating the chosen path against the
    /// topology. A bad path is a deployment error and fatal at startup.
    pub fn new(
        id: VehicleId,
        entry: impl Into<String>,
        exit: impl Into<String>,
        policy: AdmissionPolicy,
        topology: Arc<IntersectionSpecs>,
        nav: Arc<dyn Navigation>,
        config: VehicleConfig,
    ) -> Result<Self, CoordinatorError> {
        let entry = entry.into();
        let exit = exit.into();
        let reachable = topology
            .valid_exits(&entry)
            .ok_or_else(|| CoordinatorError::UnknownEntry(entry.clone()))?;
        if !reachable.contains(&exit) {
            return Err(CoordinatorError::UnreachableExit { entry, exit });
        }

        let tracker = match config.stale_after {
            Some(ttl) => NeighborTracker::with_stale_after(id.clone(), ttl),
            None => NeighborTracker::new(id.clone()),
        };

        Ok(Self {
            id,
            entry,
            exit,
            policy,
            topology,
            tracker: Arc::new(tracker),
            nav,
            server: None,
            config,
            inner: Mutex::new(Inner {
                state: DriveState::Idle,
                status: None,
                seqno: 0,
                eta_ms: None,
                granted: false,
                epoch: 0,
            }),
        })
    }

    /// Attach the admission server client (Serial policy).
    pub fn with_server(mut self, server: ServerClient) -> Self {
        self.server = Some(server);
        self
    }

    pub fn id(&self) -> &VehicleId {
        &self.id
    }

    pub fn tracker(&self) -> Arc<NeighborTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn state(&self) -> DriveState {
        self.inner.lock().expect("coordinator state poisoned").state
    }

    fn request_epoch(&self) -> u64 {
        self.inner.lock().expect("coordinator state poisoned").epoch
    }

    /// Sensor event: the vehicle is nearing the intersection.
    pub fn on_approaching(&self) {
        let mut inner = self.inner.lock().expect("coordinator state poisoned");
        if inner.state == DriveState::Idle {
            inner.state = DriveState::Approaching;
            tracing::info!("{}: approaching intersection", self.id);
        }
    }

    /// Sensor event: the vehicle reached the entry line. Motion pauses and
    /// the admission protocol starts; under Serial the request/grant task
    /// is spawned here.
    pub fn on_entering(self: &Arc<Self>) {
        let started = {
            let mut inner = self.inner.lock().expect("coordinator state poisoned");
            if inner.state != DriveState::Approaching {
                false
            } else {
                inner.state = DriveState::Requesting;
                inner.status = Some(VehicleStatus::Requesting);
                inner.eta_ms = Some(now_ms());
                inner.granted = false;
                true
            }
        };
        if !started {
            return;
        }
        self.nav.pause_motion();
        tracing::info!("{}: at entry {}, requesting access", self.id, self.entry);

        if self.policy == AdmissionPolicy::Serial {
            let coordinator = Arc::clone(self);
            let epoch = self.request_epoch();
            tokio::spawn(async move { coordinator.serial_request_cycle(epoch).await });
        }
    }

    /// Sensor event: the vehicle cleared the exit. Under Serial the
    /// Exiting/Acknowledged handshake runs before anything else can be
    /// granted; decentralized vehicles just flip their broadcast status.
    pub fn on_exiting(self: &Arc<Self>) {
        let exited = {
            let mut inner = self.inner.lock().expect("coordinator state poisoned");
            if inner.state != DriveState::Crossing {
                false
            } else {
                inner.state = DriveState::Idle;
                inner.status = Some(VehicleStatus::Exited);
                inner.granted = false;
                true
            }
        };
        if !exited {
            return;
        }
        tracing::info!("{}: exited at {}", self.id, self.exit);

        if self.policy == AdmissionPolicy::Serial {
            let coordinator = Arc::clone(self);
            tokio::spawn(async move {
                let Some(client) = &coordinator.server else {
                    return;
                };
                match client.announce_exiting(&coordinator.id, || false).await {
                    Ok(ack) => tracing::debug!("{}: exit acknowledged", ack.vehicle),
                    // Fire-and-forget past the retry budget; the server
                    // acknowledges duplicates, so a later request cycle
                    // converges anyway.
                    Err(err) => {
                        tracing::warn!("{}: exit handshake failed: {err}", coordinator.id)
                    }
                }
            });
        }
    }

    /// One pass of the evaluation loop. Returns true when the vehicle
    /// transitioned into CROSSING.
    ///
    /// Policy evaluation runs on a tracker snapshot, outside the state
    /// mutex.
    pub fn evaluate_once(&self, now_ms: u64) -> bool {
        let (granted, eta_ms) = {
            let inner = self.inner.lock().expect("coordinator state poisoned");
            if inner.state != DriveState::Requesting {
                return false;
            }
            (inner.granted, inner.eta_ms.unwrap_or(now_ms))
        };

        let intent = CrossingIntent {
            vehicle: self.id.clone(),
            entry: self.entry.clone(),
            exit: self.exit.clone(),
            eta_ms,
            cross_duration_ms: self.config.cross_duration_ms,
        };
        let neighbors = self.tracker.snapshot();
        let decision =
            self.policy
                .is_safe_to_cross(&self.topology, &intent, &neighbors, granted, now_ms);

        if !decision.ready_by(now_ms) {
            if decision.safe {
                tracing::debug!("{}: reserved, safe at {}", self.id, decision.safe_at_ms);
            }
            return false;
        }

        {
            let mut inner = self.inner.lock().expect("coordinator state poisoned");
            if inner.state != DriveState::Requesting {
                return false;
            }
            inner.state = DriveState::Crossing;
            inner.status = Some(VehicleStatus::Crossing);
            inner.epoch += 1;
        }
        self.nav.resume_motion();
        tracing::info!("{}: crossing {} -> {}", self.id, self.entry, self.exit);
        true
    }

    /// Compose the next outbound beacon, or None before the first request.
    ///
    /// Timing fields ride along only under the Reservation policy.
    pub fn next_beacon(&self) -> Option<Beacon> {
        let mut inner = self.inner.lock().expect("coordinator state poisoned");
        let status = inner.status?;
        inner.seqno += 1;
        let announces_timing = self.policy == AdmissionPolicy::Reservation;
        Some(Beacon {
            sender: self.id.clone(),
            status,
            entry: self.entry.clone(),
            exit: self.exit.clone(),
            seqno: inner.seqno,
            sent_at_ms: now_ms(),
            eta_ms: if announces_timing { inner.eta_ms } else { None },
            cross_duration_ms: announces_timing.then_some(self.config.cross_duration_ms),
        })
    }

    /// Record a received grant. Only meaningful while REQUESTING.
    pub fn grant(&self) {
        let mut inner = self.inner.lock().expect("coordinator state poisoned");
        if inner.state == DriveState::Requesting {
            inner.granted = true;
        }
    }

    /// Serial request/grant cycle: send RequestAccess (bounded retry), poll
    /// for the grant, and retransmit the request when the window expires.
    /// Repeats until granted or the vehicle leaves REQUESTING; stalling
    /// forever at the entry is the fail-safe when the server is down.
    async fn serial_request_cycle(&self, epoch: u64) {
        let Some(client) = &self.server else {
            tracing::error!("{}: serial policy without a server client", self.id);
            return;
        };
        let request = AccessRequest {
            vehicle: self.id.clone(),
            entry: self.entry.clone(),
            exit: self.exit.clone(),
            eta_ms: self.inner.lock().expect("coordinator state poisoned").eta_ms,
            cross_duration_ms: Some(self.config.cross_duration_ms),
        };

        loop {
            if self.request_epoch() != epoch {
                return;
            }
            match client
                .request_access(&request, || self.request_epoch() != epoch)
                .await
            {
                Ok(()) => {}
                Err(RetryError::Abandoned) => return,
                Err(RetryError::Exhausted(err)) => {
                    tracing::warn!("{}: RequestAccess failed after retries: {err}", self.id);
                    tokio::time::sleep(Duration::from_millis(self.config.request_timeout_ms)).await;
                    continue;
                }
            }

            let deadline =
                tokio::time::Instant::now() + Duration::from_millis(self.config.request_timeout_ms);
            while tokio::time::Instant::now() < deadline {
                if self.request_epoch() != epoch {
                    return;
                }
                match client.grant_status(&self.id).await {
                    Ok(status) if status.granted => {
                        self.grant();
                        return;
                    }
                    Ok(_) => {}
                    Err(err) => tracing::debug!("{}: grant poll failed: {err}", self.id),
                }
                tokio::time::sleep(Duration::from_millis(self.config.poll_ms)).await;
            }
            tracing::warn!(
                "{}: no grant within {}ms, retransmitting request",
                self.id,
                self.config.request_timeout_ms
            );
        }
    }

    /// Spawn the evaluation loop and, when a beacon link is given, the
    /// beacon transmit and receive loops.
    pub fn spawn_loops(self: &Arc<Self>, link: Option<Arc<BeaconLink>>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let coordinator = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(coordinator.config.cycle_ms));
            loop {
                ticker.tick().await;
                coordinator.evaluate_once(now_ms());
            }
        }));

        if let Some(link) = link {
            let coordinator = Arc::clone(self);
            let tx_link = Arc::clone(&link);
            handles.push(tokio::spawn(async move {
                let mut ticker =
                    interval(Duration::from_millis(coordinator.config.beacon_period_ms));
                loop {
                    ticker.tick().await;
                    if let Some(beacon) = coordinator.next_beacon() {
                        if let Err(err) = tx_link.send(&beacon).await {
                            tracing::debug!("{}: beacon send failed: {err}", coordinator.id);
                        }
                    }
                }
            }));
            handles.push(BeaconLink::spawn_receiver(link, self.tracker()));
        }

        handles
    }
}
