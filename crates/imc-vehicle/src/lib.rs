//! Per-vehicle intersection coordination.
//!
//! The [`coordinator::VehicleCoordinator`] is the control loop: it consumes
//! sensor events from the navigation layer, consults an admission policy,
//! and calls back into navigation to pause or resume motion. Beacons go out
//! over [`beacon::BeaconLink`]; the Serial policy talks to the central
//! server through [`client::ServerClient`].

pub mod beacon;
pub mod client;
pub mod coordinator;
pub mod retry;

pub use beacon::BeaconLink;
pub use client::{ClientError, ServerClient};
pub use coordinator::{
    CoordinatorError, DriveState, Navigation, VehicleConfig, VehicleCoordinator,
};
pub use retry::{RetryError, RetryPolicy};
