//! Simulation tools for the intersection coordination system.
//!
//! Binaries:
//! - run_scenario: multi-vehicle scenario simulator
//! - run_vehicle: single simulated vehicle for ad-hoc testing

pub mod sim;
