//! Simulated vehicles and pre-defined intersection scenarios.

pub mod runner;
pub mod scenarios;

pub use runner::{drive_vehicle, run_scenario, SimNavigation, SimOptions, VehicleReport};
pub use scenarios::{
    create_converging_scenario, create_crossing_scenario, create_opposing_scenario, Scenario,
    VehiclePlan,
};
