pub mod store;

pub use store::{AppState, QueueEntry, RequestOutcome, VehicleRecord};
