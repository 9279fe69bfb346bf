pub mod messages;
pub mod neighbors;
pub mod policy;
pub mod topology;

pub use messages::{
    now_ms, AccessRequest, AccessStatus, Beacon, Exiting, ExitingAcknowledged, VehicleId,
    VehicleStatus,
};
pub use neighbors::{NeighborState, NeighborTracker};
pub use policy::{AdmissionPolicy, CrossingIntent, SafeState};
pub use topology::{EntryPoint, ExitPoint, Heading, IntersectionSpecs, Point, Road, TopologyError};
