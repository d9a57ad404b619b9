//! Capability-based object model (spec §3/§4.5).

pub mod object;
pub mod rights;
pub mod table;

pub use object::{ObjectHeader, ObjectId, ObjectKind};
pub use rights::Rights;
pub use table::CapabilityTable;
