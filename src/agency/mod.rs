//! Client side of the replicated configuration store ("the agency").
//!
//! - [`Snapshot`]: read-only, path-addressed view of the key space
//! - [`Transaction`]: operations plus preconditions, applied all-or-nothing
//! - [`Agency`]: the store contract; [`InMemoryAgency`] implements it in process
//! - [`AgencyLocks`]: read/write locks layered on compare-and-swap

pub mod lock;
pub mod snapshot;
pub mod store;
pub mod transaction;

pub use lock::AgencyLocks;
pub use snapshot::Snapshot;
pub use store::{Agency, AgencyState, InMemoryAgency, LogEntry};
pub use transaction::{Operation, Precondition, Transaction, WriteResult};
