//! The settlement pipeline: durable action log, persistence contract, and
//! the per-broker transfer poller that drains it toward the external
//! asset-transfer network.

pub mod persistence;
pub mod transfer;

pub use persistence::{MemoryStore, PersistenceStore, PersistingCallbacks};
