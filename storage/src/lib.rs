//! Custody Storage Layer
//!
//! - File snapshots of a custodian (JSON for reading, bincode for loading)
//! - Sled-backed journal of committed bank events

pub mod error;
pub mod journal;
pub mod snapshot;

pub use error::{Result, StorageError};
pub use journal::EventJournal;
pub use snapshot::SnapshotStore;
