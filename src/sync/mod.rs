//! Configuration synchronization
//!
//! Loads the stored configuration into an edit session and publishes it
//! back with optimistic concurrency.

mod session;
mod synchronizer;
mod types;

pub use session::{EditorBuffer, Session};
pub use synchronizer::{SyncSettings, Synchronizer};
pub use types::{
    LoadReport, PageDeletion, Retirement, SaveReport, SyncError, SyncPhase, SyncStatus,
};
