//! Sync types

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::build::BuildState;
use crate::error::RemoteError;
use crate::model::{ModelError, Page};
use crate::remote::Fingerprint;

/// Where the last (or current) save stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    /// Fetching the stored document
    Loading,
    Capturing,
    Serializing,
    Writing,
    Succeeded,
    /// The stored document moved on; reload before saving again
    Conflict,
    Unauthorized,
    TransientFailure,
    /// The store refused the content
    Rejected,
}

impl SyncPhase {
    /// A load or save is waiting on the store
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            SyncPhase::Loading | SyncPhase::Capturing | SyncPhase::Serializing | SyncPhase::Writing
        )
    }

    /// Phase a failed remote call leaves behind
    pub fn for_remote_error(error: &RemoteError) -> Self {
        match error {
            RemoteError::Conflict(_) => SyncPhase::Conflict,
            RemoteError::Unauthorized => SyncPhase::Unauthorized,
            RemoteError::Validation(_) => SyncPhase::Rejected,
            RemoteError::NotFound(_)
            | RemoteError::Transient(_)
            | RemoteError::Decode(_)
            | RemoteError::Corrupt { .. } => SyncPhase::TransientFailure,
        }
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("No access token; sign in first")]
    Unauthenticated,

    #[error("A save is already in progress")]
    SaveInFlight,

    #[error("The configuration is being loaded")]
    LoadInProgress,

    #[error("The site is building; save again once the build finishes")]
    BuildInProgress,

    #[error("The stored configuration changed; reload before saving")]
    ReloadRequired,

    #[error("No configuration loaded")]
    NotLoaded,

    #[error("{0}")]
    Model(#[from] ModelError),

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("{0}")]
    Remote(#[from] RemoteError),
}

/// Snapshot of the session for the operator
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub build: BuildState,
    pub save_enabled: bool,
    pub loaded: bool,
    pub needs_reload: bool,
    pub authenticated: bool,
    pub fingerprint: Option<Fingerprint>,
    pub last_error: Option<String>,
    pub last_saved_at: Option<DateTime<Utc>>,
    /// Page currently open in the editor
    pub editor_page: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    /// Nothing was stored yet; the default document was created
    pub bootstrapped: bool,
    /// Stored bytes were unreadable and defaults were substituted
    pub fell_back: bool,
    pub warnings: Vec<String>,
    pub fingerprint: Option<Fingerprint>,
    pub build_watched: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveReport {
    pub fingerprint: Fingerprint,
    pub build_started: bool,
}

/// What happened to a deleted page's published output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Retirement {
    Retired { path: String },
    AlreadyAbsent { path: String },
    Skipped { reason: String },
    Failed { path: String, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct PageDeletion {
    pub page: Page,
    pub retirement: Retirement,
}
