//! Content store types

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque version token of a stored file (the store's blob sha)
///
/// Writes must present the fingerprint they last saw; the store refuses the
/// write if the file has moved on since.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fetched file with its version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContent {
    pub fingerprint: Fingerprint,
    pub bytes: Vec<u8>,
}

/// Outcome of a successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    /// New version of the written file
    pub fingerprint: Fingerprint,
    /// Commit created by the write, when the store reports one
    pub commit: Option<String>,
}

/// Lifecycle status of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    /// `waiting`, `pending`, `requested` and anything newer
    #[serde(other)]
    Pending,
}

/// How a completed run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunConclusion {
    Success,
    Failure,
}

/// Most recent state of a build pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub status: RunStatus,
    /// Raw conclusion, set once the run completes
    #[serde(default)]
    pub conclusion: Option<String>,
    /// Commit the run builds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn queued() -> Self {
        Self {
            status: RunStatus::Queued,
            conclusion: None,
            head_sha: None,
            created_at: None,
        }
    }

    pub fn in_progress() -> Self {
        Self {
            status: RunStatus::InProgress,
            conclusion: None,
            head_sha: None,
            created_at: None,
        }
    }

    pub fn completed(conclusion: &str) -> Self {
        Self {
            status: RunStatus::Completed,
            conclusion: Some(conclusion.to_string()),
            head_sha: None,
            created_at: None,
        }
    }

    pub fn with_head_sha(mut self, sha: impl Into<String>) -> Self {
        self.head_sha = Some(sha.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Conclusion of a completed run; anything but `success` is a failure
    pub fn outcome(&self) -> Option<RunConclusion> {
        if !self.is_completed() {
            return None;
        }
        match self.conclusion.as_deref() {
            Some("success") => Some(RunConclusion::Success),
            _ => Some(RunConclusion::Failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_status_decoding() {
        let run: PipelineRun =
            serde_json::from_value(json!({ "status": "waiting", "conclusion": null })).unwrap();
        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(run.outcome(), None);

        let run: PipelineRun = serde_json::from_value(json!({ "status": "in_progress" })).unwrap();
        assert_eq!(run, PipelineRun::in_progress());

        let run: PipelineRun = serde_json::from_value(json!({
            "status": "queued",
            "head_sha": "abc123",
            "created_at": "2024-05-01T12:00:00Z"
        }))
        .unwrap();
        assert_eq!(run.head_sha.as_deref(), Some("abc123"));
        assert_eq!(run.created_at.unwrap().to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_run_outcome() {
        assert_eq!(PipelineRun::completed("success").outcome(), Some(RunConclusion::Success));
        assert_eq!(PipelineRun::completed("cancelled").outcome(), Some(RunConclusion::Failure));
        assert_eq!(PipelineRun::completed("timed_out").outcome(), Some(RunConclusion::Failure));
        assert_eq!(PipelineRun::queued().outcome(), None);
    }
}
