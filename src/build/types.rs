//! Build monitor states and transitions

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::remote::{PipelineRun, RemoteError, RunConclusion};

/// Allowance for the pipeline's clock running behind ours
const CLOCK_SKEW_SECS: i64 = 10;

/// Which pipeline run the monitor is waiting for
///
/// Right after a write the newest listed run is usually the previous build,
/// because the pipeline has not scheduled the new one yet. Runs that do not
/// match the target are skipped as if no run existed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildTarget {
    /// Commit created by the write
    pub commit: Option<String>,
    /// When the write was sent
    pub since: Option<DateTime<Utc>>,
}

impl BuildTarget {
    /// Whatever run is newest
    pub fn latest() -> Self {
        Self::default()
    }

    /// The run triggered by a write sent at `since`
    pub fn after_write(commit: Option<String>, since: DateTime<Utc>) -> Self {
        Self {
            commit,
            since: Some(since),
        }
    }

    pub fn matches(&self, run: &PipelineRun) -> bool {
        if let (Some(commit), Some(head)) = (&self.commit, &run.head_sha) {
            return commit == head;
        }
        match (self.since, run.created_at) {
            (Some(since), Some(created)) => created >= since - Duration::seconds(CLOCK_SKEW_SECS),
            _ => true,
        }
    }
}

/// What the operator sees about the site build
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BuildState {
    NotWatching,
    Polling {
        /// Latest run seen, if any exists yet
        run: Option<PipelineRun>,
        /// Consecutive polls that failed
        failed_ticks: u32,
    },
    Succeeded {
        finished_at: DateTime<Utc>,
    },
    Failed {
        conclusion: String,
        finished_at: DateTime<Utc>,
    },
    Unknown {
        reason: String,
    },
}

impl BuildState {
    pub fn polling() -> Self {
        BuildState::Polling {
            run: None,
            failed_ticks: 0,
        }
    }

    pub fn is_polling(&self) -> bool {
        matches!(self, BuildState::Polling { .. })
    }

    /// Succeeded, Failed and Unknown end the polling task
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuildState::Succeeded { .. } | BuildState::Failed { .. } | BuildState::Unknown { .. }
        )
    }

    /// State after one poll
    ///
    /// Only runs matching `target` count. Failed polls are tolerated until
    /// `max_failed_ticks` happen in a row; an authorization failure ends
    /// polling at once.
    pub fn next(
        &self,
        poll: &Result<Vec<PipelineRun>, RemoteError>,
        target: &BuildTarget,
        max_failed_ticks: u32,
    ) -> BuildState {
        match poll {
            Ok(runs) => match runs.iter().find(|run| target.matches(run)) {
                None => BuildState::Polling {
                    run: None,
                    failed_ticks: 0,
                },
                Some(run) => match run.outcome() {
                    None => BuildState::Polling {
                        run: Some(run.clone()),
                        failed_ticks: 0,
                    },
                    Some(RunConclusion::Success) => BuildState::Succeeded {
                        finished_at: Utc::now(),
                    },
                    Some(RunConclusion::Failure) => BuildState::Failed {
                        conclusion: run.conclusion.clone().unwrap_or_else(|| "failure".to_string()),
                        finished_at: Utc::now(),
                    },
                },
            },
            Err(RemoteError::Unauthorized) => BuildState::Unknown {
                reason: "authentication rejected while checking the build".to_string(),
            },
            Err(e) => {
                let (run, failed) = match self {
                    BuildState::Polling { run, failed_ticks } => (run.clone(), failed_ticks + 1),
                    _ => (None, 1),
                };
                if failed >= max_failed_ticks {
                    BuildState::Unknown {
                        reason: format!("build status unavailable after {} attempts: {}", failed, e),
                    }
                } else {
                    BuildState::Polling {
                        run,
                        failed_ticks: failed,
                    }
                }
            }
        }
    }
}
