//! In-process content store
//!
//! Keeps files in memory and applies the same fingerprint rules as the hosted
//! store, so the admin server can run without a repository and the sync layer
//! can be tested against precise failure scenarios.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::sync::watch;

use crate::error::RemoteError;

use super::store::ContentStore;
use super::types::{Fingerprint, PipelineRun, RunStatus, StoredContent, WriteReceipt};

/// Call counters, for observing what reached the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub fetches: usize,
    pub writes_started: usize,
    pub writes_completed: usize,
    pub deletes: usize,
    pub run_polls: usize,
}

#[derive(Default)]
struct MemoryState {
    /// (branch, path) -> current version
    files: HashMap<(String, String), StoredContent>,
    /// Files whose body no longer decodes
    corrupt: HashSet<(String, String)>,
    commits: u64,
    accepted_token: Option<String>,
    offline: bool,
    /// Responses returned by upcoming run polls, in order
    scripted_runs: VecDeque<Result<Vec<PipelineRun>, RemoteError>>,
    /// Newest first
    runs: Vec<PipelineRun>,
    simulate_pipeline: bool,
    next_write_error: Option<RemoteError>,
    delete_error: Option<RemoteError>,
    stats: MemoryStats,
}

/// Content store held in process memory
#[derive(Clone)]
pub struct MemoryContentStore {
    state: Arc<Mutex<MemoryState>>,
    /// `true` while writes are held before committing
    write_gate: Arc<watch::Sender<bool>>,
}

impl Default for MemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

fn fingerprint_of(bytes: &[u8]) -> Fingerprint {
    Fingerprint::new(hex::encode(Sha256::digest(bytes)))
}

impl MemoryContentStore {
    pub fn new() -> Self {
        let (write_gate, _) = watch::channel(false);
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            write_gate: Arc::new(write_gate),
        }
    }

    /// Only accept this token; anything else is unauthorized
    pub fn require_token(&self, token: &str) -> &Self {
        self.state.lock().accepted_token = Some(token.to_string());
        self
    }

    /// Queue a run each time a write lands and advance it one stage per poll
    pub fn simulate_pipeline(&self, enabled: bool) -> &Self {
        self.state.lock().simulate_pipeline = enabled;
        self
    }

    /// Fail every call as a network outage would
    pub fn set_offline(&self, offline: bool) -> &Self {
        self.state.lock().offline = offline;
        self
    }

    /// Queue responses for the next run polls
    pub fn script_runs<I>(&self, responses: I) -> &Self
    where
        I: IntoIterator<Item = Result<Vec<PipelineRun>, RemoteError>>,
    {
        self.state.lock().scripted_runs.extend(responses);
        self
    }

    pub fn fail_next_write(&self, error: RemoteError) -> &Self {
        self.state.lock().next_write_error = Some(error);
        self
    }

    pub fn fail_deletes(&self, error: Option<RemoteError>) -> &Self {
        self.state.lock().delete_error = error;
        self
    }

    /// Hold writes after they arrive until [`resume_writes`](Self::resume_writes)
    pub fn pause_writes(&self) {
        self.write_gate.send_replace(true);
    }

    pub fn resume_writes(&self) {
        self.write_gate.send_replace(false);
    }

    /// Place a file directly, as if committed by someone else
    pub fn put_file(&self, branch: &str, path: &str, bytes: &[u8]) -> Fingerprint {
        let fingerprint = fingerprint_of(bytes);
        self.state.lock().files.insert(
            (branch.to_string(), path.to_string()),
            StoredContent {
                fingerprint: fingerprint.clone(),
                bytes: bytes.to_vec(),
            },
        );
        fingerprint
    }

    /// Make a stored file undecodable until it is next written
    pub fn corrupt_file(&self, branch: &str, path: &str) {
        self.state
            .lock()
            .corrupt
            .insert((branch.to_string(), path.to_string()));
    }

    pub fn file(&self, branch: &str, path: &str) -> Option<StoredContent> {
        self.state
            .lock()
            .files
            .get(&(branch.to_string(), path.to_string()))
            .cloned()
    }

    pub fn stats(&self) -> MemoryStats {
        self.state.lock().stats
    }

    fn check_access(state: &MemoryState, token: &str) -> Result<(), RemoteError> {
        if state.offline {
            return Err(RemoteError::Transient("content store unreachable".to_string()));
        }
        match &state.accepted_token {
            Some(accepted) if accepted != token => Err(RemoteError::Unauthorized),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn fetch(
        &self,
        token: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<StoredContent>, RemoteError> {
        let mut state = self.state.lock();
        state.stats.fetches += 1;
        Self::check_access(&state, token)?;

        let key = (git_ref.to_string(), path.to_string());
        match state.files.get(&key) {
            Some(stored) if state.corrupt.contains(&key) => Err(RemoteError::Corrupt {
                fingerprint: stored.fingerprint.clone(),
                reason: "invalid base64".to_string(),
            }),
            stored => Ok(stored.cloned()),
        }
    }

    async fn write(
        &self,
        token: &str,
        path: &str,
        bytes: &[u8],
        _message: &str,
        expected: Option<&Fingerprint>,
        branch: &str,
    ) -> Result<WriteReceipt, RemoteError> {
        self.state.lock().stats.writes_started += 1;

        let mut gate = self.write_gate.subscribe();
        let _ = gate.wait_for(|paused| !*paused).await;

        let mut state = self.state.lock();
        Self::check_access(&state, token)?;
        if let Some(error) = state.next_write_error.take() {
            return Err(error);
        }

        let key = (branch.to_string(), path.to_string());
        match (state.files.get(&key), expected) {
            (Some(_), None) => {
                return Err(RemoteError::Validation(format!(
                    "{} already exists; a fingerprint is required",
                    path
                )))
            }
            (Some(current), Some(expected)) if &current.fingerprint != expected => {
                return Err(RemoteError::Conflict(format!(
                    "{} is at {}, not {}",
                    path, current.fingerprint, expected
                )))
            }
            (None, Some(expected)) => {
                return Err(RemoteError::Conflict(format!(
                    "{} no longer exists (expected {})",
                    path, expected
                )))
            }
            _ => {}
        }

        let fingerprint = fingerprint_of(bytes);
        state.corrupt.remove(&key);
        state.files.insert(
            key,
            StoredContent {
                fingerprint: fingerprint.clone(),
                bytes: bytes.to_vec(),
            },
        );
        state.stats.writes_completed += 1;
        state.commits += 1;
        let commit = format!("{:040x}", state.commits);
        if state.simulate_pipeline {
            let run = PipelineRun::queued()
                .with_head_sha(commit.clone())
                .with_created_at(Utc::now());
            state.runs.insert(0, run);
        }

        Ok(WriteReceipt {
            fingerprint,
            commit: Some(commit),
        })
    }

    async fn delete(
        &self,
        token: &str,
        path: &str,
        expected: &Fingerprint,
        _message: &str,
        branch: &str,
    ) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        state.stats.deletes += 1;
        Self::check_access(&state, token)?;
        if let Some(error) = state.delete_error.clone() {
            return Err(error);
        }

        let key = (branch.to_string(), path.to_string());
        let current = state.files.get(&key).map(|c| c.fingerprint.clone());
        match current {
            None => Err(RemoteError::NotFound(path.to_string())),
            Some(current) if &current != expected => {
                Err(RemoteError::Conflict(format!("{} changed since it was read", path)))
            }
            Some(_) => {
                state.files.remove(&key);
                Ok(())
            }
        }
    }

    async fn list_pipeline_runs(
        &self,
        token: &str,
        limit: u32,
    ) -> Result<Vec<PipelineRun>, RemoteError> {
        let mut state = self.state.lock();
        state.stats.run_polls += 1;
        if let Some(scripted) = state.scripted_runs.pop_front() {
            return scripted;
        }
        Self::check_access(&state, token)?;

        let listed: Vec<PipelineRun> = state.runs.iter().take(limit as usize).cloned().collect();

        if state.simulate_pipeline {
            if let Some(newest) = state.runs.first_mut() {
                match newest.status {
                    RunStatus::Queued | RunStatus::Pending => newest.status = RunStatus::InProgress,
                    RunStatus::InProgress | RunStatus::Completed => {
                        newest.status = RunStatus::Completed;
                        newest.conclusion = Some("success".to_string());
                    }
                }
            }
        }

        Ok(listed)
    }
}
