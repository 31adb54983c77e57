//! Build pipeline monitor
//!
//! After a successful save the site build runs remotely. The monitor polls
//! the recent pipeline runs at a fixed interval until the run it waits for
//! completes, then stops on its own. At most one polling task exists at a time and
//! [`BuildMonitor::stop`] is the only way to cancel it early.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::BuildConfig;
use crate::credentials::CredentialStore;
use crate::remote::{ContentStore, RemoteError};

use super::types::{BuildState, BuildTarget};

/// Runs listed per poll; the awaited run may not be the newest
const RUN_WINDOW: u32 = 5;

/// Handle to the build monitor; clones share the same task
#[derive(Clone)]
pub struct BuildMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    store: Arc<dyn ContentStore>,
    credentials: CredentialStore,
    interval: Duration,
    max_failed_ticks: u32,
    state: Arc<watch::Sender<BuildState>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BuildMonitor {
    pub fn new(
        store: Arc<dyn ContentStore>,
        credentials: CredentialStore,
        interval: Duration,
        max_failed_ticks: u32,
    ) -> Self {
        let (state, _) = watch::channel(BuildState::NotWatching);
        Self {
            inner: Arc::new(MonitorInner {
                store,
                credentials,
                interval,
                max_failed_ticks: max_failed_ticks.max(1),
                state: Arc::new(state),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn from_config(
        store: Arc<dyn ContentStore>,
        credentials: CredentialStore,
        config: &BuildConfig,
    ) -> Self {
        Self::new(
            store,
            credentials,
            Duration::from_secs(config.poll_interval_secs.max(1)),
            config.max_failed_ticks,
        )
    }

    pub fn state(&self) -> BuildState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BuildState> {
        self.inner.state.subscribe()
    }

    pub fn is_polling(&self) -> bool {
        self.inner.state.borrow().is_polling()
    }

    /// Begin polling the newest run; returns false if already polling
    pub fn start(&self) -> bool {
        self.start_for(BuildTarget::latest())
    }

    /// Begin polling for the run matching `target`
    pub fn start_for(&self, target: BuildTarget) -> bool {
        let mut task = self.inner.task.lock();
        if let Some(handle) = task.as_ref() {
            if !handle.is_finished() {
                tracing::debug!("Build monitor already polling");
                return false;
            }
        }

        self.inner.state.send_replace(BuildState::polling());
        *task = Some(tokio::spawn(poll_loop(
            self.inner.store.clone(),
            self.inner.credentials.clone(),
            self.inner.state.clone(),
            target,
            self.inner.interval,
            self.inner.max_failed_ticks,
        )));

        tracing::info!(interval_secs = self.inner.interval.as_secs(), "Build monitor started");
        true
    }

    /// Cancel polling; a finished build state is kept
    pub fn stop(&self) {
        if let Some(handle) = self.inner.task.lock().take() {
            handle.abort();
        }
        let stopped = self.inner.state.send_if_modified(|state| {
            if state.is_polling() {
                *state = BuildState::NotWatching;
                true
            } else {
                false
            }
        });
        if stopped {
            tracing::info!("Build monitor stopped");
        }
    }
}

impl Drop for MonitorInner {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

async fn poll_loop(
    store: Arc<dyn ContentStore>,
    credentials: CredentialStore,
    state: Arc<watch::Sender<BuildState>>,
    target: BuildTarget,
    interval: Duration,
    max_failed_ticks: u32,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let Some(token) = credentials.get() else {
            state.send_replace(BuildState::Unknown {
                reason: "no access token".to_string(),
            });
            tracing::warn!("Build monitor stopped: no access token");
            break;
        };

        let poll = store.list_pipeline_runs(&token, RUN_WINDOW).await;
        if matches!(poll, Err(RemoteError::Unauthorized)) {
            credentials.clear();
        }
        if let Err(e) = &poll {
            tracing::warn!(error = %e, "Build status poll failed");
        }

        let next = state.borrow().next(&poll, &target, max_failed_ticks);
        let terminal = next.is_terminal();
        tracing::debug!(state = ?next, "Build status polled");
        state.send_replace(next);

        if terminal {
            tracing::info!(state = ?state.borrow().clone(), "Build finished");
            break;
        }
    }
}
