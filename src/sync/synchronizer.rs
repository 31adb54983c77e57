//! Save orchestration
//!
//! The synchronizer owns the edit session and is the only path to the content
//! store for the configuration document. A save runs through
//! `Capturing -> Serializing -> Writing` and ends in one of the outcome
//! phases. One load or save may be in flight at a time, and no save may
//! start while the build started by the previous save is still being
//! watched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::build::{BuildMonitor, BuildTarget};
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::error::RemoteError;
use crate::model::{
    bootstrap_document, load_document, ConfigurationDocument, LoadedDocument, ModelError,
};
use crate::remote::{ContentStore, Fingerprint};

use super::session::Session;
use super::types::{
    LoadReport, PageDeletion, Retirement, SaveReport, SyncError, SyncPhase, SyncStatus,
};

/// Where and how the document is stored
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub path: String,
    pub branch: String,
    pub commit_message: String,
    pub pages_output_dir: String,
    pub watch_on_load: bool,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            path: config.content.path.clone(),
            branch: config.content.branch.clone(),
            commit_message: config.content.commit_message.clone(),
            pages_output_dir: config.content.pages_output_dir.clone(),
            watch_on_load: config.build.watch_on_load,
        }
    }

    /// Repository path of a page's rendered output
    pub fn page_output_path(&self, slug: &str) -> String {
        let dir = self.pages_output_dir.trim_matches('/');
        if dir.is_empty() {
            format!("{}/index.html", slug)
        } else {
            format!("{}/{}/index.html", dir, slug)
        }
    }
}

#[derive(Debug)]
struct PhaseState {
    phase: SyncPhase,
    last_error: Option<String>,
    last_saved_at: Option<DateTime<Utc>>,
}

pub struct Synchronizer {
    store: Arc<dyn ContentStore>,
    credentials: CredentialStore,
    settings: SyncSettings,
    session: tokio::sync::Mutex<Option<Session>>,
    phase: Mutex<PhaseState>,
    monitor: BuildMonitor,
}

/// Marks a load or save as in flight; one dropped before finishing (for
/// example a cancelled request) leaves a transient failure rather than a
/// stuck phase
struct FlightGuard<'a> {
    phase: &'a Mutex<PhaseState>,
    operation: &'static str,
    finished: bool,
}

impl FlightGuard<'_> {
    fn advance(&self, phase: SyncPhase) {
        tracing::debug!(operation = self.operation, phase = ?phase, "Advanced");
        self.phase.lock().phase = phase;
    }

    fn finish(mut self, phase: SyncPhase, error: Option<String>) {
        self.finished = true;
        let mut state = self.phase.lock();
        state.phase = phase;
        state.last_error = error;
        if phase == SyncPhase::Succeeded {
            state.last_saved_at = Some(Utc::now());
        }
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let mut state = self.phase.lock();
            state.phase = SyncPhase::TransientFailure;
            state.last_error = Some(format!("{} interrupted", self.operation));
            tracing::warn!(operation = self.operation, "Interrupted before completion");
        }
    }
}

impl Synchronizer {
    pub fn new(
        store: Arc<dyn ContentStore>,
        credentials: CredentialStore,
        settings: SyncSettings,
        monitor: BuildMonitor,
    ) -> Self {
        Self {
            store,
            credentials,
            settings,
            session: tokio::sync::Mutex::new(None),
            phase: Mutex::new(PhaseState {
                phase: SyncPhase::Idle,
                last_error: None,
                last_saved_at: None,
            }),
            monitor,
        }
    }

    pub fn from_config(store: Arc<dyn ContentStore>, credentials: CredentialStore, config: &Config) -> Self {
        let monitor = BuildMonitor::from_config(store.clone(), credentials.clone(), &config.build);
        Self::new(store, credentials, SyncSettings::from_config(config), monitor)
    }

    pub fn monitor(&self) -> &BuildMonitor {
        &self.monitor
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase.lock().phase
    }

    fn token(&self) -> Result<String, SyncError> {
        self.credentials.get().ok_or(SyncError::Unauthenticated)
    }

    fn forget_rejected_token(&self, error: &RemoteError) {
        if *error == RemoteError::Unauthorized && self.credentials.clear() {
            tracing::warn!("Access token rejected; cleared");
        }
    }

    /// Error for a phase that already has an operation in flight
    fn busy(phase: SyncPhase) -> Option<SyncError> {
        match phase {
            SyncPhase::Loading => Some(SyncError::LoadInProgress),
            p if p.is_in_flight() => Some(SyncError::SaveInFlight),
            _ => None,
        }
    }

    fn begin_load(&self) -> Result<FlightGuard<'_>, SyncError> {
        let mut state = self.phase.lock();
        if let Some(busy) = Self::busy(state.phase) {
            return Err(busy);
        }
        state.phase = SyncPhase::Loading;
        state.last_error = None;
        Ok(FlightGuard {
            phase: &self.phase,
            operation: "load",
            finished: false,
        })
    }

    fn begin_save(&self) -> Result<FlightGuard<'_>, SyncError> {
        let mut state = self.phase.lock();
        if let Some(busy) = Self::busy(state.phase) {
            return Err(busy);
        }
        if self.monitor.is_polling() {
            return Err(SyncError::BuildInProgress);
        }
        state.phase = SyncPhase::Capturing;
        state.last_error = None;
        Ok(FlightGuard {
            phase: &self.phase,
            operation: "save",
            finished: false,
        })
    }

    /// Fetch the stored document and start a new session
    ///
    /// A stored document that cannot be decoded is replaced by the defaults,
    /// keeping its fingerprint so the next save overwrites it.
    pub async fn load(&self) -> Result<LoadReport, SyncError> {
        let token = self.token()?;
        let guard = self.begin_load()?;

        let fetched = self
            .store
            .fetch(&token, &self.settings.path, &self.settings.branch)
            .await;
        let stored = match fetched {
            Ok(None) => None,
            Ok(Some(stored)) => Some((load_document(&stored.bytes), stored.fingerprint)),
            Err(RemoteError::Corrupt {
                fingerprint,
                reason,
            }) => {
                tracing::warn!(
                    path = %self.settings.path,
                    fingerprint = %fingerprint,
                    reason = %reason,
                    "Stored configuration is unreadable; using defaults"
                );
                let fallback = LoadedDocument {
                    document: bootstrap_document(),
                    warnings: vec![format!(
                        "stored configuration is unreadable ({}); defaults substituted",
                        reason
                    )],
                    fell_back: true,
                };
                Some((fallback, fingerprint))
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %self.settings.path, "Failed to load configuration");
                self.forget_rejected_token(&e);
                guard.finish(SyncPhase::for_remote_error(&e), Some(e.to_string()));
                return Err(e.into());
            }
        };

        let report = match stored {
            None => {
                tracing::info!(path = %self.settings.path, "No stored configuration; starting from defaults");
                self.install(Session::new(bootstrap_document(), None)).await;
                guard.finish(SyncPhase::Idle, None);
                LoadReport {
                    bootstrapped: true,
                    fell_back: false,
                    warnings: Vec::new(),
                    fingerprint: None,
                    build_watched: false,
                }
            }
            Some((loaded, fingerprint)) => {
                tracing::info!(
                    store = self.store.name(),
                    path = %self.settings.path,
                    fingerprint = %fingerprint,
                    repairs = loaded.warnings.len(),
                    "Configuration loaded"
                );
                self.install(Session::new(loaded.document, Some(fingerprint.clone())))
                    .await;
                guard.finish(SyncPhase::Idle, None);
                let build_watched = self.settings.watch_on_load
                    && (self.monitor.start() || self.monitor.is_polling());
                LoadReport {
                    bootstrapped: false,
                    fell_back: loaded.fell_back,
                    warnings: loaded.warnings,
                    fingerprint: Some(fingerprint),
                    build_watched,
                }
            }
        };

        Ok(report)
    }

    /// Discard local edits and load again; the only way out of a conflict
    pub async fn reload(&self) -> Result<LoadReport, SyncError> {
        if self.session.lock().await.is_none() {
            return Err(SyncError::NotLoaded);
        }
        self.load().await
    }

    async fn install(&self, session: Session) {
        *self.session.lock().await = Some(session);
    }

    /// Drop the session and stop watching the build
    pub async fn end_session(&self) {
        self.monitor.stop();
        *self.session.lock().await = None;
        let mut state = self.phase.lock();
        if !state.phase.is_in_flight() {
            state.phase = SyncPhase::Idle;
            state.last_error = None;
        }
        tracing::info!("Session ended");
    }

    /// Publish the current document
    pub async fn save(&self) -> Result<SaveReport, SyncError> {
        let token = self.token()?;
        let guard = self.begin_save()?;

        let captured = {
            let mut session = self.session.lock().await;
            match session.as_mut() {
                None => {
                    guard.finish(SyncPhase::Idle, None);
                    return Err(SyncError::NotLoaded);
                }
                Some(session) if session.needs_reload => {
                    guard.finish(SyncPhase::Conflict, Some(SyncError::ReloadRequired.to_string()));
                    return Err(SyncError::ReloadRequired);
                }
                Some(session) => session.capture(),
            }
        };
        let (snapshot, baseline) = match captured {
            Ok(captured) => captured,
            Err(e) => {
                guard.finish(SyncPhase::Rejected, Some(e.to_string()));
                return Err(e.into());
            }
        };

        guard.advance(SyncPhase::Serializing);
        let bytes = match snapshot.to_json_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                guard.finish(SyncPhase::Rejected, Some(e.to_string()));
                return Err(e.into());
            }
        };

        guard.advance(SyncPhase::Writing);
        let sent_at = Utc::now();
        let written = self
            .store
            .write(
                &token,
                &self.settings.path,
                &bytes,
                &self.settings.commit_message,
                baseline.as_ref(),
                &self.settings.branch,
            )
            .await;

        match written {
            Ok(receipt) => {
                let fingerprint = receipt.fingerprint;
                // The session may have ended while the write was out
                let attached = {
                    let mut session = self.session.lock().await;
                    match session.as_mut().filter(|s| s.baseline == baseline) {
                        Some(session) => {
                            session.baseline = Some(fingerprint.clone());
                            true
                        }
                        None => false,
                    }
                };
                let build_started = attached
                    && self
                        .monitor
                        .start_for(BuildTarget::after_write(receipt.commit, sent_at));
                guard.finish(SyncPhase::Succeeded, None);
                tracing::info!(
                    fingerprint = %fingerprint,
                    bytes = bytes.len(),
                    build_started,
                    "Configuration saved"
                );
                Ok(SaveReport {
                    fingerprint,
                    build_started,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "Save failed");
                if matches!(e, RemoteError::Conflict(_)) {
                    if let Some(session) = self.session.lock().await.as_mut() {
                        session.needs_reload = true;
                    }
                }
                if e == RemoteError::Unauthorized {
                    self.credentials.clear();
                }
                guard.finish(SyncPhase::for_remote_error(&e), Some(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Apply an in-memory change to the session
    pub async fn edit<T, F>(&self, f: F) -> Result<T, SyncError>
    where
        F: FnOnce(&mut Session) -> Result<T, ModelError>,
    {
        let mut session = self.session.lock().await;
        let session = session.as_mut().ok_or(SyncError::NotLoaded)?;
        Ok(f(session)?)
    }

    pub async fn document(&self) -> Result<ConfigurationDocument, SyncError> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.document.clone())
            .ok_or(SyncError::NotLoaded)
    }

    /// Remove a page locally, then retire its published output
    ///
    /// The local removal stands whatever happens remotely; the outcome of
    /// retiring the output is reported alongside.
    pub async fn delete_page(&self, page_id: &str, confirmed: bool) -> Result<PageDeletion, SyncError> {
        let page = self
            .edit(|session| {
                let page = session.document.remove_page(page_id, confirmed)?;
                if session.editor.as_ref().is_some_and(|e| e.page_id == page_id) {
                    session.editor = None;
                }
                Ok(page)
            })
            .await?;
        tracing::info!(page_id = %page.id, slug = %page.slug, "Page removed");

        let retirement = self.retire_page_output(&page.slug).await;
        Ok(PageDeletion { page, retirement })
    }

    async fn retire_page_output(&self, slug: &str) -> Retirement {
        let path = self.settings.page_output_path(slug);
        let Some(token) = self.credentials.get() else {
            return Retirement::Skipped {
                reason: "no access token".to_string(),
            };
        };

        let current = match self.store.fetch(&token, &path, &self.settings.branch).await {
            Ok(stored) => Ok(stored.map(|s| s.fingerprint)),
            Err(RemoteError::Corrupt { fingerprint, .. }) => Ok(Some(fingerprint)),
            Err(e) => Err(e),
        };
        let result = match current {
            Ok(None) => Ok(false),
            Ok(Some(fingerprint)) => self
                .store
                .delete(
                    &token,
                    &path,
                    &fingerprint,
                    &format!("Remove page {}", slug),
                    &self.settings.branch,
                )
                .await
                .map(|_| true),
            Err(e) => Err(e),
        };

        match result {
            Ok(true) => {
                tracing::info!(path = %path, "Retired page output");
                Retirement::Retired { path }
            }
            Ok(false) | Err(RemoteError::NotFound(_)) => Retirement::AlreadyAbsent { path },
            Err(e) => {
                if e == RemoteError::Unauthorized {
                    self.credentials.clear();
                }
                tracing::warn!(path = %path, error = %e, "Failed to retire page output");
                Retirement::Failed {
                    path,
                    error: e.to_string(),
                }
            }
        }
    }

    pub async fn status(&self) -> SyncStatus {
        let session = self.session.lock().await;
        let (phase, last_error, last_saved_at) = {
            let state = self.phase.lock();
            (state.phase, state.last_error.clone(), state.last_saved_at)
        };
        let build = self.monitor.state();
        let authenticated = self.credentials.is_present();
        let needs_reload = session.as_ref().is_some_and(|s| s.needs_reload);

        SyncStatus {
            phase,
            save_enabled: session.is_some()
                && authenticated
                && !needs_reload
                && !phase.is_in_flight()
                && !build.is_polling(),
            build,
            loaded: session.is_some(),
            needs_reload,
            authenticated,
            fingerprint: session.as_ref().and_then(|s| s.baseline.clone()),
            last_error,
            last_saved_at,
            editor_page: session
                .as_ref()
                .and_then(|s| s.editor.as_ref().map(|e| e.page_id.clone())),
        }
    }

    /// Fingerprint the session is based on
    pub async fn baseline(&self) -> Option<Fingerprint> {
        self.session.lock().await.as_ref().and_then(|s| s.baseline.clone())
    }
}

impl Drop for Synchronizer {
    fn drop(&mut self) {
        self.monitor.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::build::BuildState;
    use crate::model::PageDraft;
    use crate::remote::{MemoryContentStore, PipelineRun, StoredContent, WriteReceipt};

    const PATH: &str = "data/config.json";

    /// Memory store whose fetches take a while, so calls can interleave
    struct SlowFetch {
        inner: MemoryContentStore,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl ContentStore for SlowFetch {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn fetch(
            &self,
            token: &str,
            path: &str,
            git_ref: &str,
        ) -> Result<Option<StoredContent>, RemoteError> {
            tokio::time::sleep(self.delay).await;
            self.inner.fetch(token, path, git_ref).await
        }

        async fn write(
            &self,
            token: &str,
            path: &str,
            bytes: &[u8],
            message: &str,
            expected: Option<&Fingerprint>,
            branch: &str,
        ) -> Result<WriteReceipt, RemoteError> {
            self.inner
                .write(token, path, bytes, message, expected, branch)
                .await
        }

        async fn delete(
            &self,
            token: &str,
            path: &str,
            expected: &Fingerprint,
            message: &str,
            branch: &str,
        ) -> Result<(), RemoteError> {
            self.inner.delete(token, path, expected, message, branch).await
        }

        async fn list_pipeline_runs(
            &self,
            token: &str,
            limit: u32,
        ) -> Result<Vec<PipelineRun>, RemoteError> {
            self.inner.list_pipeline_runs(token, limit).await
        }
    }

    fn settings() -> SyncSettings {
        SyncSettings {
            path: PATH.to_string(),
            branch: "main".to_string(),
            commit_message: "CMS Update".to_string(),
            pages_output_dir: String::new(),
            watch_on_load: false,
        }
    }

    fn synchronizer(store: &MemoryContentStore, credentials: &CredentialStore) -> Synchronizer {
        let store: Arc<dyn ContentStore> = Arc::new(store.clone());
        let monitor = BuildMonitor::new(store.clone(), credentials.clone(), Duration::from_secs(5), 3);
        Synchronizer::new(store, credentials.clone(), settings(), monitor)
    }

    fn signed_in() -> CredentialStore {
        CredentialStore::with_token(Some("t".to_string()))
    }

    #[tokio::test]
    async fn test_missing_document_bootstraps_defaults() {
        let store = MemoryContentStore::new();
        let sync = synchronizer(&store, &signed_in());

        let report = sync.load().await.unwrap();
        assert!(report.bootstrapped);
        assert!(report.fingerprint.is_none());

        let doc = sync.document().await.unwrap();
        assert_eq!(doc.site_settings.target_country, "US");
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].slug, "home");
    }

    #[tokio::test]
    async fn test_save_without_token_is_refused() {
        let store = MemoryContentStore::new();
        let sync = synchronizer(&store, &CredentialStore::new());
        assert!(matches!(sync.load().await, Err(SyncError::Unauthenticated)));
        assert!(matches!(sync.save().await, Err(SyncError::Unauthenticated)));
        assert_eq!(store.stats().fetches, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_save_then_build_watch() {
        let store = MemoryContentStore::new();
        store.simulate_pipeline(true);
        let sync = synchronizer(&store, &signed_in());
        sync.load().await.unwrap();

        let report = sync.save().await.unwrap();
        assert!(report.build_started);
        assert_eq!(sync.phase(), SyncPhase::Succeeded);
        assert_eq!(sync.baseline().await, Some(report.fingerprint.clone()));
        assert!(!sync.status().await.save_enabled);

        // Saving while the build runs is refused
        assert!(matches!(sync.save().await, Err(SyncError::BuildInProgress)));

        let mut rx = sync.monitor().subscribe();
        let state = rx.wait_for(BuildState::is_terminal).await.unwrap().clone();
        assert!(matches!(state, BuildState::Succeeded { .. }));
        assert!(sync.status().await.save_enabled);

        let stored = store.file("main", PATH).unwrap();
        assert_eq!(stored.fingerprint, report.fingerprint);
        let loaded = load_document(&stored.bytes);
        assert_eq!(loaded.document, sync.document().await.unwrap());
    }

    #[tokio::test]
    async fn test_offline_save_keeps_baseline() {
        let store = MemoryContentStore::new();
        let fingerprint = store.put_file("main", PATH, &bootstrap_document().to_json_bytes().unwrap());
        let sync = synchronizer(&store, &signed_in());
        sync.load().await.unwrap();

        store.set_offline(true);
        let err = sync.save().await.unwrap_err();
        assert!(matches!(err, SyncError::Remote(RemoteError::Transient(_))));

        let status = sync.status().await;
        assert_eq!(status.phase, SyncPhase::TransientFailure);
        assert!(status.save_enabled);
        assert_eq!(status.fingerprint, Some(fingerprint));
        assert_eq!(status.build, BuildState::NotWatching);
        assert_eq!(store.stats().run_polls, 0);
    }

    #[tokio::test]
    async fn test_conflict_requires_reload() {
        let store = MemoryContentStore::new();
        let original = store.put_file("main", PATH, &bootstrap_document().to_json_bytes().unwrap());
        let sync = synchronizer(&store, &signed_in());
        sync.load().await.unwrap();

        // Someone else publishes in the meantime
        let mut theirs = bootstrap_document();
        theirs.site_settings.domain = "other.example".to_string();
        let moved = store.put_file("main", PATH, &theirs.to_json_bytes().unwrap());

        sync.edit(|s| {
            s.document.site_settings.domain = "mine.example".to_string();
            Ok(())
        })
        .await
        .unwrap();

        let err = sync.save().await.unwrap_err();
        assert!(matches!(err, SyncError::Remote(RemoteError::Conflict(_))));
        assert_eq!(sync.phase(), SyncPhase::Conflict);
        assert_eq!(sync.baseline().await, Some(original));
        assert_eq!(store.file("main", PATH).unwrap().fingerprint, moved);

        assert!(matches!(sync.save().await, Err(SyncError::ReloadRequired)));
        assert_eq!(store.stats().writes_started, 1);

        sync.reload().await.unwrap();
        assert_eq!(sync.document().await.unwrap().site_settings.domain, "other.example");
        assert!(sync.status().await.save_enabled);
    }

    #[tokio::test]
    async fn test_single_flight_save() {
        let store = MemoryContentStore::new();
        let sync = Arc::new(synchronizer(&store, &signed_in()));
        sync.load().await.unwrap();

        store.pause_writes();
        let first = tokio::spawn({
            let sync = sync.clone();
            async move { sync.save().await }
        });
        while store.stats().writes_started == 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(sync.phase(), SyncPhase::Writing);
        assert!(matches!(sync.save().await, Err(SyncError::SaveInFlight)));

        // Edits during the write wait for the next save
        sync.edit(|s| {
            s.document.site_settings.domain = "later.example".to_string();
            Ok(())
        })
        .await
        .unwrap();

        store.resume_writes();
        first.await.unwrap().unwrap();

        let stats = store.stats();
        assert_eq!(stats.writes_started, 1);
        assert_eq!(stats.writes_completed, 1);
        let stored = load_document(&store.file("main", PATH).unwrap().bytes).document;
        assert_eq!(stored.site_settings.domain, "streameast.to");
    }

    #[tokio::test]
    async fn test_save_flushes_open_editor() {
        let store = MemoryContentStore::new();
        let sync = synchronizer(&store, &signed_in());
        sync.load().await.unwrap();

        sync.edit(|s| {
            s.open_editor("p_home")?;
            s.edit_draft(PageDraft {
                meta_desc: Some("Every game, live".to_string()),
                ..Default::default()
            })
        })
        .await
        .unwrap();

        sync.save().await.unwrap();
        let stored = load_document(&store.file("main", PATH).unwrap().bytes).document;
        assert_eq!(stored.home_page().unwrap().meta_desc, "Every game, live");
    }

    #[tokio::test]
    async fn test_unauthorized_clears_credential() {
        let store = MemoryContentStore::new();
        store.require_token("good");
        let credentials = CredentialStore::with_token(Some("stale".to_string()));
        let sync = synchronizer(&store, &credentials);

        let err = sync.load().await.unwrap_err();
        assert!(matches!(err, SyncError::Remote(RemoteError::Unauthorized)));
        assert!(!credentials.is_present());
        assert_eq!(sync.phase(), SyncPhase::Unauthorized);

        credentials.set("good").unwrap();
        sync.load().await.unwrap();
        store.require_token("rotated");
        assert!(sync.save().await.is_err());
        assert!(!credentials.is_present());
        assert_eq!(sync.phase(), SyncPhase::Unauthorized);
    }

    #[tokio::test]
    async fn test_validation_is_rejected_verbatim() {
        let store = MemoryContentStore::new();
        let sync = synchronizer(&store, &signed_in());
        sync.load().await.unwrap();

        store.fail_next_write(RemoteError::Validation("content is too large".to_string()));
        sync.save().await.unwrap_err();

        let status = sync.status().await;
        assert_eq!(status.phase, SyncPhase::Rejected);
        assert!(status.last_error.unwrap().contains("content is too large"));
        assert!(status.save_enabled);
    }

    #[tokio::test]
    async fn test_delete_page_survives_remote_failure() {
        let store = MemoryContentStore::new();
        let sync = synchronizer(&store, &signed_in());
        sync.load().await.unwrap();
        let page = sync.edit(|s| Ok(s.document.create_page())).await.unwrap();
        let other = sync.edit(|s| Ok(s.document.create_page())).await.unwrap();
        store.put_file("main", &format!("{}/index.html", page.slug), b"<html/>");

        store.fail_deletes(Some(RemoteError::Transient("timeout".to_string())));
        let deletion = sync.delete_page(&page.id, true).await.unwrap();
        assert!(matches!(deletion.retirement, Retirement::Failed { .. }));
        assert!(sync.document().await.unwrap().page(&page.id).is_none());

        let deletion = sync.delete_page(&other.id, true).await.unwrap();
        assert_eq!(
            deletion.retirement,
            Retirement::AlreadyAbsent {
                path: format!("{}/index.html", other.slug)
            }
        );
    }

    #[tokio::test]
    async fn test_delete_page_retires_output() {
        let store = MemoryContentStore::new();
        let sync = synchronizer(&store, &signed_in());
        sync.load().await.unwrap();
        let page = sync.edit(|s| Ok(s.document.create_page())).await.unwrap();
        let path = format!("{}/index.html", page.slug);
        store.put_file("main", &path, b"<html/>");

        let deletion = sync.delete_page(&page.id, true).await.unwrap();
        assert_eq!(deletion.retirement, Retirement::Retired { path: path.clone() });
        assert!(store.file("main", &path).is_none());

        assert!(matches!(
            sync.delete_page("p_home", true).await,
            Err(SyncError::Model(ModelError::HomeDeletion))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_watches_existing_build() {
        let store = MemoryContentStore::new();
        store.put_file("main", PATH, &bootstrap_document().to_json_bytes().unwrap());
        store.script_runs([Ok(vec![PipelineRun::completed("failure")])]);

        let credentials = signed_in();
        let shared: Arc<dyn ContentStore> = Arc::new(store.clone());
        let monitor = BuildMonitor::new(shared.clone(), credentials.clone(), Duration::from_secs(5), 3);
        let sync = Synchronizer::new(
            shared,
            credentials,
            SyncSettings {
                watch_on_load: true,
                ..settings()
            },
            monitor,
        );

        let report = sync.load().await.unwrap();
        assert!(report.build_watched);

        let mut rx = sync.monitor().subscribe();
        let state = rx.wait_for(BuildState::is_terminal).await.unwrap().clone();
        assert!(matches!(state, BuildState::Failed { .. }));
    }

    #[tokio::test]
    async fn test_end_session_drops_state() {
        let store = MemoryContentStore::new();
        let sync = synchronizer(&store, &signed_in());
        sync.load().await.unwrap();
        sync.end_session().await;

        assert!(matches!(sync.document().await, Err(SyncError::NotLoaded)));
        assert!(matches!(sync.reload().await, Err(SyncError::NotLoaded)));
        assert!(!sync.status().await.loaded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_and_save_exclude_each_other() {
        let store = MemoryContentStore::new();
        store.put_file("main", PATH, &bootstrap_document().to_json_bytes().unwrap());
        let credentials = signed_in();
        let shared: Arc<dyn ContentStore> = Arc::new(SlowFetch {
            inner: store.clone(),
            delay: Duration::from_millis(100),
        });
        let monitor = BuildMonitor::new(shared.clone(), credentials.clone(), Duration::from_secs(5), 3);
        let sync = Arc::new(Synchronizer::new(shared, credentials, settings(), monitor));
        sync.load().await.unwrap();

        // No save while a load is fetching
        let loading = tokio::spawn({
            let sync = sync.clone();
            async move { sync.load().await }
        });
        while sync.phase() != SyncPhase::Loading {
            tokio::task::yield_now().await;
        }
        assert!(matches!(sync.save().await, Err(SyncError::LoadInProgress)));
        loading.await.unwrap().unwrap();
        assert_eq!(sync.phase(), SyncPhase::Idle);

        // No load while a save is writing
        store.pause_writes();
        let saving = tokio::spawn({
            let sync = sync.clone();
            async move { sync.save().await }
        });
        while store.stats().writes_started == 0 {
            tokio::task::yield_now().await;
        }
        assert!(matches!(sync.load().await, Err(SyncError::SaveInFlight)));
        assert!(matches!(sync.save().await, Err(SyncError::SaveInFlight)));
        assert_eq!(sync.phase(), SyncPhase::Writing);

        store.resume_writes();
        saving.await.unwrap().unwrap();
        assert_eq!(sync.phase(), SyncPhase::Succeeded);
        assert_eq!(store.stats().writes_started, 1);
        assert_eq!(store.stats().writes_completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_waits_for_its_own_build() {
        let store = MemoryContentStore::new();
        store.simulate_pipeline(true);
        store.put_file("main", PATH, &bootstrap_document().to_json_bytes().unwrap());
        // The pipeline has not scheduled the new run on the first poll
        store.script_runs([Ok(vec![
            PipelineRun::completed("failure").with_head_sha("previous")
        ])]);
        let sync = synchronizer(&store, &signed_in());
        sync.load().await.unwrap();

        let report = sync.save().await.unwrap();
        assert!(report.build_started);

        let mut rx = sync.monitor().subscribe();
        let state = rx.wait_for(BuildState::is_terminal).await.unwrap().clone();
        assert!(matches!(state, BuildState::Succeeded { .. }));
        assert!(store.stats().run_polls >= 3);
    }

    #[tokio::test]
    async fn test_unreadable_document_falls_back_to_defaults() {
        let store = MemoryContentStore::new();
        let fingerprint = store.put_file("main", PATH, b"{}");
        store.corrupt_file("main", PATH);
        let sync = synchronizer(&store, &signed_in());

        let report = sync.load().await.unwrap();
        assert!(report.fell_back);
        assert!(!report.bootstrapped);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.fingerprint, Some(fingerprint));
        assert_eq!(sync.phase(), SyncPhase::Idle);

        let doc = sync.document().await.unwrap();
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].slug, "home");

        // The next save replaces the unreadable file
        sync.save().await.unwrap();
        let stored = store.fetch("t", PATH, "main").await.unwrap().unwrap();
        assert_eq!(load_document(&stored.bytes).document, doc);
    }

    #[tokio::test]
    async fn test_session_ended_during_write_skips_build_watch() {
        let store = MemoryContentStore::new();
        let sync = Arc::new(synchronizer(&store, &signed_in()));
        sync.load().await.unwrap();

        store.pause_writes();
        let saving = tokio::spawn({
            let sync = sync.clone();
            async move { sync.save().await }
        });
        while store.stats().writes_started == 0 {
            tokio::task::yield_now().await;
        }

        sync.end_session().await;
        assert_eq!(sync.phase(), SyncPhase::Writing);

        store.resume_writes();
        let report = saving.await.unwrap().unwrap();
        assert!(!report.build_started);
        assert_eq!(sync.monitor().state(), BuildState::NotWatching);
    }
}
