//! Application state management

use std::sync::Arc;

use crate::config::{Config, ContentProvider};
use crate::controller::Controller;
use crate::credentials::CredentialStore;
use crate::error::RemoteError;
use crate::remote::{ContentStore, GitHubContentClient, MemoryContentStore};
use crate::sync::Synchronizer;

/// Error type for state initialization
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to initialize content client: {0}")]
    ContentClient(#[from] RemoteError),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    sync: Arc<Synchronizer>,
    controller: Controller,
}

impl AppState {
    /// Create the application state for the configured content provider
    pub fn new(config: Config) -> Result<Self, StateError> {
        let store: Arc<dyn ContentStore> = match config.content.provider {
            ContentProvider::GitHub => Arc::new(GitHubContentClient::new(&config.content)?),
            ContentProvider::Memory => {
                tracing::warn!("Using the in-memory content store; nothing will be published");
                let store = MemoryContentStore::new();
                store.simulate_pipeline(true);
                Arc::new(store)
            }
        };

        Ok(Self::with_store(&config, store))
    }

    /// Create the application state around an existing content store
    pub fn with_store(config: &Config, store: Arc<dyn ContentStore>) -> Self {
        let credentials = CredentialStore::with_token(config.content.token.clone());
        let sync = Arc::new(Synchronizer::from_config(store, credentials, config));
        let controller = Controller::new(sync.clone());

        Self {
            inner: Arc::new(AppStateInner {
                sync,
                controller,
            }),
        }
    }

    /// Get the synchronizer
    pub fn sync(&self) -> &Synchronizer {
        &self.inner.sync
    }

    /// Get the command controller
    pub fn controller(&self) -> &Controller {
        &self.inner.controller
    }
}
