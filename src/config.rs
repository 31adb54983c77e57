//! Configuration management for Site Publisher

use serde::Deserialize;
use std::env;
use thiserror::Error;

use crate::credentials::AuthScheme;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be set when CONTENT_PROVIDER is github (use CONTENT_PROVIDER=memory for local work)")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub content: ContentConfig,
    pub build: BuildConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Where the configuration document lives
#[derive(Clone, Deserialize)]
pub struct ContentConfig {
    pub provider: ContentProvider,
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    /// Document path inside the repository
    pub path: String,
    pub branch: String,
    pub commit_message: String,
    pub auth_scheme: AuthScheme,
    /// Token used until the operator supplies one
    pub token: Option<String>,
    /// Directory holding each page's rendered `{slug}/index.html`
    pub pages_output_dir: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentProvider {
    GitHub,
    /// In-process store, nothing leaves the machine
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    pub poll_interval_secs: u64,
    /// Consecutive failed polls tolerated before giving up
    pub max_failed_ticks: u32,
    /// Start watching the pipeline as soon as a document is loaded
    pub watch_on_load: bool,
}

impl std::fmt::Debug for ContentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentConfig")
            .field("provider", &self.provider)
            .field("api_base", &self.api_base)
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("path", &self.path)
            .field("branch", &self.branch)
            .field("auth_scheme", &self.auth_scheme)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        ContentConfig {
            provider: ContentProvider::Memory,
            api_base: "https://api.github.com".to_string(),
            owner: String::new(),
            repo: String::new(),
            path: "data/config.json".to_string(),
            branch: "main".to_string(),
            commit_message: "CMS Update".to_string(),
            auth_scheme: AuthScheme::Bearer,
            token: None,
            pages_output_dir: String::new(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            poll_interval_secs: 5,
            max_failed_ticks: 3,
            watch_on_load: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            content: ContentConfig::default(),
            build: BuildConfig::default(),
        }
    }
}

impl Config {
    /// Read configuration from the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from a variable lookup
    ///
    /// The GitHub provider needs `CONTENT_OWNER` and `CONTENT_REPO`; without
    /// them nothing could be published, so their absence is an error rather
    /// than a silent switch to the in-memory store.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parse = |key: &str| var(key).and_then(|v| v.trim().parse::<u64>().ok());
        let defaults = ContentConfig::default();
        let build_defaults = BuildConfig::default();

        let provider = match var("CONTENT_PROVIDER")
            .unwrap_or_else(|| "github".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "memory" => ContentProvider::Memory,
            _ => ContentProvider::GitHub,
        };

        let (owner, repo) = match provider {
            ContentProvider::GitHub => (
                var("CONTENT_OWNER").ok_or(ConfigError::Missing("CONTENT_OWNER"))?,
                var("CONTENT_REPO").ok_or(ConfigError::Missing("CONTENT_REPO"))?,
            ),
            ContentProvider::Memory => (
                var("CONTENT_OWNER").unwrap_or_default(),
                var("CONTENT_REPO").unwrap_or_default(),
            ),
        };

        Ok(Config {
            server: ServerConfig {
                host: var("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: var("SERVER_PORT")
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(3000),
            },
            content: ContentConfig {
                provider,
                api_base: var("CONTENT_API_BASE").unwrap_or(defaults.api_base),
                owner,
                repo,
                path: var("CONTENT_PATH").unwrap_or(defaults.path),
                branch: var("CONTENT_BRANCH").unwrap_or(defaults.branch),
                commit_message: var("CONTENT_COMMIT_MESSAGE").unwrap_or(defaults.commit_message),
                auth_scheme: var("CONTENT_AUTH_SCHEME")
                    .map(|v| AuthScheme::parse(&v))
                    .unwrap_or_default(),
                token: var("CONTENT_TOKEN"),
                pages_output_dir: var("PAGES_OUTPUT_DIR").unwrap_or(defaults.pages_output_dir),
                request_timeout_secs: parse("REQUEST_TIMEOUT_SECS")
                    .unwrap_or(defaults.request_timeout_secs),
            },
            build: BuildConfig {
                poll_interval_secs: parse("BUILD_POLL_INTERVAL_SECS")
                    .unwrap_or(build_defaults.poll_interval_secs)
                    .max(1),
                max_failed_ticks: var("BUILD_MAX_FAILED_TICKS")
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(build_defaults.max_failed_ticks)
                    .max(1),
                watch_on_load: var("BUILD_WATCH_ON_LOAD")
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(build_defaults.watch_on_load),
            },
        })
    }
}
