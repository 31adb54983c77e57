//! Session credential store
//!
//! Holds the content-store access token for the lifetime of the process.
//! Every remote call reads it through [`CredentialStore::get`]; an
//! authentication failure anywhere clears it so the operator is asked again.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Access token must not be empty")]
    Empty,
}

/// How the token is presented in the `Authorization` header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    #[default]
    Bearer,
    /// Legacy `token <value>` form
    Token,
}

impl AuthScheme {
    pub fn header_value(self, token: &str) -> String {
        match self {
            AuthScheme::Bearer => format!("Bearer {}", token),
            AuthScheme::Token => format!("token {}", token),
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "token" => AuthScheme::Token,
            _ => AuthScheme::Bearer,
        }
    }
}

/// Shared, cloneable token holder
#[derive(Clone, Default)]
pub struct CredentialStore {
    inner: Arc<RwLock<Option<String>>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with a token, ignoring blank values
    pub fn with_token(token: Option<String>) -> Self {
        let store = Self::new();
        if let Some(token) = token {
            let _ = store.set(&token);
        }
        store
    }

    /// Replace the stored token
    pub fn set(&self, token: &str) -> Result<(), CredentialError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(CredentialError::Empty);
        }
        *self.inner.write() = Some(token.to_string());
        tracing::debug!("Access token updated");
        Ok(())
    }

    pub fn get(&self) -> Option<String> {
        self.inner.read().clone()
    }

    /// Forget the token; returns whether one was held
    pub fn clear(&self) -> bool {
        let had = self.inner.write().take().is_some();
        if had {
            tracing::info!("Access token cleared");
        }
        had
    }

    pub fn is_present(&self) -> bool {
        self.inner.read().is_some()
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = if self.is_present() { "<redacted>" } else { "<none>" };
        f.debug_struct("CredentialStore").field("token", &token).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_clear() {
        let store = CredentialStore::new();
        assert!(store.get().is_none());

        store.set("  ghp_abc  ").unwrap();
        assert_eq!(store.get().as_deref(), Some("ghp_abc"));

        store.set("ghp_def").unwrap();
        assert_eq!(store.get().as_deref(), Some("ghp_def"));

        assert!(store.clear());
        assert!(!store.clear());
        assert!(!store.is_present());
    }

    #[test]
    fn test_empty_token_rejected() {
        let store = CredentialStore::with_token(Some("ghp_abc".to_string()));
        assert_eq!(store.set("   "), Err(CredentialError::Empty));
        assert_eq!(store.get().as_deref(), Some("ghp_abc"));

        assert!(!CredentialStore::with_token(Some(String::new())).is_present());
    }

    #[test]
    fn test_clones_share_the_token() {
        let store = CredentialStore::new();
        let other = store.clone();
        store.set("ghp_abc").unwrap();
        assert!(other.is_present());
    }

    #[test]
    fn test_debug_redacts() {
        let store = CredentialStore::with_token(Some("ghp_secret".to_string()));
        let printed = format!("{:?}", store);
        assert!(!printed.contains("ghp_secret"));
        assert!(printed.contains("redacted"));
    }

    #[test]
    fn test_auth_scheme_header() {
        assert_eq!(AuthScheme::Bearer.header_value("x"), "Bearer x");
        assert_eq!(AuthScheme::parse("TOKEN").header_value("x"), "token x");
        assert_eq!(AuthScheme::parse("whatever"), AuthScheme::Bearer);
    }
}
