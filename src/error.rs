//! Error types for the Site Publisher server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::credentials::CredentialError;
use crate::model::ModelError;
use crate::remote::Fingerprint;
use crate::sync::SyncError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("{0}")]
    Model(#[from] ModelError),

    #[error("{0}")]
    Sync(#[from] SyncError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Content store errors
///
/// `NotFound` is an expected outcome on first run and is handled by callers
/// rather than surfaced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication rejected by the content store")]
    Unauthorized,

    #[error("Stale fingerprint: {0}")]
    Conflict(String),

    #[error("Rejected by the content store: {0}")]
    Validation(String),

    #[error("Content store unavailable: {0}")]
    Transient(String),

    #[error("Undecodable content: {0}")]
    Decode(String),

    /// The file exists at `fingerprint` but its body cannot be decoded
    #[error("Stored file is unreadable: {reason}")]
    Corrupt {
        fingerprint: Fingerprint,
        reason: String,
    },
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl AppError {
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Json(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Credential(_) => (StatusCode::BAD_REQUEST, "invalid_token"),
            AppError::Model(e) => classify_model(e),
            AppError::Sync(e) => match e {
                SyncError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
                SyncError::SaveInFlight => (StatusCode::CONFLICT, "save_in_flight"),
                SyncError::BuildInProgress => (StatusCode::CONFLICT, "build_in_progress"),
                SyncError::ReloadRequired => (StatusCode::CONFLICT, "reload_required"),
                SyncError::NotLoaded => (StatusCode::CONFLICT, "not_loaded"),
                SyncError::LoadInProgress => (StatusCode::CONFLICT, "load_in_progress"),
                SyncError::Model(e) => classify_model(e),
                SyncError::Serialize(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
                SyncError::Remote(remote) => match remote {
                    RemoteError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
                    RemoteError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
                    RemoteError::Validation(_) => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "validation_failed")
                    }
                    RemoteError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                    RemoteError::Transient(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
                    RemoteError::Decode(_) | RemoteError::Corrupt { .. } => {
                        (StatusCode::BAD_GATEWAY, "decode_failed")
                    }
                },
            },
        }
    }
}

fn classify_model(error: &ModelError) -> (StatusCode, &'static str) {
    match error {
        ModelError::PageNotFound(_)
        | ModelError::EntryNotFound { .. }
        | ModelError::MenuItemNotFound { .. }
        | ModelError::EntityNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        ModelError::ConfirmationRequired(_) => (StatusCode::BAD_REQUEST, "confirmation_required"),
        _ => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_edit"),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.classify();
        let message = match &self {
            AppError::Sync(SyncError::Serialize(e)) => {
                tracing::error!("Serialization error: {}", e);
                "An internal error occurred".to_string()
            }
            AppError::Sync(SyncError::Remote(e)) => {
                tracing::warn!("Content store error: {}", e);
                e.to_string()
            }
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}
