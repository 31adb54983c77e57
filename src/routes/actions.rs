//! Operator action endpoint
//!
//! Every edit, load and save goes through one POST carrying a tagged
//! command, so the admin UI has a single write surface.

use axum::{body::Bytes, extract::State, routing::post, Json, Router};

use crate::controller::{Command, CommandOutcome};
use crate::error::Result;
use crate::state::AppState;

/// Create the actions router
pub fn router() -> Router<AppState> {
    Router::new().route("/", post(dispatch))
}

/// Decoded by hand so malformed commands get the regular error body
async fn dispatch(State(state): State<AppState>, body: Bytes) -> Result<Json<CommandOutcome>> {
    let command: Command = serde_json::from_slice(&body)?;
    let action = command.name();
    let outcome = state.controller().dispatch(command).await.map_err(|e| {
        tracing::debug!(action, error = %e, "Action refused");
        e
    })?;
    Ok(Json(outcome))
}
