//! Read-only views of the session

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::model::{ConfigurationDocument, PriorityEntry};
use crate::state::AppState;
use crate::sync::SyncStatus;

/// Create the status router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/document", get(get_document))
        .route("/priorities/:region", get(get_priorities))
}

async fn get_status(State(state): State<AppState>) -> Json<SyncStatus> {
    Json(state.sync().status().await)
}

async fn get_document(State(state): State<AppState>) -> Result<Json<ConfigurationDocument>> {
    Ok(Json(state.sync().document().await?))
}

/// One region's table in display order
#[derive(Debug, Serialize)]
pub struct PriorityListing {
    pub region: String,
    pub hide_others: bool,
    pub entries: Vec<RankedItem>,
}

#[derive(Debug, Serialize)]
pub struct RankedItem {
    pub name: String,
    #[serde(flatten)]
    pub entry: PriorityEntry,
}

async fn get_priorities(
    State(state): State<AppState>,
    Path(region): Path<String>,
) -> Result<Json<PriorityListing>> {
    let document = state.sync().document().await?;
    let table = document
        .priority_table(&region)
        .ok_or_else(|| AppError::NotFound(format!("No priorities for region {}", region)))?;

    let entries = table
        .ranked()
        .into_iter()
        .map(|ranked| RankedItem {
            name: ranked.name.to_string(),
            entry: ranked.entry.clone(),
        })
        .collect();

    Ok(Json(PriorityListing {
        region,
        hide_others: table.hide_others,
        entries,
    }))
}
