//! Route modules for the Site Publisher admin API

pub mod actions;
pub mod health;
pub mod status;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/health", health::router())
        .nest("/api/v1/health", health::router())
        .nest("/api/v1/actions", actions::router())
        .nest("/api/v1", status::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
