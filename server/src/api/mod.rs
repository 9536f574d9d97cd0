//! API Router and Application State

mod channels;
mod error;
mod ice;

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::{Json, Router};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::config::Config;
use crate::voice::{ActiveUserDirectory, SignalingCoordinator};
use crate::ws::{self, ControlRegistry};

pub use error::ApiError;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,
    /// Server configuration
    pub config: Arc<Config>,
    /// Control-channel registry
    pub control: Arc<ControlRegistry>,
    /// Signaling coordinator
    pub coordinator: Arc<SignalingCoordinator>,
    /// Active-user directory (read by the HTTP API)
    pub active: Arc<ActiveUserDirectory>,
}

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = if state.config.cors_allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .cors_allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let protected = Router::new()
        .route(
            "/api/channels",
            post(channels::create_channel).get(channels::list_my_channels),
        )
        .route("/api/channels/public", get(channels::list_public_channels))
        .route(
            "/api/channels/{id}",
            get(channels::get_channel)
                .put(channels::update_channel)
                .delete(channels::delete_channel),
        )
        .route("/api/channels/{id}/active", get(channels::active_users))
        .route("/api/ice-servers", get(ice::get_ice_servers))
        .layer(from_fn_with_state(state.clone(), auth::require_auth));

    Router::new()
        .route("/health", get(health))
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login))
        .route("/ws", get(ws::handler))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Liveness probe.
///
/// GET /health
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
