//! heardlive-web library
//!
//! Backend-for-frontend for "I heard this live": serves the pages and a
//! JSON API, keeps one set of interaction components per browser session
//! and talks to the identity provider, data store, object storage and
//! music catalog through the ports in [`services`].

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use heardlive_common::config::TomlConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod components;
pub mod error;
pub mod services;
pub mod session;

use error::RecordedError;
use services::Backends;
use session::SessionRegistry;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// External collaborators
    pub backends: Backends,
    /// Loaded configuration
    pub config: Arc<TomlConfig>,
    /// Live browser sessions
    pub sessions: Arc<SessionRegistry>,
    /// Server startup time (for uptime)
    pub startup_time: DateTime<Utc>,
    /// Last server-side error (for /health)
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(backends: Backends, config: TomlConfig) -> Self {
        let sessions = SessionRegistry::new(
            backends.clone(),
            config.search.clone(),
            Duration::from_secs(config.sessions.idle_timeout_secs),
        );

        Self {
            backends,
            config: Arc::new(config),
            sessions: Arc::new(sessions),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Keep the detail of the latest server-side failure for `/health`
async fn record_last_error(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if let Some(RecordedError(detail)) = response.extensions().get::<RecordedError>() {
        *state.last_error.write().await = Some(detail.clone());
    }
    response
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    // Routes that act for a browser session
    let sessioned = Router::new()
        .merge(api::auth_routes())
        .merge(api::search_routes())
        .merge(api::composer_routes())
        .merge(api::profile_routes(state.config.avatar.max_bytes))
        .route("/events", get(api::event_stream))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session::session_middleware,
        ));

    // Public routes (no browser session)
    let public = Router::new()
        .merge(api::health_routes())
        .merge(api::wall_routes())
        .merge(api::ui_routes());

    Router::new()
        .merge(sessioned)
        .merge(public)
        .layer(middleware::from_fn_with_state(state.clone(), record_last_error))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
