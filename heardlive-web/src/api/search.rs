//! Debounced search endpoints
//!
//! The page calls these on every keystroke. Each browser session owns
//! its debouncers, so only the newest request of a burst reaches the
//! catalog and the earlier ones answer `superseded`.

use axum::{
    extract::Query,
    routing::get,
    Extension, Json, Router,
};
use heardlive_common::Error;
use serde::Deserialize;
use std::sync::Arc;

use crate::components::composer::CompanionResults;
use crate::components::SearchResponse;
use crate::error::ApiResult;
use crate::session::BrowserSession;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

/// GET /api/search?q=
pub async fn search_artists(
    Extension(session): Extension<Arc<BrowserSession>>,
    Query(params): Query<SearchParams>,
) -> Json<SearchResponse> {
    let experiences = session.auth.experiences().await;
    Json(session.search.search(&params.q, &experiences).await)
}

/// GET /api/companions?q=
pub async fn search_companions(
    Extension(session): Extension<Arc<BrowserSession>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<CompanionResults>> {
    let user = session.auth.user().await.ok_or(Error::Unauthenticated)?;
    Ok(Json(session.companions.search(&params.q, user.id).await?))
}

/// Build search routes
pub fn search_routes() -> Router<AppState> {
    Router::new()
        .route("/api/search", get(search_artists))
        .route("/api/companions", get(search_companions))
}
