//! Experience composer endpoints

use axum::{
    extract::Path,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use heardlive_common::models::{CatalogArtist, UserId};
use heardlive_common::Error;
use serde::Deserialize;
use std::sync::Arc;

use crate::components::composer::FormFields;
use crate::components::ComposerState;
use crate::error::ApiResult;
use crate::session::BrowserSession;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct OpenRequest {
    pub artist_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CompanionRequest {
    pub id: UserId,
}

/// GET /api/composer
pub async fn get_composer(
    Extension(session): Extension<Arc<BrowserSession>>,
) -> Json<ComposerState> {
    Json(session.composer.state().await)
}

/// POST /api/composer/open
///
/// The artist must be among the current search results or already on the
/// user's wall.
pub async fn open_composer(
    Extension(session): Extension<Arc<BrowserSession>>,
    Json(request): Json<OpenRequest>,
) -> ApiResult<Json<ComposerState>> {
    let artist = match session.search.result(&request.artist_id).await {
        Some(artist) => artist,
        None => session
            .auth
            .experience_for_artist(&request.artist_id)
            .await
            .map(|record| CatalogArtist::from(&record.artist))
            .ok_or_else(|| Error::NotFound("Artist".to_string()))?,
    };

    Ok(Json(session.composer.open(artist, &session.auth).await?))
}

/// PATCH /api/composer
pub async fn update_composer(
    Extension(session): Extension<Arc<BrowserSession>>,
    Json(fields): Json<FormFields>,
) -> ApiResult<Json<ComposerState>> {
    Ok(Json(session.composer.set_fields(fields).await?))
}

/// POST /api/composer/companions
pub async fn add_companion(
    Extension(session): Extension<Arc<BrowserSession>>,
    Json(request): Json<CompanionRequest>,
) -> ApiResult<Json<ComposerState>> {
    let state = session
        .composer
        .add_companion(request.id, &session.companions, &session.auth)
        .await?;
    Ok(Json(state))
}

/// DELETE /api/composer/companions/:id
pub async fn remove_companion(
    Extension(session): Extension<Arc<BrowserSession>>,
    Path(id): Path<UserId>,
) -> ApiResult<Json<ComposerState>> {
    Ok(Json(session.composer.remove_companion(id).await?))
}

/// POST /api/composer/submit
pub async fn submit_composer(
    Extension(session): Extension<Arc<BrowserSession>>,
) -> ApiResult<Json<ComposerState>> {
    Ok(Json(session.composer.submit(&session.auth).await?))
}

/// POST /api/composer/close
pub async fn close_composer(
    Extension(session): Extension<Arc<BrowserSession>>,
) -> Json<ComposerState> {
    Json(session.composer.close().await)
}

/// Build composer routes
pub fn composer_routes() -> Router<AppState> {
    Router::new()
        .route("/api/composer", get(get_composer).patch(update_composer))
        .route("/api/composer/open", post(open_composer))
        .route("/api/composer/companions", post(add_companion))
        .route("/api/composer/companions/:id", delete(remove_companion))
        .route("/api/composer/submit", post(submit_composer))
        .route("/api/composer/close", post(close_composer))
}
