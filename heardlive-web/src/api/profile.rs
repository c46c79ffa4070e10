//! Profile editor endpoints

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap},
    routing::{get, post},
    Extension, Json, Router,
};
use heardlive_common::models::Profile;
use std::sync::Arc;

use crate::components::profile_editor::ProfileForm;
use crate::components::ProfileEditor;
use crate::error::ApiResult;
use crate::session::BrowserSession;
use crate::AppState;

async fn editor<'a>(state: &AppState, session: &'a BrowserSession) -> ApiResult<ProfileEditor<'a>> {
    Ok(ProfileEditor::load(
        &session.auth,
        state.backends.store.clone(),
        state.backends.objects.clone(),
        state.config.avatar.max_bytes,
    )
    .await?)
}

/// GET /api/profile
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(session): Extension<Arc<BrowserSession>>,
) -> ApiResult<Json<Profile>> {
    Ok(Json(editor(&state, &session).await?.into_profile()))
}

/// PUT /api/profile
pub async fn save_profile(
    State(state): State<AppState>,
    Extension(session): Extension<Arc<BrowserSession>>,
    Json(form): Json<ProfileForm>,
) -> ApiResult<Json<Profile>> {
    let mut editor = editor(&state, &session).await?;
    editor.save(&form).await?;
    Ok(Json(editor.into_profile()))
}

/// POST /api/profile/avatar
///
/// Raw image bytes; the `Content-Type` header carries the MIME type.
pub async fn upload_avatar(
    State(state): State<AppState>,
    Extension(session): Extension<Arc<BrowserSession>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Profile>> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let mut editor = editor(&state, &session).await?;
    editor.upload_avatar(body.to_vec(), &content_type).await?;
    Ok(Json(editor.into_profile()))
}

/// Build profile routes
///
/// Bodies up to twice the avatar limit reach the editor so oversized
/// images get a readable error rather than a bare 413.
pub fn profile_routes(max_avatar_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/api/profile", get(get_profile).put(save_profile))
        .route(
            "/api/profile/avatar",
            post(upload_avatar).layer(DefaultBodyLimit::max(max_avatar_bytes.saturating_mul(2))),
        )
}
