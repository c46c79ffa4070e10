//! Public wall JSON endpoint

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use crate::components::{load_wall, WallView};
use crate::error::ApiResult;
use crate::AppState;

/// GET /api/walls/:handle
///
/// Not-found walls answer 404 with the `not_found` view as body.
pub async fn get_wall(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> ApiResult<Response> {
    let view = load_wall(state.backends.store.as_ref(), &handle).await?;
    let status = match view {
        WallView::NotFound => StatusCode::NOT_FOUND,
        WallView::Found(_) => StatusCode::OK,
    };
    Ok((status, Json(view)).into_response())
}

/// Build wall routes
pub fn wall_routes() -> Router<AppState> {
    Router::new().route("/api/walls/:handle", get(get_wall))
}
