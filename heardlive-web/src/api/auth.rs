//! Session and auth gate endpoints

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::components::auth_gate::{FederatedForm, GateForm, LogInForm, SignUpForm};
use crate::components::{AuthGate, AuthSnapshot, HandleAvailability};
use crate::error::ApiResult;
use crate::session::BrowserSession;
use crate::AppState;

/// Auth gate response
#[derive(Debug, Serialize)]
pub struct GateResponse {
    /// True once the gate is done and can close
    pub completed: bool,
    pub session: AuthSnapshot,
}

/// GET /api/session
pub async fn current_session(
    Extension(session): Extension<Arc<BrowserSession>>,
) -> ApiResult<Json<AuthSnapshot>> {
    // Catch up if the browser asks before the listener has run
    session.auth.sync().await?;
    Ok(Json(session.auth.snapshot().await))
}

async fn submit_gate(
    state: &AppState,
    session: &BrowserSession,
    form: GateForm,
) -> ApiResult<Json<GateResponse>> {
    let gate = AuthGate::new(&session.auth, state.backends.store.clone());
    let mut completed = false;
    gate.submit(form, |user| {
        tracing::info!(session_id = %session.id, user_id = %user.id, "Auth gate completed");
        completed = true;
    })
    .await?;

    Ok(Json(GateResponse {
        completed,
        session: session.auth.snapshot().await,
    }))
}

/// POST /api/auth/signup
pub async fn sign_up(
    State(state): State<AppState>,
    Extension(session): Extension<Arc<BrowserSession>>,
    Json(form): Json<SignUpForm>,
) -> ApiResult<Json<GateResponse>> {
    submit_gate(&state, &session, GateForm::SignUp(form)).await
}

/// POST /api/auth/login
pub async fn log_in(
    State(state): State<AppState>,
    Extension(session): Extension<Arc<BrowserSession>>,
    Json(form): Json<LogInForm>,
) -> ApiResult<Json<GateResponse>> {
    submit_gate(&state, &session, GateForm::LogIn(form)).await
}

/// POST /api/auth/federated
pub async fn federated(
    State(state): State<AppState>,
    Extension(session): Extension<Arc<BrowserSession>>,
    Json(form): Json<FederatedForm>,
) -> ApiResult<Json<GateResponse>> {
    let gate = AuthGate::new(&session.auth, state.backends.store.clone());
    gate.federated(form).await?;
    Ok(Json(GateResponse {
        completed: true,
        session: session.auth.snapshot().await,
    }))
}

/// POST /api/auth/logout
pub async fn log_out(
    State(state): State<AppState>,
    Extension(session): Extension<Arc<BrowserSession>>,
) -> ApiResult<Json<AuthSnapshot>> {
    AuthGate::new(&session.auth, state.backends.store.clone())
        .log_out()
        .await;
    session.composer.close().await;
    Ok(Json(session.auth.snapshot().await))
}

/// GET /api/handles/:handle/availability
pub async fn handle_availability(
    State(state): State<AppState>,
    Extension(session): Extension<Arc<BrowserSession>>,
    Path(handle): Path<String>,
) -> ApiResult<Json<HandleAvailability>> {
    let gate = AuthGate::new(&session.auth, state.backends.store.clone());
    Ok(Json(gate.check_handle(&handle).await?))
}

/// Build session and auth routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/session", get(current_session))
        .route("/api/auth/signup", post(sign_up))
        .route("/api/auth/login", post(log_in))
        .route("/api/auth/federated", post(federated))
        .route("/api/auth/logout", post(log_out))
        .route("/api/handles/:handle/availability", get(handle_availability))
}
