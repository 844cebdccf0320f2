//! Session listing
//!
//! Summaries carry channel ids and timestamps only; participant identities
//! never leave the core through this surface.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::session::SessionSummary;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub count: usize,
    pub sessions: Vec<SessionSummary>,
}

/// GET /api/v1/sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionsResponse> {
    let sessions = state.sessions.active_sessions();
    Json(SessionsResponse {
        count: sessions.len(),
        sessions,
    })
}

/// GET /api/v1/sessions/:session_id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionSummary>> {
    state
        .sessions
        .active_sessions()
        .into_iter()
        .find(|s| s.session_id == session_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("session {}", session_id)))
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/sessions", get(list_sessions))
        .route("/api/v1/sessions/:session_id", get(get_session))
}
