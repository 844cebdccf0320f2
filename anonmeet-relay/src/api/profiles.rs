//! Direct profile intake
//!
//! Same path as a form submission, for integrations that collect answers
//! elsewhere.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::spawn_submission;
use crate::types::ParticipantId;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct SubmitProfileRequest {
    pub participant_id: String,
    pub answers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitProfileResponse {
    pub status: String,
}

/// POST /api/v1/profiles
///
/// Accepts the submission and runs the matching pass in the background.
pub async fn submit_profile(
    State(state): State<AppState>,
    Json(request): Json<SubmitProfileRequest>,
) -> ApiResult<(StatusCode, Json<SubmitProfileResponse>)> {
    let participant_id = request.participant_id.trim();
    if participant_id.is_empty() {
        return Err(ApiError::BadRequest("participant_id must not be empty".to_string()));
    }
    if request.answers.iter().all(|a| a.trim().is_empty()) {
        return Err(anonmeet_common::Error::InvalidInput("at least one answer is required".to_string()).into());
    }

    info!(answers = request.answers.len(), "Profile submitted over API");
    spawn_submission(&state, ParticipantId::new(participant_id), request.answers);

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitProfileResponse {
            status: "accepted".to_string(),
        }),
    ))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/api/v1/profiles", post(submit_profile))
}
