//! HTTP surface: chat-platform webhooks, profile intake, session listing

pub mod health;
pub mod profiles;
pub mod sessions;
pub mod slack;

pub use health::health_routes;
pub use profiles::profile_routes;
pub use sessions::session_routes;
pub use slack::slack_routes;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use tracing::{debug, error};

use crate::types::ParticipantId;
use crate::AppState;

/// GET /events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    anonmeet_common::sse::create_event_sse_stream(&state.event_bus, "anonmeet-relay")
}

/// Join the usergroup, store the profile and run its matching pass, all off
/// the request path
pub(crate) fn spawn_submission(state: &AppState, id: ParticipantId, answers: Vec<String>) {
    let engine = state.engine.clone();
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        sessions.join_usergroup(&id).await;
        match engine.submit_profile(id, &answers).await {
            Ok(report) => debug!(
                evaluated = report.evaluated,
                accepted = report.accepted,
                "Submission processed"
            ),
            Err(e) => error!(error = %e, "Profile submission failed"),
        }
    });
}
