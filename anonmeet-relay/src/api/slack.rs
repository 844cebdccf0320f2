//! Slack webhooks
//!
//! `/slack/events` carries the Events API (URL verification, messages,
//! reactions); `/slack/interactions` carries modal submissions with the
//! participant's answers. Both acknowledge immediately and leave the work
//! to the core.

use axum::{extract::State, routing::post, Form, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, info};

use super::spawn_submission;
use crate::session::InboundMessage;
use crate::types::{ChannelId, ParticipantId};
use crate::{ApiError, ApiResult, AppState};

/// Outer Events API envelope
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventEnvelope {
    UrlVerification { challenge: String },
    EventCallback { event: SlackEvent },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEvent {
    Message {
        channel: String,
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        text: Option<String>,
        /// Edits, joins, bot posts and the like; never relayed
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        bot_id: Option<String>,
        #[serde(default)]
        channel_type: Option<String>,
    },
    ReactionAdded {
        user: String,
        reaction: String,
        item: ReactionItem,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct ReactionItem {
    #[serde(default)]
    pub channel: Option<String>,
}

/// POST /slack/events
pub async fn slack_events(
    State(state): State<AppState>,
    Json(envelope): Json<EventEnvelope>,
) -> Json<Value> {
    match envelope {
        EventEnvelope::UrlVerification { challenge } => {
            info!("Answering Slack URL verification");
            Json(json!({ "challenge": challenge }))
        }
        EventEnvelope::EventCallback { event } => {
            dispatch_event(&state, event);
            Json(json!({ "ok": true }))
        }
        EventEnvelope::Unsupported => Json(json!({ "ok": true })),
    }
}

fn dispatch_event(state: &AppState, event: SlackEvent) {
    match event {
        SlackEvent::Message {
            channel,
            user,
            text,
            subtype,
            bot_id,
            channel_type,
        } => {
            if subtype.is_some() {
                return;
            }
            let (Some(user), Some(text)) = (user, text) else {
                return;
            };
            let sender = ParticipantId::new(user);

            if channel_type.as_deref() == Some("im") {
                let sessions = state.sessions.clone();
                tokio::spawn(async move {
                    sessions.on_direct_message(&sender, &text).await;
                });
                return;
            }

            let outcome = state.sessions.on_message(InboundMessage {
                channel: ChannelId::new(channel),
                sender,
                text,
                from_bot: bot_id.is_some(),
            });
            debug!(?outcome, "Message dispatched");
        }
        SlackEvent::ReactionAdded { user, reaction, item } => {
            if reaction != state.settings.end_reaction {
                return;
            }
            let Some(channel) = item.channel else {
                return;
            };
            let outcome = state
                .sessions
                .on_end_reaction(&ChannelId::new(channel), &ParticipantId::new(user));
            debug!(?outcome, "Reaction dispatched");
        }
        SlackEvent::Other => {}
    }
}

#[derive(Debug, Deserialize)]
pub struct InteractionForm {
    pub payload: String,
}

#[derive(Debug, Deserialize)]
struct InteractionPayload {
    #[serde(rename = "type")]
    kind: String,
    user: SlackUser,
    #[serde(default)]
    view: Option<SubmittedView>,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SubmittedView {
    state: ViewState,
}

#[derive(Debug, Deserialize)]
struct ViewState {
    values: HashMap<String, HashMap<String, InputValue>>,
}

#[derive(Debug, Deserialize)]
struct InputValue {
    #[serde(default)]
    value: Option<String>,
}

/// Trailing number of a block id (`question_3` -> 3)
fn block_order(block_id: &str) -> Option<u32> {
    let digits: String = block_id
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().ok()
}

/// Answers in form order: numbered blocks first by number, the rest by id
fn extract_answers(values: HashMap<String, HashMap<String, InputValue>>) -> Vec<String> {
    let mut blocks: Vec<(String, HashMap<String, InputValue>)> = values.into_iter().collect();
    blocks.sort_by(|(a, _), (b, _)| {
        (block_order(a).is_none(), block_order(a), a).cmp(&(block_order(b).is_none(), block_order(b), b))
    });

    blocks
        .into_iter()
        .filter_map(|(_, inputs)| {
            let mut inputs: Vec<(String, InputValue)> = inputs.into_iter().collect();
            inputs.sort_by(|a, b| a.0.cmp(&b.0));
            inputs.into_iter().find_map(|(_, input)| input.value)
        })
        .collect()
}

/// POST /slack/interactions
pub async fn slack_interactions(
    State(state): State<AppState>,
    Form(form): Form<InteractionForm>,
) -> ApiResult<Json<Value>> {
    let payload: InteractionPayload = serde_json::from_str(&form.payload)
        .map_err(|e| ApiError::BadRequest(format!("invalid interaction payload: {}", e)))?;

    if payload.kind != "view_submission" {
        debug!(kind = %payload.kind, "Ignoring interaction");
        return Ok(Json(json!({})));
    }
    let view = payload
        .view
        .ok_or_else(|| ApiError::BadRequest("view_submission without view".to_string()))?;

    let answers = extract_answers(view.state.values);
    info!(answers = answers.len(), "Form submission received");
    spawn_submission(&state, ParticipantId::new(payload.user.id), answers);

    Ok(Json(json!({ "response_action": "clear" })))
}

pub fn slack_routes() -> Router<AppState> {
    Router::new()
        .route("/slack/events", post(slack_events))
        .route("/slack/interactions", post(slack_interactions))
}
