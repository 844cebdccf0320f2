//! Slack Web API gateway

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::gateway::{GatewayError, TransportGateway};
use crate::types::{ChannelId, ParticipantId};

const USER_AGENT: &str = concat!("anonmeet-relay/", env!("CARGO_PKG_VERSION"));

/// Envelope every Web API method answers with
#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channel: Option<SlackChannel>,
    /// Member ids from `usergroups.users.list`
    #[serde(default)]
    users: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct SlackChannel {
    id: String,
}

/// Failure of a single Web API call, before it is mapped to a GatewayError
#[derive(Debug)]
enum CallError {
    Transport(String),
    Api(String),
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallError::Transport(e) => write!(f, "transport: {}", e),
            CallError::Api(e) => write!(f, "api: {}", e),
        }
    }
}

pub struct SlackGateway {
    http_client: reqwest::Client,
    api_url: String,
    bot_token: String,
}

impl SlackGateway {
    pub fn new(api_url: String, bot_token: String) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::PostFailed(e.to_string()))?;

        Ok(Self {
            http_client,
            api_url: api_url.trim_end_matches('/').to_string(),
            bot_token,
        })
    }

    async fn call(&self, method: &str, body: Value) -> Result<SlackResponse, CallError> {
        let request = self
            .http_client
            .post(format!("{}/{}", self.api_url, method))
            .bearer_auth(&self.bot_token)
            .json(&body);
        Self::send(method, request).await
    }

    /// Form-encoded variant for methods that do not take JSON bodies
    async fn call_form(&self, method: &str, params: &[(&str, &str)]) -> Result<SlackResponse, CallError> {
        let request = self
            .http_client
            .post(format!("{}/{}", self.api_url, method))
            .bearer_auth(&self.bot_token)
            .form(params);
        Self::send(method, request).await
    }

    async fn send(method: &str, request: reqwest::RequestBuilder) -> Result<SlackResponse, CallError> {
        let response = request
            .send()
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CallError::Transport(format!("HTTP {}", status.as_u16())));
        }

        let parsed: SlackResponse = response
            .json()
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?;

        if !parsed.ok {
            let error = parsed.error.unwrap_or_else(|| "unknown_error".to_string());
            tracing::debug!(method, error = %error, "Slack API call rejected");
            return Err(CallError::Api(error));
        }

        Ok(parsed)
    }
}

/// Member list for `usergroups.users.update`, or `None` if already a member
fn merged_members(current: Vec<String>, participant: &ParticipantId) -> Option<String> {
    if current.iter().any(|u| u == participant.as_str()) {
        return None;
    }
    let mut members = current;
    members.push(participant.to_string());
    Some(members.join(","))
}

#[async_trait]
impl TransportGateway for SlackGateway {
    async fn create_channel(&self, name: &str) -> Result<ChannelId, GatewayError> {
        let response = self
            .call("conversations.create", json!({ "name": name, "is_private": true }))
            .await
            .map_err(|e| GatewayError::ChannelCreateFailed(e.to_string()))?;

        response
            .channel
            .map(|c| ChannelId::new(c.id))
            .ok_or_else(|| GatewayError::ChannelCreateFailed("response without channel".to_string()))
    }

    async fn invite(&self, channel: &ChannelId, participant: &ParticipantId) -> Result<(), GatewayError> {
        self.call(
            "conversations.invite",
            json!({ "channel": channel.as_str(), "users": participant.as_str() }),
        )
        .await
        .map(|_| ())
        .map_err(|e| GatewayError::InviteFailed(e.to_string()))
    }

    async fn post_message(&self, channel: &ChannelId, text: &str) -> Result<(), GatewayError> {
        self.call("chat.postMessage", json!({ "channel": channel.as_str(), "text": text }))
            .await
            .map(|_| ())
            .map_err(|e| GatewayError::PostFailed(e.to_string()))
    }

    async fn archive(&self, channel: &ChannelId) -> Result<(), GatewayError> {
        match self
            .call("conversations.archive", json!({ "channel": channel.as_str() }))
            .await
        {
            Ok(_) => Ok(()),
            Err(CallError::Api(e)) if e == "already_archived" => Err(GatewayError::AlreadyArchived),
            Err(e) => Err(GatewayError::ArchiveFailed(e.to_string())),
        }
    }

    async fn send_direct_message(&self, participant: &ParticipantId, text: &str) -> Result<(), GatewayError> {
        self.call(
            "chat.postMessage",
            json!({ "channel": participant.as_str(), "text": text }),
        )
        .await
        .map(|_| ())
        .map_err(|e| GatewayError::PostFailed(e.to_string()))
    }

    async fn add_to_usergroup(&self, usergroup: &str, participant: &ParticipantId) -> Result<(), GatewayError> {
        // `usergroups.users.update` replaces the whole member list
        let current = self
            .call_form("usergroups.users.list", &[("usergroup", usergroup)])
            .await
            .map_err(|e| GatewayError::UsergroupFailed(e.to_string()))?
            .users
            .unwrap_or_default();

        let Some(users) = merged_members(current, participant) else {
            return Ok(());
        };

        self.call_form(
            "usergroups.users.update",
            &[("usergroup", usergroup), ("users", users.as_str())],
        )
        .await
        .map(|_| ())
        .map_err(|e| GatewayError::UsergroupFailed(e.to_string()))
    }
}
