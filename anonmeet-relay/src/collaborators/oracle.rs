//! Compatibility oracle
//!
//! Scores two profiles 0..=100 with a free-text rationale. The production
//! oracle asks an OpenAI-compatible chat-completions endpoint and pulls the
//! first `NN%` out of the reply.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("anonmeet-relay/", env!("CARGO_PKG_VERSION"));

static PERCENTAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{1,3})\s*%").expect("valid percentage pattern"));

/// Oracle failures; both count as "no match" for the pass
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    #[error("Oracle response malformed: {0}")]
    MalformedResponse(String),
}

/// A scored comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compatibility {
    /// 0..=100
    pub percentage: u8,
    /// Explanation shown to both participants on match
    pub rationale: String,
}

/// Judges how well two profiles fit together
#[async_trait]
pub trait CompatibilityOracle: Send + Sync {
    async fn score(&self, profile_a: &str, profile_b: &str) -> Result<Compatibility, OracleError>;
}

/// Extract the first percentage from free text
pub fn parse_percentage(text: &str) -> Result<u8, OracleError> {
    let captures = PERCENTAGE
        .captures(text)
        .ok_or_else(|| OracleError::MalformedResponse("no percentage in response".to_string()))?;

    let value: u16 = captures[1]
        .parse()
        .map_err(|e| OracleError::MalformedResponse(format!("bad percentage: {}", e)))?;

    u8::try_from(value)
        .ok()
        .filter(|v| *v <= 100)
        .ok_or_else(|| OracleError::MalformedResponse(format!("percentage out of range: {}", value)))
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Chat-completions backed oracle
pub struct OpenAiOracle {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiOracle {
    pub fn new(endpoint: String, api_key: String, model: String) -> Result<Self, OracleError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| OracleError::Unavailable(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint,
            api_key,
            model,
        })
    }

    fn prompt(profile_a: &str, profile_b: &str) -> String {
        format!(
            "Compare the following user interests and provide a match percentage based on shared \
             interests. Focus on positive matches but also make sure that the matches make sense \
             and they actually have something in common:\n\n\
             User 1: {}\nUser 2: {}\n\n\
             Provide the match percentage and reasons for the match.",
            profile_a, profile_b
        )
    }
}

#[async_trait]
impl CompatibilityOracle for OpenAiOracle {
    async fn score(&self, profile_a: &str, profile_b: &str) -> Result<Compatibility, OracleError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Self::prompt(profile_a, profile_b),
            }],
        };

        tracing::debug!(model = %self.model, "Querying compatibility oracle");

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(OracleError::Unavailable(format!("HTTP {}: {}", status.as_u16(), error_text)));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::MalformedResponse(e.to_string()))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| OracleError::MalformedResponse("response has no choices".to_string()))?;

        let percentage = parse_percentage(&content)?;
        tracing::debug!(percentage, "Oracle scored pair");

        Ok(Compatibility {
            percentage,
            rationale: content.trim().to_string(),
        })
    }
}
