//! Transport gateway
//!
//! Everything the core needs from the chat platform: channels, invitations,
//! posts, archival, direct messages and directory groups. Calls are fallible; the session
//! decides which failures abort and which are absorbed.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ChannelId, ParticipantId};

/// Gateway failures
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Channel creation failed: {0}")]
    ChannelCreateFailed(String),

    #[error("Invite failed: {0}")]
    InviteFailed(String),

    #[error("Post failed: {0}")]
    PostFailed(String),

    #[error("Archive failed: {0}")]
    ArchiveFailed(String),

    #[error("Usergroup update failed: {0}")]
    UsergroupFailed(String),

    /// The channel was archived before this call; callers count it as success
    #[error("Channel already archived")]
    AlreadyArchived,
}

#[async_trait]
pub trait TransportGateway: Send + Sync {
    /// Create a private channel and return its id
    async fn create_channel(&self, name: &str) -> Result<ChannelId, GatewayError>;

    async fn invite(&self, channel: &ChannelId, participant: &ParticipantId) -> Result<(), GatewayError>;

    async fn post_message(&self, channel: &ChannelId, text: &str) -> Result<(), GatewayError>;

    async fn archive(&self, channel: &ChannelId) -> Result<(), GatewayError>;

    /// Post to a participant's direct-message conversation
    async fn send_direct_message(&self, participant: &ParticipantId, text: &str) -> Result<(), GatewayError>;

    /// Add a participant to a directory group, keeping existing members
    async fn add_to_usergroup(&self, usergroup: &str, participant: &ParticipantId) -> Result<(), GatewayError>;
}
