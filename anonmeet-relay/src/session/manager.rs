//! Session manager
//!
//! Opens sessions for accepted pairs and dispatches inbound transport
//! events (messages, reactions, admin DMs) to the session that owns the
//! channel. Dispatch never blocks on the gateway: relays go through the
//! session's queues and teardowns run on their own task.

use anonmeet_common::config::RelaySettings;
use anonmeet_common::events::{AnonMeetEvent, EndTrigger, EventBus};
use anonmeet_common::time;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::conversation::{
    ConversationSession, IgnoreReason, SessionContext, SessionPolicy, SessionSummary,
};
use super::messages;
use super::naming::ChannelNamer;
use super::routing::{Route, RoutingTable, Side};
use super::transcript::TranscriptLog;
use crate::collaborators::{GatewayError, TransportGateway};
use crate::types::{ChannelId, ParticipantId};

/// Session setup failures; the pair stays consumed
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Channel creation failed for side {side:?}: {source}")]
    ChannelCreate { side: Side, source: GatewayError },

    #[error("Invite failed for side {side:?}: {source}")]
    Invite { side: Side, source: GatewayError },

    #[error("Channel {0} is already routed to another session")]
    RouteConflict(ChannelId),
}

/// A message observed on some channel
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel: ChannelId,
    pub sender: ParticipantId,
    pub text: String,
    /// Set when the transport marks the post as automated
    pub from_bot: bool,
}

/// What dispatch did with an inbound event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Relayed,
    /// This event won the end transition; teardown is running
    Ending(EndTrigger),
    Ignored(IgnoreReason),
}

pub struct SessionManager {
    ctx: Arc<SessionContext>,
    namer: ChannelNamer,
    bot_user_id: Option<ParticipantId>,
    admin_user_id: Option<ParticipantId>,
    usergroup_id: Option<String>,
}

impl SessionManager {
    pub fn new(gateway: Arc<dyn TransportGateway>, settings: &RelaySettings, event_bus: EventBus) -> Self {
        let ctx = SessionContext {
            gateway,
            routing: Arc::new(RoutingTable::new()),
            transcripts: Arc::new(TranscriptLog::with_retention(settings.transcript_retention)),
            event_bus,
            policy: SessionPolicy::from_settings(settings),
        };
        Self {
            ctx: Arc::new(ctx),
            namer: ChannelNamer::new(settings.channel_prefix.clone()),
            bot_user_id: settings.bot_user_id.clone().map(ParticipantId::new),
            admin_user_id: settings.admin_user_id.clone().map(ParticipantId::new),
            usergroup_id: settings.usergroup_id.clone(),
        }
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.ctx.routing
    }

    /// Add a submitter to the configured directory group. Best-effort:
    /// failures are logged and never block the submission.
    pub async fn join_usergroup(&self, participant: &ParticipantId) -> bool {
        let Some(usergroup) = self.usergroup_id.as_deref() else {
            return false;
        };
        match self.ctx.gateway.add_to_usergroup(usergroup, participant).await {
            Ok(()) => {
                debug!(usergroup, "Submitter added to usergroup");
                true
            }
            Err(e) => {
                warn!(usergroup, error = %e, "Failed to add submitter to usergroup");
                false
            }
        }
    }

    /// Allocate, register, invite, notify, then go Active
    pub async fn open_session(
        &self,
        participant_a: &ParticipantId,
        participant_b: &ParticipantId,
        rationale: &str,
    ) -> Result<Arc<ConversationSession>, SetupError> {
        match self.setup(participant_a, participant_b, rationale).await {
            Ok(session) => Ok(session),
            Err(e) => {
                error!(error = %e, "Session setup aborted");
                self.ctx.event_bus.emit_lossy(AnonMeetEvent::SessionSetupFailed {
                    reason: e.to_string(),
                    timestamp: time::now(),
                });
                Err(e)
            }
        }
    }

    async fn setup(
        &self,
        participant_a: &ParticipantId,
        participant_b: &ParticipantId,
        rationale: &str,
    ) -> Result<Arc<ConversationSession>, SetupError> {
        let gateway = &self.ctx.gateway;
        let name = self.namer.generate();

        let channel_a = gateway
            .create_channel(&ChannelNamer::side_name(&name, Side::A))
            .await
            .map_err(|source| SetupError::ChannelCreate { side: Side::A, source })?;
        let channel_b = gateway
            .create_channel(&ChannelNamer::side_name(&name, Side::B))
            .await
            .map_err(|source| SetupError::ChannelCreate { side: Side::B, source })?;
        debug!(name = %name, a = %participant_a, b = %participant_b, "Channels created");

        let session = ConversationSession::new(
            name,
            participant_a.clone(),
            channel_a,
            participant_b.clone(),
            channel_b,
            self.ctx.clone(),
        );

        let mut registered: Vec<&ChannelId> = Vec::with_capacity(2);
        for side in session.sides() {
            let route = Route {
                session: session.clone(),
                side: side.side,
            };
            if !self.ctx.routing.register(side.channel_id.clone(), route) {
                for channel in registered {
                    self.ctx.routing.remove(channel);
                }
                return Err(SetupError::RouteConflict(side.channel_id.clone()));
            }
            registered.push(&side.channel_id);
        }

        for side in session.sides() {
            if let Err(source) = gateway.invite(&side.channel_id, &side.owner).await {
                session.abort();
                return Err(SetupError::Invite {
                    side: side.side,
                    source,
                });
            }
        }

        let notice = messages::match_notice(rationale, &self.ctx.policy.notice_context());
        for side in session.sides() {
            if let Err(e) = gateway.post_message(&side.channel_id, &notice).await {
                warn!(session_id = %session.id(), side = ?side.side, error = %e, "Failed to post match notice");
            }
        }
        for side in session.sides() {
            let dm = messages::match_direct_message(&side.channel_id);
            if let Err(e) = gateway.send_direct_message(&side.owner, &dm).await {
                warn!(session_id = %session.id(), side = ?side.side, error = %e, "Failed to send match DM");
            }
        }

        session.activate();
        self.ctx.event_bus.emit_lossy(AnonMeetEvent::SessionActivated {
            session_id: session.id(),
            channel_a: session.side(Side::A).channel_id.to_string(),
            channel_b: session.side(Side::B).channel_id.to_string(),
            timestamp: time::now(),
        });
        info!(session_id = %session.id(), name = %session.name(), "Session active");
        Ok(session)
    }

    fn is_automated(&self, sender: &ParticipantId) -> bool {
        self.bot_user_id.as_ref() == Some(sender)
    }

    /// Route a channel message: relay it, or end the session on the marker
    pub fn on_message(&self, message: InboundMessage) -> Dispatch {
        if message.from_bot || self.is_automated(&message.sender) {
            return Dispatch::Ignored(IgnoreReason::AutomatedPost);
        }
        let Some(route) = self.ctx.routing.lookup(&message.channel) else {
            return Dispatch::Ignored(IgnoreReason::UnknownChannel);
        };

        if message.text.contains(self.ctx.policy.end_marker.as_str()) {
            return self.request_end(&route.session, EndTrigger::EndMarker);
        }

        match route
            .session
            .enqueue_relay(route.side, &message.sender, &message.text)
        {
            Ok(()) => Dispatch::Relayed,
            Err(reason) => Dispatch::Ignored(reason),
        }
    }

    /// An end reaction from one of the session's two participants
    pub fn on_end_reaction(&self, channel: &ChannelId, user: &ParticipantId) -> Dispatch {
        let Some(route) = self.ctx.routing.lookup(channel) else {
            return Dispatch::Ignored(IgnoreReason::UnknownChannel);
        };
        if !route.session.is_participant(user) {
            return Dispatch::Ignored(IgnoreReason::NotParticipant);
        }
        self.request_end(&route.session, EndTrigger::EndReaction)
    }

    fn request_end(&self, session: &Arc<ConversationSession>, trigger: EndTrigger) -> Dispatch {
        if !session.try_begin_end(trigger) {
            return Dispatch::Ignored(IgnoreReason::NotActive);
        }
        tokio::spawn(session.clone().finish_teardown(trigger));
        Dispatch::Ending(trigger)
    }

    /// Answer an administrator's transcript request. Returns true if the DM
    /// was a request this service handled.
    pub async fn on_direct_message(&self, sender: &ParticipantId, text: &str) -> bool {
        if self.admin_user_id.as_ref() != Some(sender) {
            return false;
        }
        let query = text.trim();
        if !query.starts_with(self.namer.prefix()) {
            return false;
        }

        let found = self.ctx.transcripts.find(query);
        info!(query, matches = found.len(), "Transcript requested");
        let reply = messages::transcript_reply(query, &found);
        if let Err(e) = self.ctx.gateway.send_direct_message(sender, &reply).await {
            warn!(error = %e, "Failed to send transcript");
        }
        true
    }

    pub fn active_sessions(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = self
            .ctx
            .routing
            .sessions()
            .iter()
            .map(|s| s.summary())
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    pub fn active_session_count(&self) -> usize {
        self.ctx.routing.sessions().len()
    }
}
