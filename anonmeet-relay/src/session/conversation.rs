//! Conversation session
//!
//! A session owns two channels, one per participant, and relays between
//! them while `Active`. The state lives in a `watch` channel so the
//! `Active -> Ending` step is a single compare-and-set: whichever end
//! trigger (marker, reaction, countdown) wins it runs the teardown, every
//! later trigger is a no-op.
//!
//! Relay order is per source channel: each side has an unbounded FIFO
//! drained by one worker task. Ending closes both queues; the teardown
//! waits for the workers to drain before posting the reveal.

use anonmeet_common::config::RelaySettings;
use anonmeet_common::events::{AnonMeetEvent, EndTrigger, EventBus};
use anonmeet_common::time;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::messages;
use super::routing::{ChannelSide, RoutingTable, Side};
use super::state::{SessionState, StateTimeline};
use super::transcript::TranscriptLog;
use crate::collaborators::{GatewayError, TransportGateway};
use crate::types::{ChannelId, ParticipantId};

/// Timing and trigger settings every session runs under
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub lifetime: Duration,
    pub notice_interval: Duration,
    pub end_grace: Duration,
    pub end_marker: String,
    pub end_reaction: String,
    pub community_channel: Option<String>,
}

impl SessionPolicy {
    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self {
            lifetime: settings.session_lifetime,
            notice_interval: settings.notice_interval,
            end_grace: settings.end_grace,
            end_marker: settings.end_marker.clone(),
            end_reaction: settings.end_reaction.clone(),
            community_channel: settings.community_channel_id.clone(),
        }
    }

    pub fn notice_context(&self) -> messages::NoticeContext<'_> {
        messages::NoticeContext {
            end_marker: &self.end_marker,
            end_reaction: &self.end_reaction,
            lifetime: self.lifetime,
            community_channel: self.community_channel.as_deref(),
        }
    }
}

/// Collaborators shared by every session
pub struct SessionContext {
    pub gateway: Arc<dyn TransportGateway>,
    pub routing: Arc<RoutingTable>,
    pub transcripts: Arc<TranscriptLog>,
    pub event_bus: EventBus,
    pub policy: SessionPolicy,
}

/// Why a message was not relayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Channel is not (or no longer) routed
    UnknownChannel,
    /// Posted by the relay itself or another bot
    AutomatedPost,
    /// Session is not Active
    NotActive,
    /// End reaction from someone outside the session
    NotParticipant,
}

struct RelayItem {
    sender: ParticipantId,
    text: String,
}

/// Identity-free view of a session for the HTTP surface
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub name: String,
    pub state: SessionState,
    pub channel_a: ChannelId,
    pub channel_b: ChannelId,
    pub timeline: StateTimeline,
}

pub struct ConversationSession {
    id: Uuid,
    name: String,
    sides: [ChannelSide; 2],
    state: watch::Sender<SessionState>,
    timeline: Mutex<StateTimeline>,
    relay_queues: Mutex<Option<[mpsc::UnboundedSender<RelayItem>; 2]>>,
    relay_workers: Mutex<Vec<JoinHandle<()>>>,
    countdown: CancellationToken,
    ctx: Arc<SessionContext>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConversationSession {
    pub(crate) fn new(
        name: String,
        participant_a: ParticipantId,
        channel_a: ChannelId,
        participant_b: ParticipantId,
        channel_b: ChannelId,
        ctx: Arc<SessionContext>,
    ) -> Arc<Self> {
        let side_a = ChannelSide {
            side: Side::A,
            channel_id: channel_a.clone(),
            owner: participant_a.clone(),
            partner: participant_b.clone(),
            sibling: channel_b.clone(),
        };
        let side_b = ChannelSide {
            side: Side::B,
            channel_id: channel_b,
            owner: participant_b,
            partner: participant_a,
            sibling: channel_a,
        };
        let (state, _) = watch::channel(SessionState::Created);

        Arc::new(Self {
            id: Uuid::new_v4(),
            name,
            sides: [side_a, side_b],
            state,
            timeline: Mutex::new(StateTimeline::new(time::now())),
            relay_queues: Mutex::new(None),
            relay_workers: Mutex::new(Vec::new()),
            countdown: CancellationToken::new(),
            ctx,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Base channel name shared by both sides
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn side(&self, side: Side) -> &ChannelSide {
        &self.sides[side.index()]
    }

    pub fn sides(&self) -> &[ChannelSide; 2] {
        &self.sides
    }

    pub fn timeline(&self) -> StateTimeline {
        lock(&self.timeline).clone()
    }

    pub fn is_participant(&self, who: &ParticipantId) -> bool {
        self.sides.iter().any(|s| &s.owner == who)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id,
            name: self.name.clone(),
            state: self.state(),
            channel_a: self.sides[0].channel_id.clone(),
            channel_b: self.sides[1].channel_id.clone(),
            timeline: self.timeline(),
        }
    }

    /// Resolves once the session reaches `target`
    pub async fn wait_for_state(&self, target: SessionState) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| *s == target).await;
    }

    fn mark(&self, state: SessionState) {
        lock(&self.timeline).record(state, time::now());
    }

    /// `Created -> Active`: start relay workers and the countdown
    pub(crate) fn activate(self: &Arc<Self>) -> bool {
        let mut queues = lock(&self.relay_queues);
        let won = self.state.send_if_modified(|s| {
            if *s == SessionState::Created {
                *s = SessionState::Active;
                true
            } else {
                false
            }
        });
        if !won {
            return false;
        }

        // Workers are registered before the queue lock is released, so a
        // teardown that wins the end gate always has them to drain.
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        *queues = Some([tx_a, tx_b]);

        let workers: Vec<JoinHandle<()>> = [(Side::A, rx_a), (Side::B, rx_b)]
            .into_iter()
            .map(|(side, rx)| {
                let from = self.side(side);
                tokio::spawn(relay_worker(
                    self.ctx.gateway.clone(),
                    from.sibling.clone(),
                    from.partner.clone(),
                    rx,
                ))
            })
            .collect();
        *lock(&self.relay_workers) = workers;
        self.mark(SessionState::Active);
        drop(queues);

        tokio::spawn(self.clone().run_countdown());
        true
    }

    /// Queue a message from `side` for delivery to the sibling channel
    pub(crate) fn enqueue_relay(
        &self,
        side: Side,
        sender: &ParticipantId,
        text: &str,
    ) -> Result<(), IgnoreReason> {
        let queues = lock(&self.relay_queues);
        if !self.state().accepts_relay() {
            return Err(IgnoreReason::NotActive);
        }
        let Some(senders) = queues.as_ref() else {
            return Err(IgnoreReason::NotActive);
        };

        senders[side.index()]
            .send(RelayItem {
                sender: sender.clone(),
                text: text.to_string(),
            })
            .map_err(|_| IgnoreReason::NotActive)?;

        self.ctx.transcripts.record(&self.name, sender, text);
        Ok(())
    }

    /// The exactly-once gate. Returns true for the single caller that moves
    /// the session `Active -> Ending`; that caller must run the teardown.
    pub fn try_begin_end(&self, trigger: EndTrigger) -> bool {
        let mut queues = lock(&self.relay_queues);
        let won = self.state.send_if_modified(|s| {
            if *s == SessionState::Active {
                *s = SessionState::Ending;
                true
            } else {
                false
            }
        });
        if !won {
            debug!(session_id = %self.id, ?trigger, "End trigger ignored");
            return false;
        }
        // Dropping the senders lets the workers drain and exit
        queues.take();
        drop(queues);

        self.countdown.cancel();
        self.mark(SessionState::Ending);
        self.ctx.event_bus.emit_lossy(AnonMeetEvent::SessionEnding {
            session_id: self.id,
            trigger,
            timestamp: time::now(),
        });
        info!(session_id = %self.id, ?trigger, "Session ending");
        true
    }

    /// Reveal, grace period, archive, unroute. Run only after winning
    /// [`try_begin_end`](Self::try_begin_end).
    pub async fn finish_teardown(self: Arc<Self>, trigger: EndTrigger) {
        let workers = std::mem::take(&mut *lock(&self.relay_workers));
        for worker in workers {
            let _ = worker.await;
        }

        for side in &self.sides {
            let text = if trigger.is_explicit() {
                messages::explicit_reveal(&side.partner, self.ctx.policy.end_grace)
            } else {
                messages::timeout_reveal(&side.partner)
            };
            if let Err(e) = self.ctx.gateway.post_message(&side.channel_id, &text).await {
                warn!(session_id = %self.id, side = ?side.side, error = %e, "Failed to post reveal");
            }
        }

        if trigger.is_explicit() && !self.ctx.policy.end_grace.is_zero() {
            tokio::time::sleep(self.ctx.policy.end_grace).await;
        }

        let mut archive_confirmed = true;
        for side in &self.sides {
            match self.ctx.gateway.archive(&side.channel_id).await {
                Ok(()) | Err(GatewayError::AlreadyArchived) => {}
                Err(e) => {
                    archive_confirmed = false;
                    warn!(session_id = %self.id, side = ?side.side, error = %e, "Failed to archive channel");
                }
            }
        }

        for side in &self.sides {
            self.ctx.routing.remove(&side.channel_id);
        }

        self.state.send_modify(|s| *s = SessionState::Archived);
        self.mark(SessionState::Archived);
        self.ctx.event_bus.emit_lossy(AnonMeetEvent::SessionArchived {
            session_id: self.id,
            archive_confirmed,
            timestamp: time::now(),
        });
        info!(session_id = %self.id, archive_confirmed, "Session archived");
    }

    /// Gate plus teardown in one call; false if another trigger already won
    pub async fn end(self: &Arc<Self>, trigger: EndTrigger) -> bool {
        if !self.try_begin_end(trigger) {
            return false;
        }
        self.clone().finish_teardown(trigger).await;
        true
    }

    /// Drop routing for a session whose setup failed before activation
    pub(crate) fn abort(&self) {
        self.countdown.cancel();
        for side in &self.sides {
            self.ctx.routing.remove(&side.channel_id);
        }
    }

    async fn post_to_both(&self, text: &str) {
        for side in &self.sides {
            if let Err(e) = self.ctx.gateway.post_message(&side.channel_id, text).await {
                warn!(session_id = %self.id, side = ?side.side, error = %e, "Failed to post notice");
            }
        }
    }

    /// Periodic remaining-time notices, then end on timeout
    async fn run_countdown(self: Arc<Self>) {
        let lifetime = self.ctx.policy.lifetime;
        let interval = self.ctx.policy.notice_interval;
        let start = Instant::now();
        let mut elapsed = Duration::ZERO;

        while elapsed < lifetime {
            let step = (lifetime - elapsed).min(interval);
            tokio::select! {
                _ = self.countdown.cancelled() => return,
                _ = sleep_until(start + elapsed + step) => {}
            }
            elapsed += step;

            if elapsed < lifetime {
                let notice = messages::remaining_notice(lifetime - elapsed);
                tokio::select! {
                    biased;
                    _ = self.countdown.cancelled() => return,
                    _ = self.post_to_both(&notice) => {}
                }
            }
        }

        self.end(EndTrigger::Timeout).await;
    }
}

async fn relay_worker(
    gateway: Arc<dyn TransportGateway>,
    target: ChannelId,
    recipient: ParticipantId,
    mut rx: mpsc::UnboundedReceiver<RelayItem>,
) {
    while let Some(item) = rx.recv().await {
        let text = messages::relayed(&recipient, &item.sender, &item.text);
        if let Err(e) = gateway.post_message(&target, &text).await {
            warn!(channel = %target, error = %e, "Relay post failed");
        }
    }
}
