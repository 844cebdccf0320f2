//! Event types for the anonmeet event system
//!
//! Provides shared event definitions and the EventBus used by every service.
//! Events describe what the core did, never who was involved: no variant
//! carries a participant identity token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// What caused a session to leave the Active state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndTrigger {
    /// A participant posted the end marker
    EndMarker,
    /// A participant reacted with the end reaction
    EndReaction,
    /// The lifetime countdown reached zero
    Timeout,
}

impl EndTrigger {
    /// Explicit ends get a grace period before archival; timeouts do not
    pub fn is_explicit(&self) -> bool {
        !matches!(self, EndTrigger::Timeout)
    }
}

/// anonmeet event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AnonMeetEvent {
    /// A profile was stored and a matching pass is about to run
    ProfileSubmitted {
        /// Number of profiles in the store after the write
        profile_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// The oracle scored a pair
    PairEvaluated {
        score: u8,
        accepted: bool,
        timestamp: DateTime<Utc>,
    },

    /// Both channels exist, both participants are invited and notified
    SessionActivated {
        session_id: Uuid,
        channel_a: String,
        channel_b: String,
        timestamp: DateTime<Utc>,
    },

    /// Channel setup failed; the pair stays consumed
    SessionSetupFailed {
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// First end trigger won the transition out of Active
    SessionEnding {
        session_id: Uuid,
        trigger: EndTrigger,
        timestamp: DateTime<Utc>,
    },

    /// Reveal posted, channels archived, routing entries removed
    SessionArchived {
        session_id: Uuid,
        /// False when at least one archive call failed remotely
        archive_confirmed: bool,
        timestamp: DateTime<Utc>,
    },
}

impl AnonMeetEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            AnonMeetEvent::ProfileSubmitted { .. } => "ProfileSubmitted",
            AnonMeetEvent::PairEvaluated { .. } => "PairEvaluated",
            AnonMeetEvent::SessionActivated { .. } => "SessionActivated",
            AnonMeetEvent::SessionSetupFailed { .. } => "SessionSetupFailed",
            AnonMeetEvent::SessionEnding { .. } => "SessionEnding",
            AnonMeetEvent::SessionArchived { .. } => "SessionArchived",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for application-wide events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use anonmeet_common::events::{AnonMeetEvent, EventBus};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(AnonMeetEvent::ProfileSubmitted {
///     profile_count: 2,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AnonMeetEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<AnonMeetEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: AnonMeetEvent,
    ) -> Result<usize, broadcast::error::SendError<AnonMeetEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: AnonMeetEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
