//! Conversation session lifecycle
//!
//! `Created -> Active -> Ending -> Archived`. `Ending` is the exactly-once
//! gate: only the first end trigger moves a session out of `Active`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Channels being allocated; never relays
    Created,
    /// Steady state: relaying both directions
    Active,
    /// Reveal posted or pending, archival in progress
    Ending,
    /// Channels archived, routing entries removed
    Archived,
}

impl SessionState {
    pub fn accepts_relay(&self) -> bool {
        matches!(self, SessionState::Active)
    }
}

/// When the session entered each state
#[derive(Debug, Clone, Serialize)]
pub struct StateTimeline {
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub ending_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl StateTimeline {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            activated_at: None,
            ending_at: None,
            archived_at: None,
        }
    }

    pub fn record(&mut self, state: SessionState, at: DateTime<Utc>) {
        match state {
            SessionState::Created => self.created_at = at,
            SessionState::Active => self.activated_at = Some(at),
            SessionState::Ending => self.ending_at = Some(at),
            SessionState::Archived => self.archived_at = Some(at),
        }
    }
}
