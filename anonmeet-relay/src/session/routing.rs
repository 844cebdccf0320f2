//! Channel routing table
//!
//! Maps each live channel to its session and side. A channel id is bound to
//! at most one session for its whole life; entries are removed on archive and
//! never reassigned.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

use super::conversation::ConversationSession;
use crate::types::{ChannelId, ParticipantId};

/// Which half of a session a channel belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn suffix(self) -> &'static str {
        match self {
            Side::A => "a",
            Side::B => "b",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }
}

/// One participant's view of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSide {
    pub side: Side,
    pub channel_id: ChannelId,
    /// The only participant invited to this channel
    pub owner: ParticipantId,
    /// Hidden until the reveal
    pub partner: ParticipantId,
    /// Where this channel's messages are relayed to
    pub sibling: ChannelId,
}

#[derive(Clone)]
pub struct Route {
    pub session: Arc<ConversationSession>,
    pub side: Side,
}

#[derive(Default)]
pub struct RoutingTable {
    routes: DashMap<ChannelId, Route>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a channel to a session side. Returns false if already bound.
    pub fn register(&self, channel: ChannelId, route: Route) -> bool {
        match self.routes.entry(channel) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(route);
                true
            }
        }
    }

    pub fn lookup(&self, channel: &ChannelId) -> Option<Route> {
        self.routes.get(channel).map(|r| r.value().clone())
    }

    pub fn remove(&self, channel: &ChannelId) -> bool {
        self.routes.remove(channel).is_some()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Every routed session, once each
    pub fn sessions(&self) -> Vec<Arc<ConversationSession>> {
        let mut seen = HashSet::new();
        self.routes
            .iter()
            .filter(|r| seen.insert(r.session.id()))
            .map(|r| r.session.clone())
            .collect()
    }
}
