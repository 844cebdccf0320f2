//! Conversation sessions: channel pairs, relay, end detection, reveal, archive

pub mod conversation;
pub mod manager;
pub mod messages;
pub mod naming;
pub mod routing;
pub mod state;
pub mod transcript;

pub use conversation::{ConversationSession, IgnoreReason, SessionPolicy, SessionSummary};
pub use manager::{Dispatch, InboundMessage, SessionManager, SetupError};
pub use naming::ChannelNamer;
pub use routing::{ChannelSide, Route, RoutingTable, Side};
pub use state::{SessionState, StateTimeline};
pub use transcript::TranscriptLog;
