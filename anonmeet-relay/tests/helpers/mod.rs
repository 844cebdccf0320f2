//! Shared fakes for integration tests
//!
//! `RecordingGateway` captures every transport call so tests can assert
//! exactly-once archival and identity hiding; `ScriptedOracle` answers from
//! a table keyed by the unordered pair of profile texts.

#![allow(dead_code)]

use anonmeet_common::config::RelaySettings;
use anonmeet_common::events::EventBus;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anonmeet_relay::collaborators::{
    Compatibility, CompatibilityOracle, GatewayError, InMemoryProfileStore, OracleError,
    TransportGateway,
};
use anonmeet_relay::session::ConversationSession;
use anonmeet_relay::types::{ChannelId, ParticipantId};
use anonmeet_relay::AppState;

pub const ALICE: &str = "UALICE";
pub const BOB: &str = "UBOB";
pub const CAROL: &str = "UCAROL";
pub const BOT: &str = "UBOT";
pub const ADMIN: &str = "UADMIN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    CreateChannel(String),
    Invite(ChannelId, ParticipantId),
    Post(ChannelId, String),
    Archive(ChannelId),
    DirectMessage(ParticipantId, String),
    AddToUsergroup(String, ParticipantId),
}

#[derive(Default)]
pub struct RecordingGateway {
    calls: Mutex<Vec<GatewayCall>>,
    created: AtomicUsize,
    /// 1-based index of the create call that fails
    fail_create_on: Mutex<Option<usize>>,
    fail_invite: AtomicBool,
    fail_archive: AtomicBool,
    fail_posts: Mutex<HashSet<ChannelId>>,
    fail_usergroup: AtomicBool,
    archived: Mutex<HashSet<ChannelId>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, call: GatewayCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn fail_create_on(&self, nth: usize) {
        *self.fail_create_on.lock().unwrap() = Some(nth);
    }

    pub fn fail_invites(&self, fail: bool) {
        self.fail_invite.store(fail, Ordering::SeqCst);
    }

    pub fn fail_archives(&self, fail: bool) {
        self.fail_archive.store(fail, Ordering::SeqCst);
    }

    /// Every post to `channel` is recorded and then fails
    pub fn fail_posts_to(&self, channel: &ChannelId) {
        self.fail_posts.lock().unwrap().insert(channel.clone());
    }

    pub fn fail_usergroups(&self, fail: bool) {
        self.fail_usergroup.store(fail, Ordering::SeqCst);
    }

    /// Pretend a channel was archived out-of-band
    pub fn mark_archived(&self, channel: &ChannelId) {
        self.archived.lock().unwrap().insert(channel.clone());
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn created_channels(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::CreateChannel(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn posts_to(&self, channel: &ChannelId) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::Post(ch, text) if &ch == channel => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn archive_calls(&self) -> Vec<ChannelId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::Archive(ch) => Some(ch),
                _ => None,
            })
            .collect()
    }

    pub fn usergroup_adds(&self) -> Vec<(String, ParticipantId)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::AddToUsergroup(group, p) => Some((group, p)),
                _ => None,
            })
            .collect()
    }

    pub fn dms_to(&self, participant: &ParticipantId) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::DirectMessage(p, text) if &p == participant => Some(text),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl TransportGateway for RecordingGateway {
    async fn create_channel(&self, name: &str) -> Result<ChannelId, GatewayError> {
        self.record(GatewayCall::CreateChannel(name.to_string()));
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.fail_create_on.lock().unwrap() == Some(n) {
            return Err(GatewayError::ChannelCreateFailed("name_taken".to_string()));
        }
        Ok(ChannelId::new(format!("C{:04}", n)))
    }

    async fn invite(&self, channel: &ChannelId, participant: &ParticipantId) -> Result<(), GatewayError> {
        self.record(GatewayCall::Invite(channel.clone(), participant.clone()));
        if self.fail_invite.load(Ordering::SeqCst) {
            return Err(GatewayError::InviteFailed("user_not_found".to_string()));
        }
        Ok(())
    }

    async fn post_message(&self, channel: &ChannelId, text: &str) -> Result<(), GatewayError> {
        self.record(GatewayCall::Post(channel.clone(), text.to_string()));
        if self.fail_posts.lock().unwrap().contains(channel) {
            return Err(GatewayError::PostFailed("not_in_channel".to_string()));
        }
        Ok(())
    }

    async fn archive(&self, channel: &ChannelId) -> Result<(), GatewayError> {
        self.record(GatewayCall::Archive(channel.clone()));
        if self.fail_archive.load(Ordering::SeqCst) {
            return Err(GatewayError::ArchiveFailed("ratelimited".to_string()));
        }
        if !self.archived.lock().unwrap().insert(channel.clone()) {
            return Err(GatewayError::AlreadyArchived);
        }
        Ok(())
    }

    async fn send_direct_message(&self, participant: &ParticipantId, text: &str) -> Result<(), GatewayError> {
        self.record(GatewayCall::DirectMessage(participant.clone(), text.to_string()));
        Ok(())
    }

    async fn add_to_usergroup(&self, usergroup: &str, participant: &ParticipantId) -> Result<(), GatewayError> {
        self.record(GatewayCall::AddToUsergroup(usergroup.to_string(), participant.clone()));
        if self.fail_usergroup.load(Ordering::SeqCst) {
            return Err(GatewayError::UsergroupFailed("permission_denied".to_string()));
        }
        Ok(())
    }
}

fn pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Oracle answering from a table; unscripted pairs are unavailable
#[derive(Default)]
pub struct ScriptedOracle {
    answers: Mutex<HashMap<(String, String), Compatibility>>,
    malformed: Mutex<HashSet<(String, String)>>,
    calls: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, profile_a: &str, profile_b: &str, percentage: u8) {
        self.set_with_rationale(
            profile_a,
            profile_b,
            percentage,
            &format!("{}% overlap in interests", percentage),
        );
    }

    pub fn set_with_rationale(&self, profile_a: &str, profile_b: &str, percentage: u8, rationale: &str) {
        let key = pair(profile_a, profile_b);
        self.malformed.lock().unwrap().remove(&key);
        self.answers.lock().unwrap().insert(
            key,
            Compatibility {
                percentage,
                rationale: rationale.to_string(),
            },
        );
    }

    pub fn set_malformed(&self, profile_a: &str, profile_b: &str) {
        let key = pair(profile_a, profile_b);
        self.answers.lock().unwrap().remove(&key);
        self.malformed.lock().unwrap().insert(key);
    }

    /// Hold every answer for `delay` to widen race windows
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompatibilityOracle for ScriptedOracle {
    async fn score(&self, profile_a: &str, profile_b: &str) -> Result<Compatibility, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let key = pair(profile_a, profile_b);
        if self.malformed.lock().unwrap().contains(&key) {
            return Err(OracleError::MalformedResponse("no percentage in response".to_string()));
        }
        self.answers
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| OracleError::Unavailable("HTTP 503".to_string()))
    }
}

pub fn test_settings() -> RelaySettings {
    RelaySettings {
        bot_user_id: Some(BOT.to_string()),
        admin_user_id: Some(ADMIN.to_string()),
        ..RelaySettings::default()
    }
}

pub struct Harness {
    pub state: AppState,
    pub gateway: Arc<RecordingGateway>,
    pub oracle: Arc<ScriptedOracle>,
    pub store: Arc<InMemoryProfileStore>,
    pub event_bus: EventBus,
}

pub fn harness() -> Harness {
    harness_with(test_settings())
}

pub fn harness_with(settings: RelaySettings) -> Harness {
    let gateway = Arc::new(RecordingGateway::new());
    let oracle = Arc::new(ScriptedOracle::new());
    let store = Arc::new(InMemoryProfileStore::new());
    let event_bus = EventBus::new(256);
    let state = AppState::new(
        settings,
        store.clone(),
        oracle.clone(),
        gateway.clone(),
        event_bus.clone(),
    );
    Harness {
        state,
        gateway,
        oracle,
        store,
        event_bus,
    }
}

impl Harness {
    pub async fn submit(&self, id: &str, profile: &str) -> anonmeet_relay::pairing::PassReport {
        self.state
            .engine
            .submit_profile(ParticipantId::from(id), &[profile.to_string()])
            .await
            .unwrap()
    }

    /// The only live session
    pub fn single_session(&self) -> Arc<ConversationSession> {
        let sessions = self.state.sessions.routing().sessions();
        assert_eq!(sessions.len(), 1, "expected exactly one live session");
        sessions[0].clone()
    }
}

/// Poll `condition` until it holds, yielding to background tasks
pub async fn eventually<F: Fn() -> bool>(condition: F) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
