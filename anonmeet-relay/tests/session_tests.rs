//! Conversation session lifecycle: relay, end triggers, reveal, archival
//!
//! Timing tests run on a paused clock so 24h lifetimes and one-hour grace
//! periods elapse instantly.

mod helpers;

use helpers::*;
use std::sync::Arc;
use std::time::Duration;

use anonmeet_common::events::{AnonMeetEvent, EndTrigger};
use anonmeet_common::time::hours;
use anonmeet_relay::session::{
    ConversationSession, Dispatch, IgnoreReason, InboundMessage, SessionState, Side,
};
use anonmeet_relay::types::{ChannelId, ParticipantId};

async fn matched_pair(h: &Harness) -> Arc<ConversationSession> {
    h.oracle.set("robots", "robotics club", 75);
    h.submit(ALICE, "robots").await;
    h.submit(BOB, "robotics club").await;
    h.single_session()
}

fn message(channel: &ChannelId, sender: &str, text: &str) -> InboundMessage {
    InboundMessage {
        channel: channel.clone(),
        sender: ParticipantId::from(sender),
        text: text.to_string(),
        from_bot: false,
    }
}

fn relayed(posts: &[String]) -> Vec<String> {
    posts
        .iter()
        .filter(|p| p.contains("Your partner says"))
        .cloned()
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_relay_both_directions_in_order() {
    let h = harness();
    let session = matched_pair(&h).await;
    let a = session.side(Side::A).channel_id.clone();
    let b = session.side(Side::B).channel_id.clone();

    for i in 0..5 {
        let outcome = h
            .state
            .sessions
            .on_message(message(&a, ALICE, &format!("message {}", i)));
        assert_eq!(outcome, Dispatch::Relayed);
    }
    assert_eq!(
        h.state.sessions.on_message(message(&b, BOB, "reply")),
        Dispatch::Relayed
    );

    eventually(|| relayed(&h.gateway.posts_to(&b)).len() == 5).await;
    eventually(|| relayed(&h.gateway.posts_to(&a)).len() == 1).await;

    let to_bob = relayed(&h.gateway.posts_to(&b));
    for (i, post) in to_bob.iter().enumerate() {
        assert!(post.starts_with("<@UBOB>"));
        assert!(post.ends_with(&format!("message {}", i)), "out of order: {:?}", to_bob);
    }
    assert!(relayed(&h.gateway.posts_to(&a))[0].starts_with("<@UALICE>"));
}

#[tokio::test(start_paused = true)]
async fn test_relay_never_leaks_sender_identity() {
    let h = harness();
    let session = matched_pair(&h).await;
    let a = session.side(Side::A).channel_id.clone();
    let b = session.side(Side::B).channel_id.clone();

    h.state
        .sessions
        .on_message(message(&a, ALICE, "hi, I'm <@UALICE> (UALICE) on the team"));
    h.state.sessions.on_message(message(&a, ALICE, "plain text"));
    eventually(|| relayed(&h.gateway.posts_to(&b)).len() == 2).await;

    for post in h.gateway.posts_to(&b) {
        assert!(!post.contains(ALICE), "identity leaked before reveal: {}", post);
    }
}

#[tokio::test(start_paused = true)]
async fn test_automated_and_unknown_messages_ignored() {
    let h = harness();
    let session = matched_pair(&h).await;
    let a = session.side(Side::A).channel_id.clone();

    assert_eq!(
        h.state.sessions.on_message(message(&a, BOT, "notice")),
        Dispatch::Ignored(IgnoreReason::AutomatedPost)
    );
    let mut from_bot = message(&a, "UOTHERBOT", "hello");
    from_bot.from_bot = true;
    assert_eq!(
        h.state.sessions.on_message(from_bot),
        Dispatch::Ignored(IgnoreReason::AutomatedPost)
    );
    assert_eq!(
        h.state
            .sessions
            .on_message(message(&ChannelId::from("CGENERAL"), ALICE, "hi")),
        Dispatch::Ignored(IgnoreReason::UnknownChannel)
    );
}

#[tokio::test(start_paused = true)]
async fn test_end_marker_reveals_then_archives_after_grace() {
    let h = harness();
    let session = matched_pair(&h).await;
    let a = session.side(Side::A).channel_id.clone();
    let b = session.side(Side::B).channel_id.clone();

    let outcome = h
        .state
        .sessions
        .on_message(message(&a, ALICE, "thanks, bye :end:"));
    assert_eq!(outcome, Dispatch::Ending(EndTrigger::EndMarker));
    assert_eq!(session.state(), SessionState::Ending);

    // Reveal goes out right away, archival waits for the grace period
    tokio::time::sleep(Duration::from_secs(3599)).await;
    assert!(h.gateway.posts_to(&a).iter().any(|p| p.contains("Your partner was <@UBOB>")));
    assert!(h.gateway.posts_to(&b).iter().any(|p| p.contains("Your partner was <@UALICE>")));
    assert!(h.gateway.archive_calls().is_empty());
    assert_eq!(session.state(), SessionState::Ending);

    session.wait_for_state(SessionState::Archived).await;
    let mut archived = h.gateway.archive_calls();
    archived.sort_by(|x, y| x.as_str().cmp(y.as_str()));
    assert_eq!(archived, vec![a.clone(), b.clone()]);
    assert!(h.state.sessions.routing().is_empty());

    // The end-marker message itself was never relayed
    assert!(relayed(&h.gateway.posts_to(&b)).is_empty());

    let late = h.state.sessions.on_message(message(&b, BOB, "are you there?"));
    assert_eq!(late, Dispatch::Ignored(IgnoreReason::UnknownChannel));
    assert!(relayed(&h.gateway.posts_to(&a)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_messages_before_end_delivered_before_reveal() {
    let h = harness();
    let session = matched_pair(&h).await;
    let a = session.side(Side::A).channel_id.clone();
    let b = session.side(Side::B).channel_id.clone();

    h.state.sessions.on_message(message(&a, ALICE, "last words"));
    h.state.sessions.on_message(message(&a, ALICE, ":end:"));

    session.wait_for_state(SessionState::Archived).await;
    let posts = h.gateway.posts_to(&b);
    let relay_at = posts.iter().position(|p| p.contains("last words")).unwrap();
    let reveal_at = posts.iter().position(|p| p.contains("Your partner was")).unwrap();
    assert!(relay_at < reveal_at);
}

#[tokio::test(start_paused = true)]
async fn test_end_reaction_requires_participant() {
    let h = harness();
    let session = matched_pair(&h).await;
    let b = session.side(Side::B).channel_id.clone();

    assert_eq!(
        h.state
            .sessions
            .on_end_reaction(&b, &ParticipantId::from("USTRANGER")),
        Dispatch::Ignored(IgnoreReason::NotParticipant)
    );
    assert_eq!(session.state(), SessionState::Active);

    assert_eq!(
        h.state.sessions.on_end_reaction(&b, &ParticipantId::from(BOB)),
        Dispatch::Ending(EndTrigger::EndReaction)
    );
    assert_eq!(
        h.state.sessions.on_end_reaction(&b, &ParticipantId::from(BOB)),
        Dispatch::Ignored(IgnoreReason::NotActive)
    );

    session.wait_for_state(SessionState::Archived).await;
    assert_eq!(h.gateway.archive_calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_reveals_and_archives_without_grace() {
    let h = harness();
    let mut events = h.event_bus.subscribe();
    let session = matched_pair(&h).await;
    let a = session.side(Side::A).channel_id.clone();
    let b = session.side(Side::B).channel_id.clone();

    session.wait_for_state(SessionState::Archived).await;

    let timeline = session.timeline();
    let activated = timeline.activated_at.unwrap();
    let ending = timeline.ending_at.unwrap();
    let archived = timeline.archived_at.unwrap();
    assert!(ending >= activated);
    assert!(archived >= ending);

    let reveal_a: Vec<String> = h
        .gateway
        .posts_to(&a)
        .into_iter()
        .filter(|p| p.contains("Your partner was"))
        .collect();
    assert_eq!(reveal_a.len(), 1);
    assert!(reveal_a[0].contains("<@UBOB>"));
    assert!(reveal_a[0].contains("Time is up"));
    assert_eq!(h.gateway.archive_calls().len(), 2);

    // Late explicit end after the timeout path is a no-op
    assert!(!session.end(EndTrigger::EndMarker).await);
    assert_eq!(
        h.state.sessions.on_message(message(&b, BOB, ":end:")),
        Dispatch::Ignored(IgnoreReason::UnknownChannel)
    );
    assert_eq!(h.gateway.archive_calls().len(), 2);
    let reveals_b = h
        .gateway
        .posts_to(&b)
        .iter()
        .filter(|p| p.contains("Your partner was"))
        .count();
    assert_eq!(reveals_b, 1);

    let mut ending_triggers = Vec::new();
    let mut archived_events = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            AnonMeetEvent::SessionEnding { trigger, .. } => ending_triggers.push(trigger),
            AnonMeetEvent::SessionArchived {
                archive_confirmed, ..
            } => {
                assert!(archive_confirmed);
                archived_events += 1;
            }
            _ => {}
        }
    }
    assert_eq!(ending_triggers, vec![EndTrigger::Timeout]);
    assert_eq!(archived_events, 1);
}

#[tokio::test(start_paused = true)]
async fn test_hourly_notices_count_down() {
    let mut settings = test_settings();
    settings.session_lifetime = hours(3);
    let h = harness_with(settings);
    let session = matched_pair(&h).await;
    let a = session.side(Side::A).channel_id.clone();

    session.wait_for_state(SessionState::Archived).await;

    let notices: Vec<String> = h
        .gateway
        .posts_to(&a)
        .into_iter()
        .filter(|p| p.starts_with("This channel will be archived in"))
        .collect();
    assert_eq!(
        notices,
        vec![
            "This channel will be archived in 2 hour(s).".to_string(),
            "This channel will be archived in 1 hour(s).".to_string(),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_explicit_end_near_deadline_archives_once() {
    let mut settings = test_settings();
    settings.session_lifetime = hours(1);
    settings.end_grace = Duration::ZERO;
    let h = harness_with(settings);
    let session = matched_pair(&h).await;
    let a = session.side(Side::A).channel_id.clone();

    tokio::time::sleep(Duration::from_secs(3600) - Duration::from_millis(1)).await;
    let explicit = h.state.sessions.on_message(message(&a, ALICE, ":end:"));
    let via_timeout = session.end(EndTrigger::Timeout).await;

    // Exactly one of the two triggers won
    assert!(matches!(explicit, Dispatch::Ending(_)) ^ via_timeout);

    session.wait_for_state(SessionState::Archived).await;
    tokio::time::sleep(hours(2)).await;
    assert_eq!(h.gateway.archive_calls().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_triggers_tear_down_exactly_once() {
    let mut settings = test_settings();
    settings.end_grace = Duration::ZERO;
    let h = harness_with(settings);
    let session = matched_pair(&h).await;
    let a = session.side(Side::A).channel_id.clone();
    let b = session.side(Side::B).channel_id.clone();

    let mut tasks = Vec::new();
    for i in 0..16 {
        let sessions = h.state.sessions.clone();
        let session = session.clone();
        let (a, b) = (a.clone(), b.clone());
        tasks.push(tokio::spawn(async move {
            match i % 4 {
                0 => matches!(
                    sessions.on_message(message(&a, ALICE, ":end:")),
                    Dispatch::Ending(_)
                ),
                1 => matches!(
                    sessions.on_end_reaction(&b, &ParticipantId::from(BOB)),
                    Dispatch::Ending(_)
                ),
                2 => session.end(EndTrigger::Timeout).await,
                _ => session.try_begin_end(EndTrigger::EndMarker) && {
                    session.clone().finish_teardown(EndTrigger::EndMarker).await;
                    true
                },
            }
        }));
    }

    let mut winners = 0;
    for task in tasks {
        if task.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    session.wait_for_state(SessionState::Archived).await;
    let mut archived = h.gateway.archive_calls();
    archived.sort_by(|x, y| x.as_str().cmp(y.as_str()));
    assert_eq!(archived, vec![a.clone(), b.clone()]);

    let reveals = |ch: &ChannelId| {
        h.gateway
            .posts_to(ch)
            .iter()
            .filter(|p| p.contains("Your partner was"))
            .count()
    };
    assert_eq!(reveals(&a), 1);
    assert_eq!(reveals(&b), 1);
    assert!(h.state.sessions.routing().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_archive_failure_still_unroutes() {
    let h = harness();
    let mut events = h.event_bus.subscribe();
    h.gateway.fail_archives(true);
    let session = matched_pair(&h).await;
    let a = session.side(Side::A).channel_id.clone();

    h.state.sessions.on_message(message(&a, ALICE, ":end:"));
    session.wait_for_state(SessionState::Archived).await;

    assert!(h.state.sessions.routing().is_empty());
    assert_eq!(h.gateway.archive_calls().len(), 2, "no retry");

    let confirmed = std::iter::from_fn(|| events.try_recv().ok()).find_map(|e| match e {
        AnonMeetEvent::SessionArchived {
            archive_confirmed, ..
        } => Some(archive_confirmed),
        _ => None,
    });
    assert_eq!(confirmed, Some(false));
}

#[tokio::test(start_paused = true)]
async fn test_already_archived_counts_as_success() {
    let h = harness();
    let mut events = h.event_bus.subscribe();
    let session = matched_pair(&h).await;
    let a = session.side(Side::A).channel_id.clone();
    let b = session.side(Side::B).channel_id.clone();
    h.gateway.mark_archived(&b);

    h.state.sessions.on_message(message(&a, ALICE, ":end:"));
    session.wait_for_state(SessionState::Archived).await;

    let confirmed = std::iter::from_fn(|| events.try_recv().ok()).find_map(|e| match e {
        AnonMeetEvent::SessionArchived {
            archive_confirmed, ..
        } => Some(archive_confirmed),
        _ => None,
    });
    assert_eq!(confirmed, Some(true));
}

#[tokio::test(start_paused = true)]
async fn test_admin_transcript_request() {
    let h = harness();
    let session = matched_pair(&h).await;
    let a = session.side(Side::A).channel_id.clone();
    let b = session.side(Side::B).channel_id.clone();

    h.state.sessions.on_message(message(&a, ALICE, "hello there"));
    h.state.sessions.on_message(message(&b, BOB, "hi back"));

    let admin = ParticipantId::from(ADMIN);
    assert!(h.state.sessions.on_direct_message(&admin, session.name()).await);
    let reply = h.gateway.dms_to(&admin).pop().unwrap();
    assert!(reply.contains("UALICE: hello there"));
    assert!(reply.contains("UBOB: hi back"));

    assert!(h.state.sessions.on_direct_message(&admin, "anonmeet-zzzzzzzz").await);
    assert_eq!(
        h.gateway.dms_to(&admin).pop().unwrap(),
        "No logs found for channel anonmeet-zzzzzzzz."
    );

    // Only the admin, and only channel-name queries
    assert!(!h.state.sessions.on_direct_message(&ParticipantId::from(BOB), session.name()).await);
    assert!(!h.state.sessions.on_direct_message(&admin, "hello").await);
    assert_eq!(h.gateway.dms_to(&admin).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_active_sessions_hide_identities() {
    let h = harness();
    let session = matched_pair(&h).await;

    let summaries = h.state.sessions.active_sessions();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].session_id, session.id());
    assert_eq!(summaries[0].state, SessionState::Active);

    let json = serde_json::to_string(&summaries).unwrap();
    assert!(!json.contains(ALICE));
    assert!(!json.contains(BOB));
}

#[tokio::test(start_paused = true)]
async fn test_failed_notice_post_still_activates() {
    let h = harness();
    // Side A is the first channel created
    h.gateway.fail_posts_to(&ChannelId::from("C0001"));
    let session = matched_pair(&h).await;

    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.side(Side::A).channel_id, ChannelId::from("C0001"));
    assert!(!h.gateway.posts_to(&session.side(Side::A).channel_id).is_empty());
    assert_eq!(h.gateway.dms_to(&ParticipantId::from(ALICE)).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_relay_direction_leaves_reverse_working() {
    let h = harness();
    h.gateway.fail_posts_to(&ChannelId::from("C0001"));
    let session = matched_pair(&h).await;
    let a = session.side(Side::A).channel_id.clone();
    let b = session.side(Side::B).channel_id.clone();

    assert_eq!(
        h.state.sessions.on_message(message(&b, BOB, "lost on the way")),
        Dispatch::Relayed
    );
    for i in 0..3 {
        assert_eq!(
            h.state.sessions.on_message(message(&a, ALICE, &format!("ping {}", i))),
            Dispatch::Relayed
        );
    }
    assert_eq!(
        h.state.sessions.on_message(message(&b, BOB, "also lost")),
        Dispatch::Relayed
    );

    eventually(|| relayed(&h.gateway.posts_to(&b)).len() == 3).await;
    eventually(|| relayed(&h.gateway.posts_to(&a)).len() == 2).await;
    assert_eq!(session.state(), SessionState::Active);

    let to_bob = relayed(&h.gateway.posts_to(&b));
    for (i, post) in to_bob.iter().enumerate() {
        assert!(post.ends_with(&format!("ping {}", i)));
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_reveal_post_still_archives_once() {
    let h = harness();
    h.gateway.fail_posts_to(&ChannelId::from("C0001"));
    h.gateway.fail_posts_to(&ChannelId::from("C0002"));
    let session = matched_pair(&h).await;
    let a = session.side(Side::A).channel_id.clone();
    let b = session.side(Side::B).channel_id.clone();

    h.state.sessions.on_message(message(&b, BOB, ":end:"));
    session.wait_for_state(SessionState::Archived).await;

    assert!(h.gateway.posts_to(&a).iter().any(|p| p.contains("Your partner was <@UBOB>")));
    let mut archived = h.gateway.archive_calls();
    archived.sort_by(|x, y| x.as_str().cmp(y.as_str()));
    assert_eq!(archived, vec![a, b]);
    assert!(h.state.sessions.routing().is_empty());

    assert!(!session.end(EndTrigger::Timeout).await);
    assert_eq!(h.gateway.archive_calls().len(), 2);
}
