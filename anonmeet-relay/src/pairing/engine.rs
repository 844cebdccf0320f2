//! Pairing engine
//!
//! A matching pass compares one newly available participant against every
//! other stored profile. Each unordered pair is judged at most once until it
//! is accepted, and accepted at most once ever:
//!
//! 1. canonicalize the pair key
//! 2. skip pairs already in the matched set
//! 3. ask the oracle; failures mean "no match" for this pass only
//! 4. on `score >= threshold`, claim the key (atomic insert-if-absent)
//!    *before* channel setup, then open a conversation session
//! 5. setup failure after the claim leaves the pair consumed
//!
//! Evaluations inside one pass run concurrently, bounded by
//! `pass_concurrency`. Cross-pass safety rests entirely on step 4's claim.

use anonmeet_common::events::{AnonMeetEvent, EventBus};
use anonmeet_common::{Error, Result};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{MatchedPairs, PairKey};
use crate::collaborators::{CompatibilityOracle, ProfileStore};
use crate::session::SessionManager;
use crate::types::{Participant, ParticipantId};

/// What happened to one pair during a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    /// Key was already consumed before the oracle was asked
    AlreadyMatched,
    /// Oracle failed or answered unparsably
    OracleFailed,
    /// Score below threshold
    Rejected { score: u8 },
    /// A concurrent pass claimed the key between our check and our claim
    LostRace { score: u8 },
    /// Session opened
    Accepted { score: u8, session_id: Uuid },
    /// Key consumed but channel setup failed
    SetupFailed { score: u8 },
}

/// Tally of a matching pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Oracle calls made
    pub evaluated: usize,
    /// Pairs skipped as already matched (before or after scoring)
    pub skipped: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub oracle_failures: usize,
    pub setup_failures: usize,
    /// Sessions opened by this pass
    pub sessions: Vec<Uuid>,
}

impl PassReport {
    fn record(&mut self, outcome: &PairOutcome) {
        match outcome {
            PairOutcome::AlreadyMatched => self.skipped += 1,
            PairOutcome::OracleFailed => {
                self.evaluated += 1;
                self.oracle_failures += 1;
            }
            PairOutcome::Rejected { .. } => {
                self.evaluated += 1;
                self.rejected += 1;
            }
            PairOutcome::LostRace { .. } => {
                self.evaluated += 1;
                self.skipped += 1;
            }
            PairOutcome::Accepted { session_id, .. } => {
                self.evaluated += 1;
                self.accepted += 1;
                self.sessions.push(*session_id);
            }
            PairOutcome::SetupFailed { .. } => {
                self.evaluated += 1;
                self.setup_failures += 1;
            }
        }
    }
}

pub struct PairingEngine {
    store: Arc<dyn ProfileStore>,
    oracle: Arc<dyn CompatibilityOracle>,
    sessions: Arc<SessionManager>,
    matched: Arc<MatchedPairs>,
    threshold: u8,
    concurrency: usize,
    event_bus: EventBus,
}

impl PairingEngine {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        oracle: Arc<dyn CompatibilityOracle>,
        sessions: Arc<SessionManager>,
        threshold: u8,
        concurrency: usize,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            oracle,
            sessions,
            matched: Arc::new(MatchedPairs::new()),
            threshold,
            concurrency: concurrency.max(1),
            event_bus,
        }
    }

    pub fn matched_pairs(&self) -> &MatchedPairs {
        &self.matched
    }

    /// Store (or replace) a participant's profile and run a pass for them
    pub async fn submit_profile(&self, id: ParticipantId, answers: &[String]) -> Result<PassReport> {
        let participant = Participant::from_answers(id, answers);
        if participant.profile.is_empty() {
            return Err(Error::InvalidInput("profile has no non-blank answers".to_string()));
        }
        self.store.put(&participant).await?;

        let snapshot = self.store.get_all().await?;
        self.event_bus.emit_lossy(AnonMeetEvent::ProfileSubmitted {
            profile_count: snapshot.len(),
            timestamp: anonmeet_common::time::now(),
        });
        debug!(participant = %participant.id, "Profile stored");

        Ok(self.pass_over(&participant, snapshot).await)
    }

    /// Compare `newcomer` against every other stored participant
    pub async fn run_matching_pass(&self, newcomer: &Participant) -> Result<PassReport> {
        let snapshot = self.store.get_all().await?;
        Ok(self.pass_over(newcomer, snapshot).await)
    }

    async fn pass_over(&self, newcomer: &Participant, snapshot: Vec<Participant>) -> PassReport {
        let others: Vec<Participant> = snapshot
            .into_iter()
            .filter(|p| p.id != newcomer.id)
            .collect();

        let candidates = others.len();

        // Owned items keep the pass future `Send` for `tokio::spawn`
        let outcomes: Vec<PairOutcome> = stream::iter(others)
            .map(|other| async move { self.evaluate(newcomer, &other).await })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = PassReport::default();
        for outcome in &outcomes {
            report.record(outcome);
        }

        info!(
            candidates,
            evaluated = report.evaluated,
            accepted = report.accepted,
            rejected = report.rejected,
            skipped = report.skipped,
            oracle_failures = report.oracle_failures,
            setup_failures = report.setup_failures,
            "Matching pass complete"
        );
        report
    }

    async fn evaluate(&self, newcomer: &Participant, other: &Participant) -> PairOutcome {
        let Some(key) = PairKey::new(&newcomer.id, &other.id) else {
            return PairOutcome::AlreadyMatched;
        };

        if self.matched.contains(&key) {
            return PairOutcome::AlreadyMatched;
        }

        let compatibility = match self.oracle.score(&newcomer.profile, &other.profile).await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Oracle failed; treating pair as no match");
                debug!(pair = %key, "Oracle failure pair");
                return PairOutcome::OracleFailed;
            }
        };

        let score = compatibility.percentage;
        let accepted = score >= self.threshold;
        self.event_bus.emit_lossy(AnonMeetEvent::PairEvaluated {
            score,
            accepted,
            timestamp: anonmeet_common::time::now(),
        });

        if !accepted {
            debug!(pair = %key, score, threshold = self.threshold, "Pair rejected");
            return PairOutcome::Rejected { score };
        }

        if !self.matched.claim(&key) {
            debug!(pair = %key, "Pair claimed by a concurrent pass");
            return PairOutcome::LostRace { score };
        }

        info!(score, "Pair accepted; opening session");
        match self
            .sessions
            .open_session(key.first(), key.second(), &compatibility.rationale)
            .await
        {
            Ok(session) => PairOutcome::Accepted {
                score,
                session_id: session.id(),
            },
            Err(e) => {
                // The key stays consumed; no automatic retry.
                error!(error = %e, "Session setup failed");
                PairOutcome::SetupFailed { score }
            }
        }
    }
}
