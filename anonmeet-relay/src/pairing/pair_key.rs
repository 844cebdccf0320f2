//! Canonical unordered pair of participants

use crate::types::ParticipantId;

/// Unordered pair of two distinct participants
///
/// Members are stored in lexicographic order, so `(A, B)` and `(B, A)`
/// compare, hash and display identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey {
    first: ParticipantId,
    second: ParticipantId,
}

impl PairKey {
    /// Returns `None` when both sides are the same participant
    pub fn new(a: &ParticipantId, b: &ParticipantId) -> Option<Self> {
        match a.cmp(b) {
            std::cmp::Ordering::Less => Some(Self {
                first: a.clone(),
                second: b.clone(),
            }),
            std::cmp::Ordering::Greater => Some(Self {
                first: b.clone(),
                second: a.clone(),
            }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn first(&self) -> &ParticipantId {
        &self.first
    }

    pub fn second(&self) -> &ParticipantId {
        &self.second
    }
}

impl std::fmt::Display for PairKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.first, self.second)
    }
}
