//! Matched-pairs set
//!
//! Append-only for the engine's lifetime. `claim` is the single atomic
//! insert-if-absent that decides which concurrent pass owns a pair.

use dashmap::DashSet;

use super::PairKey;

#[derive(Default)]
pub struct MatchedPairs {
    pairs: DashSet<PairKey>,
}

impl MatchedPairs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the pair consumed. Returns `true` only for the first caller.
    pub fn claim(&self, key: &PairKey) -> bool {
        self.pairs.insert(key.clone())
    }

    pub fn contains(&self, key: &PairKey) -> bool {
        self.pairs.contains(key)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParticipantId;
    use std::sync::Arc;

    fn key(a: &str, b: &str) -> PairKey {
        PairKey::new(&ParticipantId::new(a), &ParticipantId::new(b)).unwrap()
    }

    #[test]
    fn test_claim_once_either_order() {
        let matched = MatchedPairs::new();
        assert!(matched.is_empty());
        assert!(matched.claim(&key("A", "B")));
        assert!(!matched.claim(&key("B", "A")));
        assert!(matched.contains(&key("B", "A")));
        assert_eq!(matched.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_single_winner() {
        let matched = Arc::new(MatchedPairs::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let matched = Arc::clone(&matched);
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    matched.claim(&key("A", "B"))
                } else {
                    matched.claim(&key("B", "A"))
                }
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
