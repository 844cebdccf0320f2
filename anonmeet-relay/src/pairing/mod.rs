//! Pairing: canonical pair keys, the matched-pairs set and the engine that
//! runs matching passes.

pub mod engine;
pub mod matched;
pub mod pair_key;

pub use engine::{PairOutcome, PairingEngine, PassReport};
pub use matched::MatchedPairs;
pub use pair_key::PairKey;
