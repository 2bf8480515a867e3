//! Query-time matching: per-class ratio-test scoring and ranking.

pub mod matcher;
pub mod ranker;

pub use matcher::{ClassMatcher, ClassScore, NN_RATIO};
pub use ranker::{best_match, top_k, AcceptanceGate, MatchResult};
