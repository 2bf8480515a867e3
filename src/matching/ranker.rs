//! Acceptance thresholds and result ordering.

use serde::Serialize;

use crate::config::VisionConfig;
use crate::matching::matcher::ClassScore;

/// Minimum evidence a class needs before it is reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptanceGate {
    pub min_good_matches: f64,
    pub score_threshold: f64,
}

impl AcceptanceGate {
    pub fn from_config(config: &VisionConfig) -> Self {
        Self {
            min_good_matches: config.min_good_matches,
            score_threshold: config.score_threshold,
        }
    }

    pub fn accepts(&self, score: &ClassScore) -> bool {
        score.avg_good >= self.min_good_matches && score.ratio >= self.score_threshold
    }
}

impl Default for AcceptanceGate {
    fn default() -> Self {
        Self::from_config(&VisionConfig::default())
    }
}

/// An accepted class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub class_id: String,
    pub avg_good: f64,
    pub ratio: f64,
    /// `ratio` clamped to [0, 1].
    pub confidence: f64,
}

impl From<&ClassScore> for MatchResult {
    fn from(score: &ClassScore) -> Self {
        Self {
            class_id: score.class_id.clone(),
            avg_good: score.avg_good,
            ratio: score.ratio,
            confidence: score.ratio.clamp(0.0, 1.0),
        }
    }
}

/// Highest `avg_good`, ties broken by `ratio`, then by first occurrence.
/// The winner must still clear the gate.
pub fn best_match(scores: &[ClassScore], gate: &AcceptanceGate) -> Option<MatchResult> {
    let mut best: Option<&ClassScore> = None;
    for score in scores {
        let better = match best {
            None => true,
            Some(b) => {
                score.avg_good > b.avg_good
                    || (score.avg_good == b.avg_good && score.ratio > b.ratio)
            }
        };
        if better {
            best = Some(score);
        }
    }

    best.filter(|s| gate.accepts(s)).map(MatchResult::from)
}

/// Up to `k` accepted classes, strongest first.
pub fn top_k(scores: &[ClassScore], gate: &AcceptanceGate, k: usize) -> Vec<MatchResult> {
    let mut accepted: Vec<&ClassScore> = scores.iter().filter(|s| gate.accepts(s)).collect();
    // stable: equal scores keep index order
    accepted.sort_by(|a, b| {
        b.avg_good
            .total_cmp(&a.avg_good)
            .then(b.ratio.total_cmp(&a.ratio))
    });
    accepted.into_iter().take(k).map(MatchResult::from).collect()
}
