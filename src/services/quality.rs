//! Quality scoring for incoming signals.
//!
//! A signal's score is a fixed-weight blend of five sub-scores, each on a
//! 0-100 scale. Missing inputs degrade to a neutral sub-score instead of
//! failing the whole score.

use crate::types::{Direction, Signal};

const WEIGHT_CONFIDENCE: f64 = 0.30;
const WEIGHT_CONFLUENCE: f64 = 0.25;
const WEIGHT_RISK_REWARD: f64 = 0.20;
const WEIGHT_OSCILLATOR: f64 = 0.15;
const WEIGHT_CONTEXT: f64 = 0.10;

/// Neutral sub-score for absent data.
const NEUTRAL: f64 = 50.0;

/// Zone labels that count as strong levels.
const STRONG_ZONES: &[&str] = &["supply", "demand", "key_support", "key_resistance"];

/// Individual sub-scores, kept for logging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub confidence: f64,
    pub confluence: f64,
    pub risk_reward: f64,
    pub oscillator: f64,
    pub market_context: f64,
}

impl ScoreBreakdown {
    /// Weighted total, rounded to the nearest integer and clamped to 0-100.
    pub fn total(&self) -> u8 {
        let weighted = self.confidence * WEIGHT_CONFIDENCE
            + self.confluence * WEIGHT_CONFLUENCE
            + self.risk_reward * WEIGHT_RISK_REWARD
            + self.oscillator * WEIGHT_OSCILLATOR
            + self.market_context * WEIGHT_CONTEXT;
        weighted.round().clamp(0.0, 100.0) as u8
    }
}

/// Scores signals and decides whether they are worth distributing.
#[derive(Debug, Clone, Copy)]
pub struct QualityScorer {
    threshold: u8,
}

impl QualityScorer {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn breakdown(&self, signal: &Signal) -> ScoreBreakdown {
        let market = &signal.confluence.market_context;
        ScoreBreakdown {
            confidence: sanitize(Some(signal.confidence)),
            confluence: sanitize(market.confluence_score),
            risk_reward: risk_reward_score(signal),
            oscillator: oscillator_score(signal.direction, signal.confluence.oscillator.value),
            market_context: market_context_score(market.label.as_deref(), market.description.as_deref()),
        }
    }

    /// Score in `[0, 100]`. Deterministic.
    pub fn score(&self, signal: &Signal) -> u8 {
        self.breakdown(signal).total()
    }

    pub fn should_monitor(&self, signal: &Signal) -> bool {
        self.score(signal) >= self.threshold
    }
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new(65)
    }
}

fn sanitize(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.clamp(0.0, 100.0),
        _ => NEUTRAL,
    }
}

/// Reward/risk to the first take-profit; a ratio of 5 or more scores 100.
fn risk_reward_score(signal: &Signal) -> f64 {
    let Some(tp) = signal.first_take_profit() else {
        return 0.0;
    };
    let risk = (signal.entry - signal.stop_loss).abs();
    let reward = (tp - signal.entry).abs();
    if !risk.is_finite() || !reward.is_finite() || risk == 0.0 {
        return 0.0;
    }
    risk_reward_from_ratio(reward / risk)
}

fn risk_reward_from_ratio(ratio: f64) -> f64 {
    (ratio * 20.0).clamp(0.0, 100.0)
}

fn oscillator_score(direction: Direction, value: Option<f64>) -> f64 {
    let Some(v) = value.filter(|v| v.is_finite()) else {
        return NEUTRAL;
    };
    match direction {
        Direction::Sell => {
            if v > 70.0 {
                100.0
            } else if v > 60.0 {
                80.0
            } else if v > 50.0 {
                60.0
            } else {
                30.0
            }
        }
        Direction::Buy => {
            if v < 30.0 {
                100.0
            } else if v < 40.0 {
                80.0
            } else if v < 50.0 {
                60.0
            } else {
                30.0
            }
        }
    }
}

fn market_context_score(label: Option<&str>, description: Option<&str>) -> f64 {
    let mut score = NEUTRAL;

    if let Some(label) = label {
        let normalized = label.trim().to_lowercase().replace(['-', ' '], "_");
        let zone = normalized.trim_end_matches("_zone");
        if STRONG_ZONES.contains(&zone) {
            score += 30.0;
        }
    }
    if description.map_or(false, |d| d.chars().count() > 50) {
        score += 20.0;
    }

    score.min(100.0)
}
