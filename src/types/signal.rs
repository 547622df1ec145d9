use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Trade direction of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "BUY" | "LONG" => Some(Self::Buy),
            "SELL" | "SHORT" => Some(Self::Sell),
            _ => None,
        }
    }

    /// Numeric order-type code understood by execution clients (0 = buy, 1 = sell).
    pub fn code(&self) -> u8 {
        match self {
            Self::Buy => 0,
            Self::Sell => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

/// Chart timeframe a signal was generated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    /// Parse from string (e.g. "H1", "15m", "4h").
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "M5" | "5M" => Some(Self::M5),
            "M15" | "15M" => Some(Self::M15),
            "M30" | "30M" => Some(Self::M30),
            "H1" | "1H" => Some(Self::H1),
            "H4" | "4H" => Some(Self::H4),
            "D1" | "1D" => Some(Self::D1),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M5 => "M5",
            Self::M15 => "M15",
            Self::M30 => "M30",
            Self::H1 => "H1",
            Self::H4 => "H4",
            Self::D1 => "D1",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account-size bucket selecting which strategy parameters the generator applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Small,
    Medium,
    Large,
}

impl Tier {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "small" => Some(Self::Small),
            "medium" => Some(Self::Medium),
            "large" => Some(Self::Large),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A take-profit level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TakeProfit {
    /// Target price.
    pub price: f64,
    /// Percentage of the position closed at this level (0-100).
    pub close_pct: f64,
}

/// Oscillator state attached to a signal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OscillatorReading {
    /// Oscillator value (RSI-style, 0-100).
    pub value: Option<f64>,
    /// Condition label, e.g. "overbought".
    pub condition: Option<String>,
}

/// Wick-rejection requirement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WickRejection {
    /// "upper" or "lower".
    pub side: Option<String>,
    /// Minimum wick size in pips.
    pub min_size: Option<f64>,
}

/// Market structure context around the entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketContext {
    /// Zone label, e.g. "supply_zone" or "key_support".
    pub label: Option<String>,
    /// Free-text description of the context.
    pub description: Option<String>,
    /// Confluence score reported by the generator (0-100).
    pub confluence_score: Option<f64>,
}

/// Corroborating technical conditions used for quality scoring.
///
/// Every field is optional; absent data degrades to a neutral sub-score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Confluence {
    pub oscillator: OscillatorReading,
    /// Required candlestick pattern, e.g. "bearish_engulfing".
    pub candle_pattern: Option<String>,
    pub wick_rejection: WickRejection,
    pub market_context: MarketContext,
}

/// A trading signal as produced by the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    /// Server-assigned identifier (set when persisted).
    #[serde(default)]
    pub id: Option<Uuid>,
    pub symbol: String,
    pub direction: Direction,
    pub entry: f64,
    pub stop_loss: f64,
    /// Ordered take-profit levels, nearest first.
    pub take_profits: Vec<TakeProfit>,
    /// Generator confidence (0-100).
    pub confidence: f64,
    #[serde(default)]
    pub confluence: Confluence,
    pub timeframe: Timeframe,
    #[serde(default)]
    pub tier: Option<Tier>,
    /// Unix timestamp (milliseconds) after which the signal should not be acted on.
    pub valid_until: i64,
    /// Free-text analysis from the generator.
    #[serde(default)]
    pub analysis: Option<String>,
    /// Unix timestamp (milliseconds) when persisted.
    #[serde(default)]
    pub created_at: Option<i64>,
}

impl Signal {
    /// First take-profit price, if any.
    pub fn first_take_profit(&self) -> Option<f64> {
        self.take_profits.first().map(|tp| tp.price)
    }

    /// Absolute distance between entry and stop in price units.
    pub fn stop_distance(&self) -> f64 {
        (self.entry - self.stop_loss).abs()
    }

    /// Reject malformed signals before they are scored or distributed.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.symbol.trim().is_empty() {
            return Err(AppError::Validation("symbol is empty".to_string()));
        }
        if !self.entry.is_finite() || self.entry <= 0.0 {
            return Err(AppError::Validation(format!("invalid entry price {}", self.entry)));
        }
        if !self.stop_loss.is_finite() || self.stop_loss <= 0.0 {
            return Err(AppError::Validation(format!(
                "invalid stop-loss price {}",
                self.stop_loss
            )));
        }
        if !(0.0..=100.0).contains(&self.confidence) {
            return Err(AppError::Validation(format!(
                "confidence {} outside 0-100",
                self.confidence
            )));
        }

        let stop_on_wrong_side = match self.direction {
            Direction::Buy => self.stop_loss >= self.entry,
            Direction::Sell => self.stop_loss <= self.entry,
        };
        if stop_on_wrong_side {
            return Err(AppError::Validation(format!(
                "stop-loss {} is on the wrong side of entry {} for {}",
                self.stop_loss,
                self.entry,
                self.direction.as_str()
            )));
        }

        let first_tp = self
            .first_take_profit()
            .ok_or_else(|| AppError::Validation("no take-profit levels".to_string()))?;
        let tp_on_wrong_side = match self.direction {
            Direction::Buy => first_tp <= self.entry,
            Direction::Sell => first_tp >= self.entry,
        };
        if tp_on_wrong_side {
            return Err(AppError::Validation(format!(
                "take-profit {} is on the wrong side of entry {}",
                first_tp, self.entry
            )));
        }

        Ok(())
    }

    /// Whether the validity window has passed.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms > self.valid_until
    }
}
