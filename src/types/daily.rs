use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Circuit-breaker state of an account for one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DailyStatus {
    #[default]
    Active,
    ProfitHit,
    LossHit,
}

impl DailyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::ProfitHit => "profit_hit",
            Self::LossHit => "loss_hit",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "profit_hit" => Some(Self::ProfitHit),
            "loss_hit" => Some(Self::LossHit),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Daily profit target and loss limit as fractions of the start balance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyLimits {
    pub profit_target_pct: f64,
    pub max_loss_pct: f64,
}

impl Default for DailyLimits {
    fn default() -> Self {
        Self {
            profit_target_pct: 0.15,
            max_loss_pct: 0.08,
        }
    }
}

/// Per-account, per-day ledger of realized results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    pub account_id: String,
    pub date: NaiveDate,
    pub start_balance: f64,
    pub current_balance: f64,
    pub profit_today: f64,
    /// Sum of absolute losses.
    pub loss_today: f64,
    pub profit_target: f64,
    pub max_loss: f64,
    pub trades_executed: u32,
    pub trades_won: u32,
    pub trades_lost: u32,
    pub status: DailyStatus,
    /// Set once the day has been rolled over.
    pub archived: bool,
    /// Unix timestamp (milliseconds) of the last change.
    pub updated_at: i64,
}

impl DailyStats {
    /// Fresh record for `date`, seeded from `start_balance`.
    pub fn new(account_id: &str, date: NaiveDate, start_balance: f64, limits: DailyLimits) -> Self {
        Self {
            account_id: account_id.to_string(),
            date,
            start_balance,
            current_balance: start_balance,
            profit_today: 0.0,
            loss_today: 0.0,
            profit_target: start_balance * limits.profit_target_pct,
            max_loss: start_balance * limits.max_loss_pct,
            trades_executed: 0,
            trades_won: 0,
            trades_lost: 0,
            status: DailyStatus::Active,
            archived: false,
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Fold one realized trade into the ledger and re-evaluate the breaker.
    ///
    /// Status only moves while `Active`; `ProfitHit` and `LossHit` are terminal
    /// for the day. The profit check runs first and the loss check second, so
    /// an update that satisfies both thresholds ends in `LossHit`.
    pub fn record_trade(&mut self, profit_or_loss: f64, new_balance: f64) {
        if profit_or_loss >= 0.0 {
            self.profit_today += profit_or_loss;
        } else {
            self.loss_today += profit_or_loss.abs();
        }

        self.trades_executed += 1;
        if profit_or_loss > 0.0 {
            self.trades_won += 1;
        } else if profit_or_loss < 0.0 {
            self.trades_lost += 1;
        }

        self.current_balance = new_balance;
        self.updated_at = chrono::Utc::now().timestamp_millis();

        if self.status.is_active() {
            if self.profit_today >= self.profit_target {
                self.status = DailyStatus::ProfitHit;
            }
            if self.loss_today >= self.max_loss {
                self.status = DailyStatus::LossHit;
            }
        }
    }

    /// Net realized result for the day.
    pub fn net_today(&self) -> f64 {
        self.profit_today - self.loss_today
    }
}
