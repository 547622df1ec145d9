//! Per-account daily profit/loss circuit breaker.
//!
//! State per (account, date): `active -> profit_hit` or `active -> loss_hit`,
//! both terminal for the rest of the day. Records are created lazily by
//! [`DailyRiskTracker::get_or_create`], seeded from the account balance, and
//! archived when the next day begins so the ending balance compounds forward.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::services::SqliteStore;
use crate::types::{Completion, DailyLimits, DailyStats, DailyStatus};

/// Result of folding one trade into the daily ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeUpdate {
    pub stats: DailyStats,
    /// Set when this update moved the day out of `active`.
    pub tripped: Option<DailyStatus>,
}

pub struct DailyRiskTracker {
    store: Arc<SqliteStore>,
    limits: DailyLimits,
}

impl DailyRiskTracker {
    pub fn new(store: Arc<SqliteStore>, limits: DailyLimits) -> Self {
        Self { store, limits }
    }

    /// Current UTC calendar date.
    pub fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    /// Today's record for the account, creating it if absent.
    pub fn get_or_create(&self, account_id: &str) -> Result<DailyStats> {
        self.get_or_create_on(account_id, Self::today())
    }

    /// Record for `date`, creating it from the account's current balance if absent.
    ///
    /// Any open record from an earlier date is archived first, so the seed
    /// balance already includes yesterday's result.
    pub fn get_or_create_on(&self, account_id: &str, date: NaiveDate) -> Result<DailyStats> {
        if let Some(stats) = self.store.get_daily_stats(account_id, date)? {
            return Ok(stats);
        }

        if self.store.latest_unarchived_before(account_id, date)?.is_some() {
            self.roll_day_on(account_id, date)?;
        }

        let account = self
            .store
            .get_account(account_id)?
            .ok_or_else(|| AppError::NotFound(format!("account {}", account_id)))?;

        let fresh = DailyStats::new(account_id, date, account.balance, self.limits);
        let stats = self.store.insert_daily_stats_if_absent(&fresh)?;
        debug!(
            "Daily stats for {} on {}: start balance {:.2}, target {:.2}, max loss {:.2}",
            account_id, date, stats.start_balance, stats.profit_target, stats.max_loss
        );
        Ok(stats)
    }

    /// Fold a realized trade into today's record and store the new balance.
    pub fn apply_trade_result(
        &self,
        account_id: &str,
        profit_or_loss: f64,
        new_balance: f64,
    ) -> Result<TradeUpdate> {
        self.apply_trade_result_on(account_id, profit_or_loss, new_balance, Self::today())
    }

    pub fn apply_trade_result_on(
        &self,
        account_id: &str,
        profit_or_loss: f64,
        new_balance: f64,
        date: NaiveDate,
    ) -> Result<TradeUpdate> {
        self.record_on(account_id, profit_or_loss, new_balance, date, None)?
            .ok_or_else(|| AppError::NotFound(format!("daily stats for {}", account_id)))
    }

    /// Finish a command and fold its trade result into today's record.
    ///
    /// Both happen in one store transaction, so a failed ledger write leaves
    /// the command in `processing` and the client's retry applies cleanly.
    /// `Ok(None)` means the command was no longer `processing`.
    pub fn settle_command(
        &self,
        account_id: &str,
        completion: &Completion<'_>,
        profit_or_loss: f64,
        new_balance: f64,
    ) -> Result<Option<TradeUpdate>> {
        self.settle_command_on(account_id, completion, profit_or_loss, new_balance, Self::today())
    }

    pub fn settle_command_on(
        &self,
        account_id: &str,
        completion: &Completion<'_>,
        profit_or_loss: f64,
        new_balance: f64,
        date: NaiveDate,
    ) -> Result<Option<TradeUpdate>> {
        self.record_on(account_id, profit_or_loss, new_balance, date, Some(completion))
    }

    fn record_on(
        &self,
        account_id: &str,
        profit_or_loss: f64,
        new_balance: f64,
        date: NaiveDate,
        completion: Option<&Completion<'_>>,
    ) -> Result<Option<TradeUpdate>> {
        if !profit_or_loss.is_finite() || !new_balance.is_finite() {
            return Err(AppError::Validation(format!(
                "trade result must be finite (profit {}, balance {})",
                profit_or_loss, new_balance
            )));
        }

        self.get_or_create_on(account_id, date)?;

        let Some((before, stats)) =
            self.store
                .record_trade(account_id, date, profit_or_loss, new_balance, completion)?
        else {
            return Ok(None);
        };

        let tripped = (before.is_active() && !stats.status.is_active()).then_some(stats.status);
        match tripped {
            Some(DailyStatus::ProfitHit) => info!(
                "Account {} hit daily profit target ({:.2} >= {:.2})",
                account_id, stats.profit_today, stats.profit_target
            ),
            Some(DailyStatus::LossHit) => warn!(
                "Account {} hit daily loss limit ({:.2} >= {:.2})",
                account_id, stats.loss_today, stats.max_loss
            ),
            _ => debug!(
                "Account {} trade {:+.2}, net today {:+.2}",
                account_id,
                profit_or_loss,
                stats.net_today()
            ),
        }

        Ok(Some(TradeUpdate { stats, tripped }))
    }

    /// Whether the account may receive new commands today.
    pub fn can_dispatch(&self, account_id: &str) -> Result<bool> {
        self.can_dispatch_on(account_id, Self::today())
    }

    pub fn can_dispatch_on(&self, account_id: &str, date: NaiveDate) -> Result<bool> {
        Ok(self.get_or_create_on(account_id, date)?.status.is_active())
    }

    /// Archive records before today and carry the ending balance forward.
    /// Today's record is not created.
    pub fn roll_day(&self, account_id: &str) -> Result<Option<f64>> {
        self.roll_day_on(account_id, Self::today())
    }

    pub fn roll_day_on(&self, account_id: &str, today: NaiveDate) -> Result<Option<f64>> {
        let carried = self.store.archive_daily_stats(account_id, today)?;
        if let Some(balance) = carried {
            info!(
                "Rolled daily stats for {} into {}, balance carried forward {:.2}",
                account_id, today, balance
            );
        }
        Ok(carried)
    }
}
