//! Command fan-out and the poll/report protocol.
//!
//! A qualifying signal becomes one command per eligible account, written in
//! a single transaction. Clients claim commands one at a time with an atomic
//! `pending -> processing` update and report back exactly once; duplicate
//! reports are acknowledged without changing anything.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::services::{DailyRiskTracker, QualityScorer, RiskSizer, SqliteStore, TelegramNotifier};
use crate::types::{
    Command, CommandStatus, Completion, DailyStats, DailyStatus, ExecutionReport, Instruction,
    InstructionType, Signal, StaleCommand,
};

/// Result of scoring, persisting and (maybe) distributing one signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    pub signal_id: Uuid,
    pub score: u8,
    pub monitored: bool,
    pub distributed_count: usize,
}

/// Result of a report or manual resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportOutcome {
    pub command_id: Uuid,
    /// False when the command was already terminal.
    pub applied: bool,
    /// Stored status after the call.
    pub status: CommandStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily: Option<DailyStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tripped: Option<DailyStatus>,
}

pub struct CommandDispatcher {
    store: Arc<SqliteStore>,
    tracker: Arc<DailyRiskTracker>,
    sizer: RiskSizer,
    scorer: QualityScorer,
    /// Price units per pip.
    pip_size: f64,
    notifier: Arc<TelegramNotifier>,
}

impl CommandDispatcher {
    pub fn new(
        store: Arc<SqliteStore>,
        tracker: Arc<DailyRiskTracker>,
        sizer: RiskSizer,
        scorer: QualityScorer,
        pip_size: f64,
        notifier: Arc<TelegramNotifier>,
    ) -> Self {
        Self {
            store,
            tracker,
            sizer,
            scorer,
            pip_size,
            notifier,
        }
    }

    pub fn scorer(&self) -> &QualityScorer {
        &self.scorer
    }

    /// Validate, score and persist a signal, then distribute it if it passes
    /// the quality gate.
    pub async fn publish(&self, mut signal: Signal) -> Result<PublishOutcome> {
        signal.validate()?;
        let now = Utc::now().timestamp_millis();
        if signal.is_expired(now) {
            return Err(AppError::Validation(format!(
                "signal expired at {}",
                signal.valid_until
            )));
        }

        let breakdown = self.scorer.breakdown(&signal);
        let score = breakdown.total();
        let monitored = score >= self.scorer.threshold();
        debug!("Signal score breakdown: {:?}", breakdown);

        let signal_id = Uuid::new_v4();
        signal.id = Some(signal_id);
        signal.created_at = Some(now);
        self.store.insert_signal(&signal, score, monitored)?;

        if !monitored {
            info!(
                "Discarded {} {} {} signal {}: score {} below {}",
                signal.symbol,
                signal.timeframe,
                signal.direction.as_str(),
                signal_id,
                score,
                self.scorer.threshold()
            );
            return Ok(PublishOutcome {
                signal_id,
                score,
                monitored,
                distributed_count: 0,
            });
        }

        let distributed_count = self.distribute(&signal)?;
        if distributed_count > 0 {
            self.notifier.notify_distributed(&signal, score, distributed_count).await;
        }

        Ok(PublishOutcome {
            signal_id,
            score,
            monitored,
            distributed_count,
        })
    }

    /// Create one command per eligible account in a single transaction.
    ///
    /// Returns the number of commands committed. The signal must already be
    /// persisted. On a store failure no command for this signal exists.
    pub fn distribute(&self, signal: &Signal) -> Result<usize> {
        signal.validate()?;
        let signal_id = signal
            .id
            .ok_or_else(|| AppError::Validation("signal has not been persisted".to_string()))?;
        let take_profit = signal
            .first_take_profit()
            .ok_or_else(|| AppError::Validation("no take-profit levels".to_string()))?;

        let now = Utc::now().timestamp_millis();
        if signal.is_expired(now) {
            return Err(AppError::Validation(format!("signal {} expired", signal_id)));
        }

        let stop_pips = RiskSizer::price_to_pips(signal.stop_distance(), self.pip_size);
        let accounts = self.store.list_active_accounts()?;
        let mut commands = Vec::with_capacity(accounts.len());

        for account in &accounts {
            if !self.tracker.can_dispatch(&account.id)? {
                debug!("Skipping {}: daily breaker tripped", account.id);
                continue;
            }

            let lot_size = self.sizer.size(account.balance, account.risk_profile, stop_pips);
            let instruction = Instruction {
                kind: InstructionType::OpenTrade,
                symbol: signal.symbol.clone(),
                direction: signal.direction,
                direction_code: signal.direction.code(),
                lot_size,
                stop_loss: signal.stop_loss,
                take_profit,
            };
            commands.push(Command::open_trade(&account.id, signal_id, instruction, now));
        }

        if commands.is_empty() {
            info!(
                "Signal {} had no eligible accounts ({} active)",
                signal_id,
                accounts.len()
            );
            return Ok(0);
        }

        let count = self.store.insert_commands(&commands).map_err(|e| {
            error!(
                "Distribution of signal {} to {} accounts dropped: {}",
                signal_id,
                commands.len(),
                e
            );
            e
        })?;

        info!(
            "Distributed signal {} to {}/{} active accounts ({:.1} pip stop)",
            signal_id,
            count,
            accounts.len(),
            stop_pips
        );
        Ok(count)
    }

    /// Claim the account's oldest pending command, if any, and record the poll.
    pub fn poll(&self, account_id: &str) -> Result<Option<Command>> {
        let now = Utc::now().timestamp_millis();
        self.store.touch_account(account_id, now)?;

        let claimed = self.store.claim_next_command(account_id, now)?;
        if let Some(command) = &claimed {
            info!(
                "Account {} picked up command {} ({} lots)",
                account_id, command.id, command.instruction.lot_size
            );
        }
        Ok(claimed)
    }

    /// Record an execution outcome reported by the owning account's client.
    ///
    /// When the report carries a realized result, the command transition and
    /// the daily ledger update commit together; a failed write leaves the
    /// command in `processing` so the client's retry applies it.
    pub async fn report(&self, account_id: &str, report: &ExecutionReport) -> Result<ReportOutcome> {
        let command = self
            .store
            .get_command(report.command_id)?
            .filter(|c| c.account_id == account_id)
            .ok_or_else(|| AppError::NotFound(format!("command {}", report.command_id)))?;

        let completion = Completion::new(
            command.id,
            report.success,
            report.ticket_id.as_deref(),
            report.error_text.as_deref(),
            Utc::now().timestamp_millis(),
        );

        let fields = match (report.profit, report.new_balance) {
            (None, None) => return self.transition(&completion),
            fields => fields,
        };

        let account = self
            .store
            .get_account(account_id)?
            .ok_or_else(|| AppError::NotFound(format!("account {}", account_id)))?;

        let (profit, new_balance) = match fields {
            (Some(profit), Some(balance)) => (profit, balance),
            (Some(profit), None) => (profit, account.balance + profit),
            (None, balance) => {
                let balance = balance.unwrap_or(account.balance);
                (balance - account.balance, balance)
            }
        };

        let settled = self
            .tracker
            .settle_command(account_id, &completion, profit, new_balance)
            .map_err(|e| {
                error!(
                    "Result of command {} ({:+.2}) not recorded, command left in processing: {}",
                    command.id, profit, e
                );
                e
            })?;

        let Some(update) = settled else {
            return self.unapplied(command.id);
        };

        log_finished(&completion);
        if update.tripped.is_some() {
            self.notifier.notify_breaker(&account.name, &update.stats).await;
        }

        Ok(ReportOutcome {
            command_id: command.id,
            applied: true,
            status: completion.status,
            daily: Some(update.stats),
            tripped: update.tripped,
        })
    }

    /// Operator resolution of a command, typically a stale one. No trade
    /// result is forwarded.
    pub fn resolve(
        &self,
        command_id: Uuid,
        success: bool,
        ticket_id: Option<&str>,
        error_text: Option<&str>,
    ) -> Result<ReportOutcome> {
        let command = self
            .store
            .get_command(command_id)?
            .ok_or_else(|| AppError::NotFound(format!("command {}", command_id)))?;
        let completion = Completion::new(
            command.id,
            success,
            ticket_id,
            error_text,
            Utc::now().timestamp_millis(),
        );
        let outcome = self.transition(&completion)?;
        if outcome.applied {
            warn!(
                "Command {} for {} resolved manually as {}",
                command_id,
                command.account_id,
                outcome.status.as_str()
            );
        }
        Ok(outcome)
    }

    fn transition(&self, completion: &Completion<'_>) -> Result<ReportOutcome> {
        if !self.store.complete_command(completion)? {
            return self.unapplied(completion.command_id);
        }

        log_finished(completion);
        Ok(ReportOutcome {
            command_id: completion.command_id,
            applied: true,
            status: completion.status,
            daily: None,
            tripped: None,
        })
    }

    /// Outcome for a command that was not in `processing`.
    fn unapplied(&self, command_id: Uuid) -> Result<ReportOutcome> {
        let current = self
            .store
            .get_command(command_id)?
            .ok_or_else(|| AppError::NotFound(format!("command {}", command_id)))?;

        if current.status.is_terminal() {
            debug!(
                "Duplicate report for command {} ignored (already {})",
                command_id,
                current.status.as_str()
            );
            return Ok(ReportOutcome {
                command_id,
                applied: false,
                status: current.status,
                daily: None,
                tripped: None,
            });
        }

        match current.status {
            CommandStatus::Pending => Err(AppError::Conflict(format!(
                "command {} has not been picked up",
                command_id
            ))),
            _ => Err(AppError::Conflict(format!(
                "command {} changed concurrently",
                command_id
            ))),
        }
    }

    /// `processing` commands picked up more than `window` ago.
    pub fn stale_commands(&self, window: Duration) -> Result<Vec<StaleCommand>> {
        let now = Utc::now().timestamp_millis();
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now.saturating_sub(window_ms);

        let stale: Vec<StaleCommand> = self
            .store
            .stale_commands(cutoff)?
            .into_iter()
            .map(|command| {
                let age_secs = (now - command.picked_up_at.unwrap_or(now)) / 1000;
                StaleCommand { command, age_secs }
            })
            .collect();

        if !stale.is_empty() {
            warn!(
                "{} commands awaiting reconciliation (processing longer than {:?})",
                stale.len(),
                window
            );
        }
        Ok(stale)
    }
}

fn log_finished(completion: &Completion<'_>) {
    match completion.status {
        CommandStatus::Completed => info!(
            "Command {} completed (ticket {})",
            completion.command_id,
            completion.ticket_id.unwrap_or("-")
        ),
        _ => warn!(
            "Command {} failed: {}",
            completion.command_id,
            completion.error.unwrap_or("no error text")
        ),
    }
}
