//! Periodic dispatch cycle.
//!
//! Each tick rolls daily stats over when the UTC date changes, pulls one
//! signal per configured (timeframe, tier) pair, publishes every signal that
//! comes back and reports the reconciliation queue. No single failure stops
//! the cycle.

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::services::{CommandDispatcher, DailyRiskTracker, SignalSource, SqliteStore};

/// Counters for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    /// Combinations requested from the source.
    pub requested: usize,
    /// Answered below the confidence floor.
    pub filtered: usize,
    /// Scored below the monitor threshold.
    pub discarded: usize,
    /// Signals that produced at least one command.
    pub distributed: usize,
    /// Commands created across all signals.
    pub commands: usize,
    /// Upstream or publish failures.
    pub failures: usize,
    /// Accounts whose previous day was archived.
    pub rolled: usize,
    /// Commands awaiting manual reconciliation.
    pub stale: usize,
}

pub struct Scheduler {
    source: Arc<dyn SignalSource>,
    dispatcher: Arc<CommandDispatcher>,
    tracker: Arc<DailyRiskTracker>,
    store: Arc<SqliteStore>,
    config: SchedulerConfig,
    /// Date of the last completed rollover check.
    last_date: Mutex<Option<NaiveDate>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn SignalSource>,
        dispatcher: Arc<CommandDispatcher>,
        tracker: Arc<DailyRiskTracker>,
        store: Arc<SqliteStore>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        Arc::new(Self {
            source,
            dispatcher,
            tracker,
            store,
            config,
            last_date: Mutex::new(None),
            shutdown_tx,
        })
    }

    /// Run ticks on the configured interval until [`Scheduler::shutdown`].
    /// The first tick fires immediately.
    pub async fn run(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Scheduler started: every {:?}, {} timeframes x {} tiers",
            self.config.interval,
            self.config.timeframes.len(),
            self.config.tiers.len()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    info!("Scheduler tick: {:?}", report);
                }
                _ = shutdown_rx.recv() => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub async fn tick(&self) -> TickReport {
        self.tick_on(DailyRiskTracker::today()).await
    }

    pub async fn tick_on(&self, today: NaiveDate) -> TickReport {
        let mut report = TickReport {
            rolled: self.roll_over(today),
            ..Default::default()
        };

        let batch = self
            .source
            .request_all(&self.config.timeframes, &self.config.tiers)
            .await;
        report.requested = batch.requested();
        report.filtered = batch.filtered.len();
        report.failures = batch.failures.len();

        for failure in &batch.failures {
            warn!(
                "Skipping {}/{} this cycle: {}",
                failure.timeframe, failure.tier, failure.value
            );
        }

        for success in batch.successes {
            let (timeframe, tier) = (success.timeframe, success.tier);
            match self.dispatcher.publish(success.value).await {
                Ok(outcome) if !outcome.monitored => report.discarded += 1,
                Ok(outcome) => {
                    if outcome.distributed_count > 0 {
                        report.distributed += 1;
                        report.commands += outcome.distributed_count;
                    }
                    debug!(
                        "{}/{} signal {} scored {} -> {} commands",
                        timeframe, tier, outcome.signal_id, outcome.score, outcome.distributed_count
                    );
                }
                Err(e) => {
                    error!("Publishing {}/{} signal failed: {}", timeframe, tier, e);
                    report.failures += 1;
                }
            }
        }

        match self.dispatcher.stale_commands(self.config.stale_after) {
            Ok(stale) => report.stale = stale.len(),
            Err(e) => error!("Could not list stale commands: {}", e),
        }

        report
    }

    /// Archive yesterday's records for every account once per new date.
    fn roll_over(&self, today: NaiveDate) -> usize {
        {
            let last = self.last_date.lock().unwrap_or_else(|p| p.into_inner());
            if *last == Some(today) {
                return 0;
            }
        }

        let accounts = match self.store.list_accounts() {
            Ok(accounts) => accounts,
            Err(e) => {
                error!("Day rollover skipped, could not list accounts: {}", e);
                return 0;
            }
        };

        let mut rolled = 0;
        let mut complete = true;
        for account in &accounts {
            match self.tracker.roll_day_on(&account.id, today) {
                Ok(Some(_)) => rolled += 1,
                Ok(None) => {}
                Err(e) => {
                    complete = false;
                    error!("Day rollover failed for {}: {}", account.id, e);
                }
            }
        }

        if complete {
            *self.last_date.lock().unwrap_or_else(|p| p.into_inner()) = Some(today);
        }
        if rolled > 0 {
            info!("Rolled {} accounts into {}", rolled, today);
        }
        rolled
    }
}
