//! SQLite persistence layer.
//!
//! The store is the only shared mutable resource in the server. Nothing
//! upstream of it caches account, command or daily-stats state between
//! requests; every decision re-reads from here.
//!
//! Collections:
//! - `accounts` - execution-client accounts and their credential digests
//! - `signals` - scored signals with server-assigned ids
//! - `daily_stats` - per (account, date) circuit-breaker ledger
//! - `commands` - per (account, signal) work items, indexed by account + status

use crate::types::{
    Account, Command, CommandStatus, Completion, DailyStats, DailyStatus, Instruction, RiskProfile,
    Signal,
};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";

const COMMAND_COLUMNS: &str = "id, account_id, signal_id, instruction_json, status,
     created_at, picked_up_at, executed_at, ticket_id, error";

const DAILY_COLUMNS: &str = "account_id, date, start_balance, current_balance, profit_today,
     loss_today, profit_target, max_loss, trades_executed, trades_won, trades_lost,
     status, archived, updated_at";

const ACCOUNT_COLUMNS: &str = "id, name, balance, risk_profile, active, last_seen, created_at";

/// SQLite store for accounts, signals, daily stats and commands.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create a new SQLite store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("SQLite store initialized");
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub fn new_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        debug!("In-memory SQLite store initialized");
        Ok(store)
    }

    /// Lock the connection. A panicked holder cannot leave a half-applied
    /// transaction behind, so a poisoned lock is still usable.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<(), rusqlite::Error> {
        let conn = self.conn();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                token_hash TEXT UNIQUE NOT NULL,
                balance REAL NOT NULL,
                risk_profile TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                last_seen INTEGER,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_accounts_active ON accounts(active);

            CREATE TABLE IF NOT EXISTS signals (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                direction TEXT NOT NULL,
                entry REAL NOT NULL,
                stop_loss REAL NOT NULL,
                take_profits_json TEXT NOT NULL,
                confidence REAL NOT NULL,
                confluence_json TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                tier TEXT,
                valid_until INTEGER NOT NULL,
                analysis TEXT,
                quality_score INTEGER NOT NULL,
                monitored INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_signals_created ON signals(created_at DESC);

            CREATE TABLE IF NOT EXISTS daily_stats (
                account_id TEXT NOT NULL,
                date TEXT NOT NULL,
                start_balance REAL NOT NULL,
                current_balance REAL NOT NULL,
                profit_today REAL NOT NULL DEFAULT 0,
                loss_today REAL NOT NULL DEFAULT 0,
                profit_target REAL NOT NULL,
                max_loss REAL NOT NULL,
                trades_executed INTEGER NOT NULL DEFAULT 0,
                trades_won INTEGER NOT NULL DEFAULT 0,
                trades_lost INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                archived INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (account_id, date)
            );

            CREATE TABLE IF NOT EXISTS commands (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                signal_id TEXT NOT NULL,
                instruction_json TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                picked_up_at INTEGER,
                executed_at INTEGER,
                ticket_id TEXT,
                error TEXT,
                UNIQUE (account_id, signal_id)
            );

            CREATE INDEX IF NOT EXISTS idx_commands_account_status
                ON commands(account_id, status, created_at);
            CREATE INDEX IF NOT EXISTS idx_commands_status_pickup
                ON commands(status, picked_up_at);",
        )?;

        info!("SQLite schema initialized");
        Ok(())
    }

    // ========== Account Methods ==========

    /// Insert a new account with the digest of its credential token.
    pub fn insert_account(&self, account: &Account, token_hash: &str) -> Result<(), rusqlite::Error> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO accounts (id, name, token_hash, balance, risk_profile, active, last_seen, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                account.id,
                account.name,
                token_hash,
                account.balance,
                account.risk_profile.as_str(),
                account.active,
                account.last_seen,
                account.created_at,
            ],
        )?;
        debug!("Inserted account {}", account.id);
        Ok(())
    }

    pub fn get_account(&self, id: &str) -> Result<Option<Account>, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {} FROM accounts WHERE id = ?1", ACCOUNT_COLUMNS),
            params![id],
            row_to_account,
        )
        .optional()
    }

    /// Look up the account owning a credential digest.
    pub fn get_account_by_token_hash(&self, token_hash: &str) -> Result<Option<Account>, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {} FROM accounts WHERE token_hash = ?1", ACCOUNT_COLUMNS),
            params![token_hash],
            row_to_account,
        )
        .optional()
    }

    /// All accounts currently flagged active.
    pub fn list_active_accounts(&self) -> Result<Vec<Account>, rusqlite::Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM accounts WHERE active = 1 ORDER BY created_at ASC",
            ACCOUNT_COLUMNS
        ))?;
        let rows = stmt.query_map([], row_to_account)?;
        rows.collect()
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>, rusqlite::Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM accounts ORDER BY created_at ASC",
            ACCOUNT_COLUMNS
        ))?;
        let rows = stmt.query_map([], row_to_account)?;
        rows.collect()
    }

    /// Returns false if the account does not exist.
    pub fn set_account_active(&self, id: &str, active: bool) -> Result<bool, rusqlite::Error> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE accounts SET active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        Ok(changed > 0)
    }

    #[cfg(test)]
    pub(crate) fn set_account_balance(&self, id: &str, balance: f64) -> Result<(), rusqlite::Error> {
        let conn = self.conn();
        conn.execute(
            "UPDATE accounts SET balance = ?1 WHERE id = ?2",
            params![balance, id],
        )?;
        Ok(())
    }

    /// Record that the account's client was seen at `now_ms`.
    pub fn touch_account(&self, id: &str, now_ms: i64) -> Result<(), rusqlite::Error> {
        let conn = self.conn();
        conn.execute(
            "UPDATE accounts SET last_seen = ?1 WHERE id = ?2",
            params![now_ms, id],
        )?;
        Ok(())
    }

    // ========== Signal Methods ==========

    /// Persist a scored signal. The signal must carry its id and creation time.
    pub fn insert_signal(
        &self,
        signal: &Signal,
        quality_score: u8,
        monitored: bool,
    ) -> Result<(), rusqlite::Error> {
        let id = signal
            .id
            .ok_or_else(|| rusqlite::Error::ToSqlConversionFailure("signal has no id".into()))?;
        let take_profits = serde_json::to_string(&signal.take_profits)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        let confluence = serde_json::to_string(&signal.confluence)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        let created_at = signal
            .created_at
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

        let conn = self.conn();
        conn.execute(
            "INSERT INTO signals
             (id, symbol, direction, entry, stop_loss, take_profits_json, confidence,
              confluence_json, timeframe, tier, valid_until, analysis, quality_score,
              monitored, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                id.to_string(),
                signal.symbol,
                signal.direction.as_str(),
                signal.entry,
                signal.stop_loss,
                take_profits,
                signal.confidence,
                confluence,
                signal.timeframe.as_str(),
                signal.tier.map(|t| t.as_str()),
                signal.valid_until,
                signal.analysis,
                quality_score,
                monitored,
                created_at,
            ],
        )?;

        debug!("Stored signal {} (score {})", id, quality_score);
        Ok(())
    }

    pub fn get_signal(&self, id: Uuid) -> Result<Option<Signal>, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, symbol, direction, entry, stop_loss, take_profits_json, confidence,
                    confluence_json, timeframe, tier, valid_until, analysis, created_at
             FROM signals WHERE id = ?1",
            params![id.to_string()],
            row_to_signal,
        )
        .optional()
    }

    // ========== Command Methods ==========

    /// Insert every command in one transaction. Either all rows land or none do.
    pub fn insert_commands(&self, commands: &[Command]) -> Result<usize, rusqlite::Error> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO commands
                 (id, account_id, signal_id, instruction_json, status, created_at,
                  picked_up_at, executed_at, ticket_id, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for command in commands {
                let instruction = serde_json::to_string(&command.instruction)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                stmt.execute(params![
                    command.id.to_string(),
                    command.account_id,
                    command.signal_id.to_string(),
                    instruction,
                    command.status.as_str(),
                    command.created_at,
                    command.picked_up_at,
                    command.executed_at,
                    command.ticket_id,
                    command.error,
                ])?;
            }
        }
        tx.commit()?;
        Ok(commands.len())
    }

    /// Atomically move the oldest pending command of an account to `processing`.
    ///
    /// The update is conditional on the row still being `pending`, so two
    /// concurrent claims can never return the same command.
    pub fn claim_next_command(&self, account_id: &str, now_ms: i64) -> Result<Option<Command>, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "UPDATE commands SET status = 'processing', picked_up_at = ?2
                 WHERE id = (
                     SELECT id FROM commands
                     WHERE account_id = ?1 AND status = 'pending'
                     ORDER BY created_at ASC, rowid ASC
                     LIMIT 1
                 ) AND status = 'pending'
                 RETURNING {}",
                COMMAND_COLUMNS
            ),
            params![account_id, now_ms],
            row_to_command,
        )
        .optional()
    }

    pub fn get_command(&self, id: Uuid) -> Result<Option<Command>, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {} FROM commands WHERE id = ?1", COMMAND_COLUMNS),
            params![id.to_string()],
            row_to_command,
        )
        .optional()
    }

    /// Move a `processing` command to a terminal status.
    ///
    /// Returns false when the command was not `processing` (already terminal,
    /// still pending, or missing); nothing is written in that case.
    pub fn complete_command(&self, completion: &Completion<'_>) -> Result<bool, rusqlite::Error> {
        let conn = self.conn();
        finish_command(&conn, completion)
    }

    pub fn commands_for_signal(&self, signal_id: Uuid) -> Result<Vec<Command>, rusqlite::Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM commands WHERE signal_id = ?1 ORDER BY created_at ASC, rowid ASC",
            COMMAND_COLUMNS
        ))?;
        let rows = stmt.query_map(params![signal_id.to_string()], row_to_command)?;
        rows.collect()
    }

    pub fn count_commands(&self) -> Result<usize, rusqlite::Error> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM commands", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// `processing` commands picked up before `cutoff_ms`, oldest first.
    pub fn stale_commands(&self, cutoff_ms: i64) -> Result<Vec<Command>, rusqlite::Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM commands
             WHERE status = 'processing' AND picked_up_at < ?1
             ORDER BY picked_up_at ASC",
            COMMAND_COLUMNS
        ))?;
        let rows = stmt.query_map(params![cutoff_ms], row_to_command)?;
        rows.collect()
    }

    // ========== Daily Stats Methods ==========

    pub fn get_daily_stats(&self, account_id: &str, date: NaiveDate) -> Result<Option<DailyStats>, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {} FROM daily_stats WHERE account_id = ?1 AND date = ?2",
                DAILY_COLUMNS
            ),
            params![account_id, date.format(DATE_FORMAT).to_string()],
            row_to_daily_stats,
        )
        .optional()
    }

    /// Insert `stats` unless a record for the same (account, date) exists,
    /// then return whichever record is stored.
    pub fn insert_daily_stats_if_absent(&self, stats: &DailyStats) -> Result<DailyStats, rusqlite::Error> {
        let conn = self.conn();
        conn.execute(
            &format!(
                "INSERT OR IGNORE INTO daily_stats ({})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                DAILY_COLUMNS
            ),
            params![
                stats.account_id,
                stats.date.format(DATE_FORMAT).to_string(),
                stats.start_balance,
                stats.current_balance,
                stats.profit_today,
                stats.loss_today,
                stats.profit_target,
                stats.max_loss,
                stats.trades_executed,
                stats.trades_won,
                stats.trades_lost,
                stats.status.as_str(),
                stats.archived,
                stats.updated_at,
            ],
        )?;
        conn.query_row(
            &format!(
                "SELECT {} FROM daily_stats WHERE account_id = ?1 AND date = ?2",
                DAILY_COLUMNS
            ),
            params![stats.account_id, stats.date.format(DATE_FORMAT).to_string()],
            row_to_daily_stats,
        )
    }

    /// Read-modify-write a daily record inside one transaction.
    ///
    /// Returns `None` when no record exists for (account, date).
    pub fn modify_daily_stats<F>(
        &self,
        account_id: &str,
        date: NaiveDate,
        f: F,
    ) -> Result<Option<DailyStats>, rusqlite::Error>
    where
        F: FnOnce(&mut DailyStats),
    {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let stats = update_daily_stats(&tx, account_id, date, f)?;
        tx.commit()?;
        Ok(stats)
    }

    /// Fold a realized trade into the day's record and store the account's
    /// new balance, finishing the command that produced it when given.
    ///
    /// All writes share one transaction. Returns the status before the trade
    /// and the updated record, or `None` with nothing written when the
    /// command is no longer `processing`. A missing day record is an error.
    pub fn record_trade(
        &self,
        account_id: &str,
        date: NaiveDate,
        profit_or_loss: f64,
        new_balance: f64,
        completion: Option<&Completion<'_>>,
    ) -> Result<Option<(DailyStatus, DailyStats)>, rusqlite::Error> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        if let Some(completion) = completion {
            if !finish_command(&tx, completion)? {
                return Ok(None);
            }
        }

        let mut before = DailyStatus::Active;
        let stats = update_daily_stats(&tx, account_id, date, |stats| {
            before = stats.status;
            stats.record_trade(profit_or_loss, new_balance);
        })?
        .ok_or(rusqlite::Error::QueryReturnedNoRows)?;

        tx.execute(
            "UPDATE accounts SET balance = ?1 WHERE id = ?2",
            params![new_balance, account_id],
        )?;
        tx.commit()?;

        Ok(Some((before, stats)))
    }

    /// Most recent non-archived record strictly before `date`.
    pub fn latest_unarchived_before(
        &self,
        account_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyStats>, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {} FROM daily_stats
                 WHERE account_id = ?1 AND date < ?2 AND archived = 0
                 ORDER BY date DESC LIMIT 1",
                DAILY_COLUMNS
            ),
            params![account_id, date.format(DATE_FORMAT).to_string()],
            row_to_daily_stats,
        )
        .optional()
    }

    /// Archive every open record before `date` and carry the latest one's
    /// ending balance onto the account. Returns the carried balance, if any.
    pub fn archive_daily_stats(
        &self,
        account_id: &str,
        date: NaiveDate,
    ) -> Result<Option<f64>, rusqlite::Error> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let date_str = date.format(DATE_FORMAT).to_string();

        let carried: Option<f64> = tx
            .query_row(
                "SELECT current_balance FROM daily_stats
                 WHERE account_id = ?1 AND date < ?2 AND archived = 0
                 ORDER BY date DESC LIMIT 1",
                params![account_id, date_str],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(balance) = carried {
            tx.execute(
                "UPDATE daily_stats SET archived = 1, updated_at = ?3
                 WHERE account_id = ?1 AND date < ?2 AND archived = 0",
                params![account_id, date_str, chrono::Utc::now().timestamp_millis()],
            )?;
            tx.execute(
                "UPDATE accounts SET balance = ?1 WHERE id = ?2",
                params![balance, account_id],
            )?;
        }

        tx.commit()?;
        Ok(carried)
    }

    /// Run raw SQL against the connection (test fixtures only).
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<(), rusqlite::Error> {
        self.conn().execute_batch(sql)
    }
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn parse_uuid(idx: usize, raw: &str) -> Result<Uuid, rusqlite::Error> {
    Uuid::parse_str(raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> Result<T, rusqlite::Error> {
    serde_json::from_str(raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Conditional `processing -> terminal` update.
fn finish_command(conn: &Connection, completion: &Completion<'_>) -> Result<bool, rusqlite::Error> {
    let changed = conn.execute(
        "UPDATE commands SET status = ?2, executed_at = ?3, ticket_id = ?4, error = ?5
         WHERE id = ?1 AND status = 'processing'",
        params![
            completion.command_id.to_string(),
            completion.status.as_str(),
            completion.executed_at,
            completion.ticket_id,
            completion.error
        ],
    )?;
    Ok(changed > 0)
}

/// Read-modify-write of one daily record on an open transaction.
fn update_daily_stats<F>(
    conn: &Connection,
    account_id: &str,
    date: NaiveDate,
    f: F,
) -> Result<Option<DailyStats>, rusqlite::Error>
where
    F: FnOnce(&mut DailyStats),
{
    let date_str = date.format(DATE_FORMAT).to_string();
    let current = conn
        .query_row(
            &format!(
                "SELECT {} FROM daily_stats WHERE account_id = ?1 AND date = ?2",
                DAILY_COLUMNS
            ),
            params![account_id, date_str],
            row_to_daily_stats,
        )
        .optional()?;

    let Some(mut stats) = current else {
        return Ok(None);
    };

    f(&mut stats);

    conn.execute(
        "UPDATE daily_stats SET
            current_balance = ?3, profit_today = ?4, loss_today = ?5,
            trades_executed = ?6, trades_won = ?7, trades_lost = ?8,
            status = ?9, updated_at = ?10
         WHERE account_id = ?1 AND date = ?2",
        params![
            account_id,
            date_str,
            stats.current_balance,
            stats.profit_today,
            stats.loss_today,
            stats.trades_executed,
            stats.trades_won,
            stats.trades_lost,
            stats.status.as_str(),
            stats.updated_at,
        ],
    )?;
    Ok(Some(stats))
}

fn row_to_account(row: &Row<'_>) -> Result<Account, rusqlite::Error> {
    let profile: String = row.get(3)?;
    Ok(Account {
        id: row.get(0)?,
        name: row.get(1)?,
        balance: row.get(2)?,
        risk_profile: RiskProfile::from_str_lossy(&profile),
        active: row.get(4)?,
        last_seen: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn row_to_signal(row: &Row<'_>) -> Result<Signal, rusqlite::Error> {
    let id: String = row.get(0)?;
    let direction: String = row.get(2)?;
    let take_profits: String = row.get(5)?;
    let confluence: String = row.get(7)?;
    let timeframe: String = row.get(8)?;
    let tier: Option<String> = row.get(9)?;

    Ok(Signal {
        id: Some(parse_uuid(0, &id)?),
        symbol: row.get(1)?,
        direction: crate::types::Direction::from_str(&direction)
            .ok_or_else(|| conversion_error(2, format!("unknown direction {}", direction)))?,
        entry: row.get(3)?,
        stop_loss: row.get(4)?,
        take_profits: parse_json(5, &take_profits)?,
        confidence: row.get(6)?,
        confluence: parse_json(7, &confluence)?,
        timeframe: crate::types::Timeframe::from_str(&timeframe)
            .ok_or_else(|| conversion_error(8, format!("unknown timeframe {}", timeframe)))?,
        tier: tier.as_deref().and_then(crate::types::Tier::from_str),
        valid_until: row.get(10)?,
        analysis: row.get(11)?,
        created_at: row.get(12)?,
    })
}

fn row_to_command(row: &Row<'_>) -> Result<Command, rusqlite::Error> {
    let id: String = row.get(0)?;
    let signal_id: String = row.get(2)?;
    let instruction: String = row.get(3)?;
    let status: String = row.get(4)?;

    Ok(Command {
        id: parse_uuid(0, &id)?,
        account_id: row.get(1)?,
        signal_id: parse_uuid(2, &signal_id)?,
        instruction: parse_json::<Instruction>(3, &instruction)?,
        status: CommandStatus::from_str(&status)
            .ok_or_else(|| conversion_error(4, format!("unknown command status {}", status)))?,
        created_at: row.get(5)?,
        picked_up_at: row.get(6)?,
        executed_at: row.get(7)?,
        ticket_id: row.get(8)?,
        error: row.get(9)?,
    })
}

fn row_to_daily_stats(row: &Row<'_>) -> Result<DailyStats, rusqlite::Error> {
    let date: String = row.get(1)?;
    let status: String = row.get(11)?;

    Ok(DailyStats {
        account_id: row.get(0)?,
        date: NaiveDate::parse_from_str(&date, DATE_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?,
        start_balance: row.get(2)?,
        current_balance: row.get(3)?,
        profit_today: row.get(4)?,
        loss_today: row.get(5)?,
        profit_target: row.get(6)?,
        max_loss: row.get(7)?,
        trades_executed: row.get(8)?,
        trades_won: row.get(9)?,
        trades_lost: row.get(10)?,
        status: DailyStatus::from_str(&status)
            .ok_or_else(|| conversion_error(11, format!("unknown daily status {}", status)))?,
        archived: row.get(12)?,
        updated_at: row.get(13)?,
    })
}
