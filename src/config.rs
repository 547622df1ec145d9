use std::env;
use std::time::Duration;

use crate::types::{DailyLimits, RiskProfile, Tier, Timeframe};

/// Sizing parameters for one risk profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileSettings {
    /// Fraction of balance risked per trade.
    pub risk_fraction: f64,
    /// Upper bound on lot size.
    pub max_lot: f64,
}

/// Sizing parameters for every risk profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskProfilesConfig {
    pub conservative: ProfileSettings,
    pub aggressive: ProfileSettings,
}

impl RiskProfilesConfig {
    pub fn for_profile(&self, profile: RiskProfile) -> ProfileSettings {
        match profile {
            RiskProfile::Conservative => self.conservative,
            RiskProfile::Aggressive => self.aggressive,
        }
    }
}

impl Default for RiskProfilesConfig {
    fn default() -> Self {
        Self {
            conservative: ProfileSettings {
                risk_fraction: 0.01,
                max_lot: 0.5,
            },
            aggressive: ProfileSettings {
                risk_fraction: 0.03,
                max_lot: 5.0,
            },
        }
    }
}

/// Upstream signal generator client configuration.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL of the generator.
    pub base_url: String,
    /// API keys rotated per request.
    pub api_keys: Vec<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Fixed delay before each retry.
    pub retry_delay: Duration,
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    /// Delay between consecutive (timeframe, tier) combinations.
    pub inter_request_delay: Duration,
    /// Signals below this confidence are filtered out.
    pub min_confidence: f64,
    /// Instrument the generator produces signals for.
    pub symbol: String,
    /// Validity window stamped on received signals.
    pub validity: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            api_keys: Vec::new(),
            timeout: Duration::from_secs(120),
            retry_delay: Duration::from_secs(20),
            max_attempts: 10,
            inter_request_delay: Duration::from_secs(12),
            min_confidence: 70.0,
            symbol: "XAUUSD".to_string(),
            validity: Duration::from_secs(240 * 60),
        }
    }
}

/// Periodic dispatch cycle configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub timeframes: Vec<Timeframe>,
    pub tiers: Vec<Tier>,
    /// Minimum quality score for a signal to be distributed.
    pub monitor_threshold: u8,
    /// Age after which a `processing` command is flagged for reconciliation.
    pub stale_after: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            timeframes: vec![Timeframe::M15, Timeframe::H1, Timeframe::H4],
            tiers: vec![Tier::Small, Tier::Medium],
            monitor_threshold: 65,
            stale_after: Duration::from_secs(30 * 60),
        }
    }
}

/// Telegram notification configuration.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_ids: Vec<String>,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// SQLite database file.
    pub database_path: String,
    /// Bearer token for the admin API. Admin routes reject every request when unset.
    pub admin_token: Option<String>,
    /// Price units per pip for the traded instrument.
    pub pip_size: f64,
    pub upstream: UpstreamConfig,
    pub scheduler: SchedulerConfig,
    pub risk_profiles: RiskProfilesConfig,
    pub daily_limits: DailyLimits,
    /// Optional chat notifications.
    pub telegram: Option<TelegramConfig>,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env::var(key).ok().map(|s| {
        s.split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect()
    })
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let upstream_defaults = UpstreamConfig::default();
        let scheduler_defaults = SchedulerConfig::default();
        let limits_defaults = DailyLimits::default();

        // Format: "M15,H1,H4"; unknown entries are skipped
        let timeframes = env_list("SCHEDULER_TIMEFRAMES")
            .map(|list| list.iter().filter_map(|s| Timeframe::from_str(s)).collect::<Vec<_>>())
            .filter(|list| !list.is_empty())
            .unwrap_or(scheduler_defaults.timeframes);
        let tiers = env_list("SCHEDULER_TIERS")
            .map(|list| list.iter().filter_map(|s| Tier::from_str(s)).collect::<Vec<_>>())
            .filter(|list| !list.is_empty())
            .unwrap_or(scheduler_defaults.tiers);

        let telegram = match (env::var("TELEGRAM_BOT_TOKEN"), env_list("TELEGRAM_CHAT_IDS")) {
            (Ok(bot_token), Some(chat_ids)) if !bot_token.is_empty() && !chat_ids.is_empty() => {
                Some(TelegramConfig { bot_token, chat_ids })
            }
            _ => None,
        };

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 3001),
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "ea_relay.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
            pip_size: env_parse("PIP_SIZE", 0.1),
            upstream: UpstreamConfig {
                base_url: env::var("UPSTREAM_URL").unwrap_or(upstream_defaults.base_url),
                api_keys: env_list("UPSTREAM_API_KEYS").unwrap_or_default(),
                timeout: Duration::from_secs(env_parse("UPSTREAM_TIMEOUT_SECS", 120)),
                retry_delay: Duration::from_secs(env_parse("UPSTREAM_RETRY_DELAY_SECS", 20)),
                max_attempts: env_parse("UPSTREAM_MAX_ATTEMPTS", upstream_defaults.max_attempts)
                    .max(1),
                inter_request_delay: Duration::from_secs(env_parse(
                    "UPSTREAM_INTER_REQUEST_DELAY_SECS",
                    12,
                )),
                min_confidence: env_parse("UPSTREAM_MIN_CONFIDENCE", upstream_defaults.min_confidence),
                symbol: env::var("SIGNAL_SYMBOL").unwrap_or(upstream_defaults.symbol),
                validity: Duration::from_secs(env_parse::<u64>("SIGNAL_VALIDITY_MINUTES", 240) * 60),
            },
            scheduler: SchedulerConfig {
                interval: Duration::from_secs(env_parse::<u64>("SCHEDULER_INTERVAL_SECS", 3600).max(1)),
                timeframes,
                tiers,
                monitor_threshold: env_parse("MONITOR_THRESHOLD", scheduler_defaults.monitor_threshold),
                stale_after: Duration::from_secs(env_parse::<u64>("STALE_COMMAND_MINUTES", 30) * 60),
            },
            risk_profiles: RiskProfilesConfig::default(),
            daily_limits: DailyLimits {
                profit_target_pct: env_parse(
                    "DAILY_PROFIT_TARGET_PCT",
                    limits_defaults.profit_target_pct,
                ),
                max_loss_pct: env_parse("DAILY_MAX_LOSS_PCT", limits_defaults.max_loss_pct),
            },
            telegram,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            database_path: "ea_relay.db".to_string(),
            admin_token: None,
            pip_size: 0.1,
            upstream: UpstreamConfig::default(),
            scheduler: SchedulerConfig::default(),
            risk_profiles: RiskProfilesConfig::default(),
            daily_limits: DailyLimits::default(),
            telegram: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // RiskProfilesConfig Tests
    // =========================================================================

    #[test]
    fn test_default_risk_profiles() {
        let profiles = RiskProfilesConfig::default();
        let conservative = profiles.for_profile(RiskProfile::Conservative);
        let aggressive = profiles.for_profile(RiskProfile::Aggressive);

        assert_eq!(conservative.risk_fraction, 0.01);
        assert_eq!(conservative.max_lot, 0.5);
        assert_eq!(aggressive.risk_fraction, 0.03);
        assert_eq!(aggressive.max_lot, 5.0);
    }

    // =========================================================================
    // UpstreamConfig Tests
    // =========================================================================

    #[test]
    fn test_upstream_defaults() {
        let config = UpstreamConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(120));
        assert_eq!(config.retry_delay, Duration::from_secs(20));
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.inter_request_delay, Duration::from_secs(12));
        assert_eq!(config.min_confidence, 70.0);
    }

    // =========================================================================
    // Config Tests
    // =========================================================================

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3001);
        assert!(config.admin_token.is_none());
        assert_eq!(config.scheduler.interval, Duration::from_secs(3600));
        assert_eq!(config.scheduler.monitor_threshold, 65);
        assert_eq!(config.daily_limits.profit_target_pct, 0.15);
        assert_eq!(config.daily_limits.max_loss_pct, 0.08);
    }

    #[test]
    fn test_env_list_splits_and_trims() {
        env::set_var("EA_RELAY_TEST_LIST", " a, b ,,c ");
        assert_eq!(
            env_list("EA_RELAY_TEST_LIST"),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert_eq!(env_list("EA_RELAY_TEST_LIST_MISSING"), None);
    }

    #[test]
    fn test_env_parse_falls_back_on_garbage() {
        env::set_var("EA_RELAY_TEST_NUMBER", "not-a-number");
        assert_eq!(env_parse("EA_RELAY_TEST_NUMBER", 42u32), 42);
        env::set_var("EA_RELAY_TEST_NUMBER_OK", "7");
        assert_eq!(env_parse("EA_RELAY_TEST_NUMBER_OK", 42u32), 7);
    }
}
