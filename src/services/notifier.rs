//! Telegram notifications for distributions and breaker trips.
//!
//! Delivery is best effort: failures are logged and never reach the caller.

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::TelegramConfig;
use crate::types::{DailyStats, DailyStatus, Signal};

const TELEGRAM_API: &str = "https://api.telegram.org";

pub struct TelegramNotifier {
    client: Client,
    /// `None` disables delivery.
    config: Option<TelegramConfig>,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(config: Option<TelegramConfig>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client for Telegram: {}", e);
                Client::new()
            });
        Self {
            client,
            config,
            api_base: TELEGRAM_API.to_string(),
        }
    }

    /// Notifier that drops every message.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    /// Send `text` to every configured chat. Returns how many chats accepted it.
    pub async fn send(&self, text: &str) -> usize {
        let Some(config) = &self.config else {
            return 0;
        };

        let url = format!("{}/bot{}/sendMessage", self.api_base, config.bot_token);
        let mut delivered = 0;

        for chat_id in &config.chat_ids {
            let payload = json!({
                "chat_id": chat_id,
                "text": text,
            });

            match self.client.post(&url).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    delivered += 1;
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    warn!("Telegram rejected message to {}: {} {}", chat_id, status, body);
                }
                Err(e) => warn!("Telegram send to {} failed: {}", chat_id, e),
            }
        }

        debug!("Telegram message delivered to {}/{} chats", delivered, config.chat_ids.len());
        delivered
    }

    pub async fn notify_distributed(&self, signal: &Signal, score: u8, accounts: usize) -> usize {
        let tp = signal
            .first_take_profit()
            .map(|p| format!("{}", p))
            .unwrap_or_else(|| "-".to_string());
        let text = format!(
            "{} {} {} @ {}\nSL {} | TP {}\nScore {} | confidence {:.0}\nSent to {} accounts",
            signal.direction.as_str(),
            signal.symbol,
            signal.timeframe,
            signal.entry,
            signal.stop_loss,
            tp,
            score,
            signal.confidence,
            accounts
        );
        self.send(&text).await
    }

    pub async fn notify_breaker(&self, account_name: &str, stats: &DailyStats) -> usize {
        let text = match stats.status {
            DailyStatus::ProfitHit => format!(
                "Daily profit target reached for {}: +{:.2} (target {:.2}). Trading paused until tomorrow.",
                account_name, stats.profit_today, stats.profit_target
            ),
            DailyStatus::LossHit => format!(
                "Daily loss limit reached for {}: -{:.2} (limit {:.2}). Trading paused until tomorrow.",
                account_name, stats.loss_today, stats.max_loss
            ),
            DailyStatus::Active => return 0,
        };
        self.send(&text).await
    }
}
