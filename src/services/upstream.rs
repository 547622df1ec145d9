//! Client for the upstream signal generator.
//!
//! One request asks for a signal for a (timeframe, tier) pair. Overload,
//! rate-limit, gateway-timeout and connection failures are retried after a
//! fixed delay up to an attempt ceiling; anything else fails immediately.

use std::error::Error as StdError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::UpstreamConfig;
use crate::types::{Confluence, Direction, Signal, TakeProfit, Tier, Timeframe};

/// Upstream failure.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed upstream response: {0}")]
    Malformed(String),

    #[error("upstream gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<UpstreamError>,
    },
}

impl UpstreamError {
    /// Whether the failure class is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => matches!(*status, 429 | 502 | 503 | 504),
            Self::Transport(e) => {
                e.is_timeout() || e.is_connect() || has_transient_io_source(e)
            }
            Self::Malformed(_) | Self::Exhausted { .. } => false,
        }
    }

    /// The underlying error of the final attempt.
    pub fn last(&self) -> &UpstreamError {
        match self {
            Self::Exhausted { last, .. } => last.last(),
            other => other,
        }
    }
}

fn has_transient_io_source(error: &reqwest::Error) -> bool {
    let mut source = error.source();
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            return matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::TimedOut
            );
        }
        source = err.source();
    }
    false
}

#[derive(Debug, Serialize)]
struct SignalRequest<'a> {
    timeframe: &'a str,
    tier: &'a str,
    symbol: &'a str,
}

/// Generator response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignalResponse {
    direction: String,
    confidence: f64,
    entry: f64,
    stop_loss: f64,
    #[serde(rename = "takeProfit1")]
    take_profit_1: f64,
    #[serde(rename = "takeProfit2", default)]
    take_profit_2: Option<f64>,
    #[serde(default)]
    technical_analysis: Option<String>,
    #[serde(default)]
    confluence: Confluence,
}

/// One (timeframe, tier) combination's outcome in a batch.
#[derive(Debug)]
pub struct Tagged<T> {
    pub timeframe: Timeframe,
    pub tier: Tier,
    pub value: T,
}

/// Partitioned result of [`SignalSource::request_all`].
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub successes: Vec<Tagged<Signal>>,
    /// Combinations that answered below the confidence floor.
    pub filtered: Vec<Tagged<()>>,
    pub failures: Vec<Tagged<UpstreamError>>,
}

impl BatchOutcome {
    pub fn requested(&self) -> usize {
        self.successes.len() + self.filtered.len() + self.failures.len()
    }
}

/// Anything that can produce signals for (timeframe, tier) pairs.
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// `Ok(None)` means the source answered but had no qualifying signal.
    async fn request(&self, timeframe: Timeframe, tier: Tier) -> Result<Option<Signal>, UpstreamError>;

    /// Pause between two combinations of a batch.
    fn inter_request_delay(&self) -> Duration {
        Duration::ZERO
    }

    /// Request every combination sequentially. A failed combination never
    /// aborts the rest.
    async fn request_all(&self, timeframes: &[Timeframe], tiers: &[Tier]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let delay = self.inter_request_delay();

        let combinations: Vec<(Timeframe, Tier)> = timeframes
            .iter()
            .flat_map(|tf| tiers.iter().map(move |tier| (*tf, *tier)))
            .collect();

        for (i, (timeframe, tier)) in combinations.into_iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                sleep(delay).await;
            }

            match self.request(timeframe, tier).await {
                Ok(Some(signal)) => outcome.successes.push(Tagged { timeframe, tier, value: signal }),
                Ok(None) => outcome.filtered.push(Tagged { timeframe, tier, value: () }),
                Err(e) => {
                    warn!("Upstream request for {}/{} failed: {}", timeframe, tier, e);
                    outcome.failures.push(Tagged { timeframe, tier, value: e });
                }
            }
        }

        info!(
            "Upstream batch done: {} signals, {} filtered, {} failed",
            outcome.successes.len(),
            outcome.filtered.len(),
            outcome.failures.len()
        );
        outcome
    }
}

/// HTTP client for the signal generator.
pub struct UpstreamSignalClient {
    client: Client,
    config: UpstreamConfig,
    /// Rotation cursor over `config.api_keys`.
    next_key: AtomicUsize,
}

impl UpstreamSignalClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .user_agent(concat!("ea-relay/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;

        info!(
            "Upstream client for {} ({} API keys, {} attempts, {:?} retry delay)",
            config.base_url,
            config.api_keys.len(),
            config.max_attempts,
            config.retry_delay
        );

        Ok(Self {
            client,
            config,
            next_key: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    fn next_api_key(&self) -> Option<&str> {
        if self.config.api_keys.is_empty() {
            return None;
        }
        let i = self.next_key.fetch_add(1, Ordering::Relaxed) % self.config.api_keys.len();
        Some(self.config.api_keys[i].as_str())
    }

    async fn request_once(&self, timeframe: Timeframe, tier: Tier) -> Result<Signal, UpstreamError> {
        let url = format!("{}/signals", self.config.base_url.trim_end_matches('/'));
        let body = SignalRequest {
            timeframe: timeframe.as_str(),
            tier: tier.as_str(),
            symbol: &self.config.symbol,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = self.next_api_key() {
            request = request.header("X-API-Key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        let parsed: SignalResponse =
            serde_json::from_str(&text).map_err(|e| UpstreamError::Malformed(e.to_string()))?;
        self.to_signal(parsed, timeframe, tier)
    }

    fn to_signal(&self, response: SignalResponse, timeframe: Timeframe, tier: Tier) -> Result<Signal, UpstreamError> {
        let direction = Direction::from_str(&response.direction)
            .ok_or_else(|| UpstreamError::Malformed(format!("unknown direction {:?}", response.direction)))?;

        let take_profits = match response.take_profit_2 {
            Some(tp2) => vec![
                TakeProfit { price: response.take_profit_1, close_pct: 50.0 },
                TakeProfit { price: tp2, close_pct: 50.0 },
            ],
            None => vec![TakeProfit { price: response.take_profit_1, close_pct: 100.0 }],
        };

        // The generator's analysis text doubles as the market-context
        // description when the response carries no structured one.
        let mut confluence = response.confluence;
        if confluence.market_context.description.is_none() {
            confluence.market_context.description = response.technical_analysis.clone();
        }

        let validity_ms = i64::try_from(self.config.validity.as_millis()).unwrap_or(i64::MAX);
        let now = chrono::Utc::now().timestamp_millis();

        Ok(Signal {
            id: None,
            symbol: self.config.symbol.clone(),
            direction,
            entry: response.entry,
            stop_loss: response.stop_loss,
            take_profits,
            confidence: response.confidence,
            confluence,
            timeframe,
            tier: Some(tier),
            valid_until: now.saturating_add(validity_ms),
            analysis: response.technical_analysis,
            created_at: None,
        })
    }
}

#[async_trait]
impl SignalSource for UpstreamSignalClient {
    async fn request(&self, timeframe: Timeframe, tier: Tier) -> Result<Option<Signal>, UpstreamError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.request_once(timeframe, tier).await {
                Ok(signal) if signal.confidence < self.config.min_confidence => {
                    info!(
                        "Filtered {}/{} signal: confidence {:.1} below {:.1}",
                        timeframe, tier, signal.confidence, self.config.min_confidence
                    );
                    return Ok(None);
                }
                Ok(signal) => {
                    debug!(
                        "Upstream {}/{} -> {} @ {} (confidence {:.1}, attempt {})",
                        timeframe,
                        tier,
                        signal.direction.as_str(),
                        signal.entry,
                        signal.confidence,
                        attempt
                    );
                    return Ok(Some(signal));
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        "Upstream {}/{} attempt {}/{} failed: {}; retrying in {:?}",
                        timeframe, tier, attempt, max_attempts, e, self.config.retry_delay
                    );
                    sleep(self.config.retry_delay).await;
                }
                Err(e) if e.is_retryable() => {
                    return Err(UpstreamError::Exhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn inter_request_delay(&self) -> Duration {
        self.config.inter_request_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    #[derive(Clone, Default)]
    struct Fake {
        hits: Arc<AtomicUsize>,
        keys: Arc<Mutex<Vec<String>>>,
        /// Status codes returned before answering 200.
        failures: Arc<Mutex<Vec<u16>>>,
        always: Option<u16>,
        /// Tier answered with 400.
        reject_tier: Option<&'static str>,
        /// Arrival time and tier of every request.
        arrivals: Arc<Mutex<Vec<(Instant, String)>>>,
        confidence: f64,
    }

    async fn handler(
        State(fake): State<Fake>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> (axum::http::StatusCode, String) {
        fake.hits.fetch_add(1, Ordering::SeqCst);
        let tier = body["tier"].as_str().unwrap_or_default().to_string();
        fake.arrivals.lock().unwrap().push((Instant::now(), tier.clone()));
        if fake.reject_tier == Some(tier.as_str()) {
            return (axum::http::StatusCode::BAD_REQUEST, "bad tier".to_string());
        }
        if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
            fake.keys.lock().unwrap().push(key.to_string());
        }
        if let Some(code) = fake.always {
            return (axum::http::StatusCode::from_u16(code).unwrap(), "nope".to_string());
        }
        let pending = fake.failures.lock().unwrap().pop();
        if let Some(code) = pending {
            return (axum::http::StatusCode::from_u16(code).unwrap(), "busy".to_string());
        }
        let body = serde_json::json!({
            "direction": "SELL",
            "confidence": fake.confidence,
            "entry": 2350.0,
            "stopLoss": 2355.0,
            "takeProfit1": 2340.0,
            "takeProfit2": 2330.0,
            "technicalAnalysis": "rejection at supply"
        });
        (axum::http::StatusCode::OK, body.to_string())
    }

    async fn serve(fake: Fake) -> String {
        let app = Router::new().route("/signals", post(handler)).with_state(fake);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn config(base_url: String) -> UpstreamConfig {
        UpstreamConfig {
            base_url,
            api_keys: vec!["k1".to_string(), "k2".to_string()],
            timeout: Duration::from_secs(5),
            retry_delay: Duration::ZERO,
            max_attempts: 10,
            inter_request_delay: Duration::ZERO,
            min_confidence: 70.0,
            symbol: "XAUUSD".to_string(),
            validity: Duration::from_secs(3600),
        }
    }

    // =========================================================================
    // Error Classification Tests
    // =========================================================================

    fn gaps(arrivals: &[(Instant, String)]) -> Vec<Duration> {
        arrivals.windows(2).map(|w| w[1].0.duration_since(w[0].0)).collect()
    }

    #[test]
    fn test_status_retry_classes() {
        for status in [429, 502, 503, 504] {
            assert!(UpstreamError::Status { status, body: String::new() }.is_retryable());
        }
        for status in [400, 401, 404, 500] {
            assert!(!UpstreamError::Status { status, body: String::new() }.is_retryable());
        }
        assert!(!UpstreamError::Malformed("x".to_string()).is_retryable());
    }

    #[test]
    fn test_last_unwraps_exhausted() {
        let err = UpstreamError::Exhausted {
            attempts: 3,
            last: Box::new(UpstreamError::Status { status: 503, body: "busy".to_string() }),
        };
        assert!(matches!(err.last(), UpstreamError::Status { status: 503, .. }));
    }

    // =========================================================================
    // Request Tests
    // =========================================================================

    #[tokio::test]
    async fn test_request_parses_signal() {
        let fake = Fake { confidence: 82.0, ..Default::default() };
        let client = UpstreamSignalClient::new(config(serve(fake.clone()).await)).unwrap();

        let signal = client.request(Timeframe::H1, Tier::Small).await.unwrap().unwrap();
        assert_eq!(signal.direction, Direction::Sell);
        assert_eq!(signal.symbol, "XAUUSD");
        assert_eq!(signal.take_profits.len(), 2);
        assert_eq!(signal.take_profits[0].close_pct, 50.0);
        assert_eq!(signal.tier, Some(Tier::Small));
        assert!(signal.valid_until > chrono::Utc::now().timestamp_millis());
        assert!(signal.validate().is_ok());
        assert_eq!(signal.analysis.as_deref(), Some("rejection at supply"));
        assert_eq!(
            signal.confluence.market_context.description.as_deref(),
            Some("rejection at supply")
        );
    }

    #[tokio::test]
    async fn test_low_confidence_is_filtered_not_failed() {
        let fake = Fake { confidence: 55.0, ..Default::default() };
        let client = UpstreamSignalClient::new(config(serve(fake.clone()).await)).unwrap();

        assert!(client.request(Timeframe::H1, Tier::Small).await.unwrap().is_none());
        assert_eq!(fake.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_always_503_exhausts_after_ten_attempts() {
        let fake = Fake { always: Some(503), ..Default::default() };
        let client = UpstreamSignalClient::new(config(serve(fake.clone()).await)).unwrap();

        let err = client.request(Timeframe::H4, Tier::Medium).await.unwrap_err();
        match &err {
            UpstreamError::Exhausted { attempts, last } => {
                assert_eq!(*attempts, 10);
                assert!(matches!(**last, UpstreamError::Status { status: 503, .. }));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(fake.hits.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let fake = Fake {
            confidence: 90.0,
            failures: Arc::new(Mutex::new(vec![429, 502, 504])),
            ..Default::default()
        };
        let client = UpstreamSignalClient::new(config(serve(fake.clone()).await)).unwrap();

        assert!(client.request(Timeframe::M15, Tier::Small).await.unwrap().is_some());
        assert_eq!(fake.hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_retries_wait_the_fixed_delay() {
        let fake = Fake {
            confidence: 90.0,
            failures: Arc::new(Mutex::new(vec![503, 503])),
            ..Default::default()
        };
        let mut cfg = config(serve(fake.clone()).await);
        cfg.retry_delay = Duration::from_millis(30);
        let client = UpstreamSignalClient::new(cfg).unwrap();

        let started = Instant::now();
        assert!(client.request(Timeframe::H1, Tier::Small).await.unwrap().is_some());
        assert!(started.elapsed() >= Duration::from_millis(60));

        let arrivals = fake.arrivals.lock().unwrap().clone();
        assert_eq!(arrivals.len(), 3);
        for gap in gaps(&arrivals) {
            assert!(gap >= Duration::from_millis(30), "retry after {:?}", gap);
        }
    }

    #[tokio::test]
    async fn test_non_retryable_status_fails_fast() {
        let fake = Fake { always: Some(400), ..Default::default() };
        let client = UpstreamSignalClient::new(config(serve(fake.clone()).await)).unwrap();

        let err = client.request(Timeframe::H1, Tier::Small).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Status { status: 400, .. }));
        assert_eq!(fake.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connection_refused_is_retried() {
        // Bind and drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut cfg = config(format!("http://{}", addr));
        cfg.max_attempts = 2;
        let client = UpstreamSignalClient::new(cfg).unwrap();

        let err = client.request(Timeframe::H1, Tier::Small).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Exhausted { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_api_keys_rotate_per_request() {
        let fake = Fake { confidence: 90.0, ..Default::default() };
        let client = UpstreamSignalClient::new(config(serve(fake.clone()).await)).unwrap();

        for _ in 0..3 {
            client.request(Timeframe::H1, Tier::Small).await.unwrap();
        }
        assert_eq!(*fake.keys.lock().unwrap(), vec!["k1", "k2", "k1"]);
    }

    // =========================================================================
    // Batch Tests
    // =========================================================================

    #[tokio::test]
    async fn test_request_all_partitions_and_continues() {
        let fake = Fake {
            confidence: 90.0,
            // First combination gets a 400; the rest succeed
            failures: Arc::new(Mutex::new(vec![400])),
            ..Default::default()
        };
        let client = UpstreamSignalClient::new(config(serve(fake.clone()).await)).unwrap();

        let outcome = client
            .request_all(&[Timeframe::M15, Timeframe::H1], &[Tier::Small, Tier::Medium])
            .await;

        assert_eq!(outcome.requested(), 4);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.successes.len(), 3);
        assert_eq!(outcome.failures[0].timeframe, Timeframe::M15);
        assert_eq!(outcome.failures[0].tier, Tier::Small);
        assert_eq!(fake.hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_request_all_spaces_combinations_regardless_of_outcome() {
        let fake = Fake {
            confidence: 90.0,
            reject_tier: Some("medium"),
            ..Default::default()
        };
        let mut cfg = config(serve(fake.clone()).await);
        cfg.inter_request_delay = Duration::from_millis(40);
        let client = UpstreamSignalClient::new(cfg).unwrap();

        let started = Instant::now();
        let outcome = client
            .request_all(&[Timeframe::H1], &[Tier::Small, Tier::Medium, Tier::Large])
            .await;
        assert!(started.elapsed() >= Duration::from_millis(80));

        assert_eq!(outcome.successes.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].tier, Tier::Medium);

        // One at a time, in order, with the delay after the failure too
        let arrivals = fake.arrivals.lock().unwrap().clone();
        let tiers: Vec<&str> = arrivals.iter().map(|(_, tier)| tier.as_str()).collect();
        assert_eq!(tiers, vec!["small", "medium", "large"]);
        for gap in gaps(&arrivals) {
            assert!(gap >= Duration::from_millis(40), "next combination after {:?}", gap);
        }
    }
}
