//! EA Relay - trading signal distribution to polling execution clients

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod types;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use services::{
    CommandDispatcher, DailyRiskTracker, QualityScorer, RiskSizer, SqliteStore, TelegramNotifier,
};

pub use error::{AppError, Result};
pub use types::*;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<SqliteStore>,
    pub tracker: Arc<DailyRiskTracker>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub notifier: Arc<TelegramNotifier>,
}

impl AppState {
    /// Wire the services on top of an opened store.
    pub fn new(config: Config, store: Arc<SqliteStore>, notifier: Arc<TelegramNotifier>) -> Self {
        let tracker = Arc::new(DailyRiskTracker::new(store.clone(), config.daily_limits));
        let dispatcher = Arc::new(CommandDispatcher::new(
            store.clone(),
            tracker.clone(),
            RiskSizer::new(config.risk_profiles),
            QualityScorer::new(config.scheduler.monitor_threshold),
            config.pip_size,
            notifier.clone(),
        ));

        Self {
            config: Arc::new(config),
            store,
            tracker,
            dispatcher,
            notifier,
        }
    }
}

/// Build the HTTP application with CORS and request tracing.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
