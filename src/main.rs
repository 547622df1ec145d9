use std::sync::Arc;

use anyhow::Context;
use ea_relay::config::Config;
use ea_relay::services::{Scheduler, SignalSource, SqliteStore, TelegramNotifier, UpstreamSignalClient};
use ea_relay::{build_router, AppState};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ea_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();
    info!("Starting EA relay on {}:{}", config.host, config.port);

    if config.admin_token.is_none() {
        warn!("ADMIN_TOKEN not set, admin API disabled");
    }

    let store = Arc::new(
        SqliteStore::new(&config.database_path)
            .with_context(|| format!("opening database {}", config.database_path))?,
    );

    let notifier = Arc::new(TelegramNotifier::new(config.telegram.clone()));
    if notifier.is_enabled() {
        info!("Telegram notifications enabled");
    }

    let upstream: Arc<dyn SignalSource> = Arc::new(
        UpstreamSignalClient::new(config.upstream.clone()).context("building upstream client")?,
    );

    let scheduler_config = config.scheduler.clone();
    let state = AppState::new(config, store.clone(), notifier);

    // Start the dispatch cycle
    let scheduler = Scheduler::new(
        upstream,
        state.dispatcher.clone(),
        state.tracker.clone(),
        store,
        scheduler_config,
    );
    tokio::spawn(scheduler.clone().run());

    let addr = format!("{}:{}", state.config.host, state.config.port);
    let app = build_router(state);

    // Start the server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("EA relay listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    scheduler.shutdown();
    info!("EA relay stopped");

    Ok(())
}
