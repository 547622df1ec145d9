use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// `None` when the store could not be read.
    pub active_accounts: Option<usize>,
}

/// GET /api/health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let active_accounts = match state.store.list_active_accounts() {
        Ok(accounts) => Some(accounts.len()),
        Err(e) => {
            warn!("Health check could not read accounts: {}", e);
            None
        }
    };

    Json(HealthResponse {
        status: if active_accounts.is_some() { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_accounts,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/health", get(health))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::{SqliteStore, TelegramNotifier};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_health_handler() {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let state = AppState::new(Config::default(), store, Arc::new(TelegramNotifier::disabled()));

        let Json(response) = health(State(state)).await;
        assert_eq!(response.status, "ok");
        assert_eq!(response.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(response.active_accounts, Some(0));
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok".to_string(),
            version: "1.0.0".to_string(),
            active_accounts: Some(2),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"activeAccounts\":2"));
    }
}
