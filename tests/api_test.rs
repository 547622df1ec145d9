//! Integration tests for API endpoints

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use ea_relay::config::Config;
use ea_relay::services::{SqliteStore, TelegramNotifier};
use ea_relay::{build_router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

const ADMIN: &str = "admin-secret";

fn app_with(config: Config) -> Router {
    let store = Arc::new(SqliteStore::new_in_memory().unwrap());
    let state = AppState::new(config, store, Arc::new(TelegramNotifier::disabled()));
    build_router(state)
}

fn app() -> Router {
    app_with(Config {
        admin_token: Some(ADMIN.to_string()),
        ..Default::default()
    })
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn register(app: &Router, name: &str, balance: f64, profile: &str) -> (String, String) {
    let (status, body) = send(
        app,
        "POST",
        "/api/admin/accounts",
        Some(ADMIN),
        Some(json!({ "name": name, "balance": balance, "riskProfile": profile })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    (
        body["data"]["account"]["id"].as_str().unwrap().to_string(),
        body["data"]["token"].as_str().unwrap().to_string(),
    )
}

/// BUY 2350 / SL 2345 / TP 2360 with strong confluence (scores above the gate).
fn strong_signal() -> Value {
    json!({
        "signal": {
            "symbol": "XAUUSD",
            "direction": "BUY",
            "entry": 2350.0,
            "stopLoss": 2345.0,
            "takeProfits": [{ "price": 2360.0, "closePct": 100.0 }],
            "confidence": 85.0,
            "confluence": {
                "oscillator": { "value": 25.0, "condition": "oversold" },
                "marketContext": { "label": "demand_zone", "confluenceScore": 95.0 }
            },
            "timeframe": "H1",
            "validUntil": chrono::Utc::now().timestamp_millis() + 3_600_000
        }
    })
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health() {
    let app = app();
    let (status, body) = send(&app, "GET", "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["activeAccounts"], 0);
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_admin_requires_token() {
    let app = app();
    let (status, body) = send(&app, "GET", "/api/admin/accounts", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = send(&app, "GET", "/api/admin/accounts", Some("wrong"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, "GET", "/api/admin/accounts", Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_disabled_without_configured_token() {
    let app = app_with(Config::default());
    let (status, _) = send(&app, "GET", "/api/admin/accounts", Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_poll_rejects_unknown_token() {
    let app = app();
    let (status, _) = send(&app, "GET", "/api/ea/poll", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "GET", "/api/ea/poll", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Account Registration
// =============================================================================

#[tokio::test]
async fn test_register_account() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/admin/accounts",
        Some(ADMIN),
        Some(json!({ "balance": 2500.0, "riskProfile": "something-else" })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let account = &body["data"]["account"];
    assert_eq!(account["riskProfile"], "conservative");
    assert_eq!(account["active"], true);
    assert_eq!(body["data"]["token"].as_str().unwrap().len(), 64);
}

#[tokio::test]
async fn test_register_rejects_bad_balance() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/admin/accounts",
        Some(ADMIN),
        Some(json!({ "balance": -1.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["retryable"], false);
}

// =============================================================================
// Poll / Report Flow
// =============================================================================

#[tokio::test]
async fn test_full_signal_lifecycle() {
    let app = app();
    let (a_id, a_token) = register(&app, "alpha", 1000.0, "conservative").await;
    let (_b_id, b_token) = register(&app, "beta", 1000.0, "aggressive").await;

    // Nothing to do yet
    let (status, body) = send(&app, "GET", "/api/ea/poll", Some(&a_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "hasCommand": false }));

    // Publish a signal that passes the quality gate
    let (status, body) = send(&app, "POST", "/api/admin/signals", Some(ADMIN), Some(strong_signal())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["monitored"], true);
    assert_eq!(body["data"]["distributedCount"], 2);

    // Alpha claims its command exactly once
    let (_, body) = send(&app, "GET", "/api/ea/poll", Some(&a_token), None).await;
    assert_eq!(body["hasCommand"], true);
    assert_eq!(body["instruction"]["type"], "OPEN_TRADE");
    assert_eq!(body["instruction"]["lotSize"], 0.02);
    assert_eq!(body["instruction"]["directionCode"], 0);
    let command_id = body["commandId"].as_str().unwrap().to_string();

    let (_, again) = send(&app, "GET", "/api/ea/poll", Some(&a_token), None).await;
    assert_eq!(again["hasCommand"], false);

    // Beta cannot report on alpha's command
    let report = json!({ "commandId": command_id, "success": true, "ticketId": "9001", "profit": -85.0 });
    let (status, _) = send(&app, "POST", "/api/ea/report", Some(&b_token), Some(report.clone())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // First report applies and trips the loss limit
    let (status, body) = send(&app, "POST", "/api/ea/report", Some(&a_token), Some(report.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["acknowledged"], true);
    assert_eq!(body["applied"], true);
    assert_eq!(body["status"], "completed");

    // Duplicate with a different outcome is a no-op
    let duplicate = json!({ "commandId": command_id, "success": false, "errorText": "retry" });
    let (status, body) = send(&app, "POST", "/api/ea/report", Some(&a_token), Some(duplicate)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], false);
    assert_eq!(body["status"], "completed");

    let (_, body) = send(&app, "GET", &format!("/api/admin/accounts/{}/daily", a_id), Some(ADMIN), None).await;
    assert_eq!(body["data"]["status"], "loss_hit");
    assert_eq!(body["data"]["tradesLost"], 1);
    assert_eq!(body["data"]["currentBalance"], 915.0);

    // The tripped account is skipped on the next signal
    let (_, body) = send(&app, "POST", "/api/admin/signals", Some(ADMIN), Some(strong_signal())).await;
    assert_eq!(body["data"]["distributedCount"], 1);
}

#[tokio::test]
async fn test_report_unknown_command() {
    let app = app();
    let (_a_id, a_token) = register(&app, "alpha", 1000.0, "conservative").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/ea/report",
        Some(&a_token),
        Some(json!({ "commandId": uuid::Uuid::new_v4(), "success": true })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_commands_are_claimed_oldest_first() {
    let app = app();
    let (_a_id, a_token) = register(&app, "alpha", 1000.0, "conservative").await;
    send(&app, "POST", "/api/admin/signals", Some(ADMIN), Some(strong_signal())).await;
    send(&app, "POST", "/api/admin/signals", Some(ADMIN), Some(strong_signal())).await;

    let (_, first) = send(&app, "GET", "/api/ea/poll", Some(&a_token), None).await;
    let (_, second) = send(&app, "GET", "/api/ea/poll", Some(&a_token), None).await;
    let (_, third) = send(&app, "GET", "/api/ea/poll", Some(&a_token), None).await;

    assert_eq!(first["hasCommand"], true);
    assert_eq!(second["hasCommand"], true);
    assert_ne!(first["commandId"], second["commandId"]);
    assert_eq!(third["hasCommand"], false);

    // Freshly claimed commands are not stale yet
    let (_, stale) = send(&app, "GET", "/api/admin/commands/stale", Some(ADMIN), None).await;
    assert!(stale["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_deactivated_account_receives_nothing() {
    let app = app();
    let (a_id, a_token) = register(&app, "alpha", 1000.0, "conservative").await;
    register(&app, "beta", 1000.0, "conservative").await;

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/api/admin/accounts/{}/active", a_id),
        Some(ADMIN),
        Some(json!({ "active": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["active"], false);

    let (_, body) = send(&app, "POST", "/api/admin/signals", Some(ADMIN), Some(strong_signal())).await;
    assert_eq!(body["data"]["distributedCount"], 1);

    let (status, body) = send(&app, "GET", "/api/ea/poll", Some(&a_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hasCommand"], false);

    let (status, _) = send(
        &app,
        "PUT",
        "/api/admin/accounts/missing/active",
        Some(ADMIN),
        Some(json!({ "active": true })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_signal_rejected() {
    let app = app();
    let mut signal = strong_signal();
    // Stop above entry on a BUY
    signal["signal"]["stopLoss"] = json!(2400.0);

    let (status, body) = send(&app, "POST", "/api/admin/signals", Some(ADMIN), Some(signal)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_manual_resolution_is_idempotent() {
    let app = app();
    let (_a_id, a_token) = register(&app, "alpha", 1000.0, "conservative").await;
    send(&app, "POST", "/api/admin/signals", Some(ADMIN), Some(strong_signal())).await;
    let (_, polled) = send(&app, "GET", "/api/ea/poll", Some(&a_token), None).await;
    let command_id = polled["commandId"].as_str().unwrap().to_string();

    let uri = format!("/api/admin/commands/{}/resolve", command_id);
    let (status, body) = send(
        &app,
        "POST",
        &uri,
        Some(ADMIN),
        Some(json!({ "success": true, "ticketId": "777" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["applied"], true);
    assert_eq!(body["data"]["status"], "completed");

    let (_, body) = send(&app, "POST", &uri, Some(ADMIN), Some(json!({ "success": false }))).await;
    assert_eq!(body["data"]["applied"], false);
    assert_eq!(body["data"]["status"], "completed");

    // The client's late report is acknowledged without effect
    let (status, body) = send(
        &app,
        "POST",
        "/api/ea/report",
        Some(&a_token),
        Some(json!({ "commandId": command_id, "success": true, "profit": 10.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], false);
}
