//! Operator API.
//!
//! Every route requires `Authorization: Bearer <ADMIN_TOKEN>`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::auth::{generate_token, hash_token, Admin};
use super::ApiResponse;
use crate::error::{AppError, Result};
use crate::services::{PublishOutcome, ReportOutcome};
use crate::types::{Account, DailyStats, RiskProfile, Signal, StaleCommand};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub balance: f64,
    /// "conservative" or "aggressive"; anything else is conservative.
    #[serde(default)]
    pub risk_profile: Option<String>,
}

/// Registration result. The token is shown only here.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedAccount {
    pub account: Account,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub signal: Signal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub success: bool,
    #[serde(default)]
    pub ticket_id: Option<String>,
    #[serde(default)]
    pub error_text: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/accounts", get(list_accounts).post(create_account))
        .route("/accounts/:id/active", put(set_active))
        .route("/accounts/:id/daily", get(daily_stats))
        .route("/signals", post(publish_signal))
        .route("/commands/stale", get(stale_commands))
        .route("/commands/:id/resolve", post(resolve_command))
}

/// GET /api/admin/accounts
async fn list_accounts(
    State(state): State<AppState>,
    _admin: Admin,
) -> Result<Json<ApiResponse<Vec<Account>>>> {
    Ok(Json(ApiResponse {
        data: state.store.list_accounts()?,
    }))
}

/// POST /api/admin/accounts
///
/// Register an execution-client account and issue its credential token.
async fn create_account(
    State(state): State<AppState>,
    _admin: Admin,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedAccount>>)> {
    if !request.balance.is_finite() || request.balance < 0.0 {
        return Err(AppError::Validation(format!("invalid balance {}", request.balance)));
    }

    let profile = request
        .risk_profile
        .as_deref()
        .map(RiskProfile::from_str_lossy)
        .unwrap_or_default();
    let name = request
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "account".to_string());

    let account = Account::new(name, request.balance, profile);
    let token = generate_token();
    state.store.insert_account(&account, &hash_token(&token))?;

    info!(
        "Registered account {} ({}, {}, balance {:.2})",
        account.id,
        account.name,
        account.risk_profile.as_str(),
        account.balance
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: CreatedAccount { account, token },
        }),
    ))
}

/// PUT /api/admin/accounts/:id/active
async fn set_active(
    State(state): State<AppState>,
    _admin: Admin,
    Path(id): Path<String>,
    Json(request): Json<SetActiveRequest>,
) -> Result<Json<ApiResponse<Account>>> {
    if !state.store.set_account_active(&id, request.active)? {
        return Err(AppError::NotFound(format!("account {}", id)));
    }
    info!("Account {} active = {}", id, request.active);

    let account = state
        .store
        .get_account(&id)?
        .ok_or_else(|| AppError::NotFound(format!("account {}", id)))?;
    Ok(Json(ApiResponse { data: account }))
}

/// GET /api/admin/accounts/:id/daily
///
/// Today's circuit-breaker record, created on first access.
async fn daily_stats(
    State(state): State<AppState>,
    _admin: Admin,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DailyStats>>> {
    Ok(Json(ApiResponse {
        data: state.tracker.get_or_create(&id)?,
    }))
}

/// POST /api/admin/signals
///
/// Score, persist and distribute a signal on demand.
async fn publish_signal(
    State(state): State<AppState>,
    _admin: Admin,
    Json(request): Json<PublishRequest>,
) -> Result<Json<ApiResponse<PublishOutcome>>> {
    let outcome = state.dispatcher.publish(request.signal).await?;
    Ok(Json(ApiResponse { data: outcome }))
}

/// GET /api/admin/commands/stale
///
/// Commands stuck in `processing` past the staleness window.
async fn stale_commands(
    State(state): State<AppState>,
    _admin: Admin,
) -> Result<Json<ApiResponse<Vec<StaleCommand>>>> {
    let stale = state
        .dispatcher
        .stale_commands(state.config.scheduler.stale_after)?;
    Ok(Json(ApiResponse { data: stale }))
}

/// POST /api/admin/commands/:id/resolve
///
/// Manually finish a command after checking the broker.
async fn resolve_command(
    State(state): State<AppState>,
    _admin: Admin,
    Path(id): Path<Uuid>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<ApiResponse<ReportOutcome>>> {
    let outcome = state.dispatcher.resolve(
        id,
        request.success,
        request.ticket_id.as_deref(),
        request.error_text.as_deref(),
    )?;
    Ok(Json(ApiResponse { data: outcome }))
}
