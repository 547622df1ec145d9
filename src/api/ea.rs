//! Execution-client protocol.
//!
//! Clients poll for at most one command at a time and report its outcome.
//! Responses are flat JSON objects; clients parse them field by field.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::auth::EaAccount;
use crate::error::Result;
use crate::types::{CommandStatus, ExecutionReport, PollResponse};
use crate::AppState;

/// Report acknowledgement.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportAck {
    pub acknowledged: bool,
    /// False for a duplicate report on an already-finished command.
    pub applied: bool,
    pub status: CommandStatus,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/poll", get(poll))
        .route("/report", post(report))
}

/// GET /api/ea/poll
///
/// Claim the caller's oldest pending command, if any.
async fn poll(
    State(state): State<AppState>,
    EaAccount(account): EaAccount,
) -> Result<Json<PollResponse>> {
    if !account.active {
        state
            .store
            .touch_account(&account.id, chrono::Utc::now().timestamp_millis())?;
        debug!("Inactive account {} polled", account.id);
        return Ok(Json(PollResponse::empty()));
    }

    let command = state.dispatcher.poll(&account.id)?;
    Ok(Json(PollResponse::from(command)))
}

/// POST /api/ea/report
///
/// Report the outcome of a previously polled command.
async fn report(
    State(state): State<AppState>,
    EaAccount(account): EaAccount,
    Json(report): Json<ExecutionReport>,
) -> Result<Json<ReportAck>> {
    let outcome = state.dispatcher.report(&account.id, &report).await?;
    Ok(Json(ReportAck {
        acknowledged: true,
        applied: outcome.applied,
        status: outcome.status,
    }))
}
