//! Bearer-token extractors for execution clients and operators.
//!
//! Execution-client tokens are issued once at registration; only their
//! SHA-256 digest is stored. The admin token comes from configuration and
//! admin routes reject every request when it is unset.

use axum::{extract::FromRequestParts, http::request::Parts};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::AppError;
use crate::types::Account;
use crate::AppState;

/// Generate a new random credential token (32 bytes, hex encoded).
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hex SHA-256 digest of a token.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    parts
        .headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthorized)
}

/// Account authenticated by its credential token.
///
/// ```ignore
/// async fn handler(EaAccount(account): EaAccount) { /* ... */ }
/// ```
pub struct EaAccount(pub Account);

#[axum::async_trait]
impl FromRequestParts<AppState> for EaAccount {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let account = state
            .store
            .get_account_by_token_hash(&hash_token(token))?
            .ok_or_else(|| {
                debug!("Rejected unknown execution-client token");
                AppError::Unauthorized
            })?;
        Ok(EaAccount(account))
    }
}

/// Operator authenticated by the configured admin token.
pub struct Admin;

#[axum::async_trait]
impl FromRequestParts<AppState> for Admin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let expected = state.config.admin_token.as_deref().ok_or(AppError::Unauthorized)?;
        let token = bearer_token(parts)?;

        // Fixed-length digests, never the raw tokens
        if hash_token(token) == hash_token(expected) {
            Ok(Admin)
        } else {
            Err(AppError::Unauthorized)
        }
    }
}
