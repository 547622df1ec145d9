pub mod admin;
pub mod auth;
pub mod ea;
pub mod health;

use crate::AppState;
use axum::Router;
use serde::{Deserialize, Serialize};

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/api/ea", ea::router())
        .nest("/api/admin", admin::router())
}

/// API response wrapper.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}
