use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed signal or request. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Persistence failure. Callers should try again.
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),
}

impl AppError {
    /// Whether the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Store(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "TRY_AGAIN"),
        };

        if let AppError::Store(e) = &self {
            tracing::error!("Store failure surfaced to client: {}", e);
        }

        let body = Json(json!({
            "error": self.to_string(),
            "code": code,
            "retryable": self.is_retryable(),
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_try_again() {
        let err = AppError::Store(rusqlite::Error::QueryReturnedNoRows);
        assert!(err.is_retryable());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_validation_errors_are_not_retryable() {
        let err = AppError::Validation("bad entry".to_string());
        assert!(!err.is_retryable());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unauthorized_status() {
        assert_eq!(
            AppError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
