//! API error handling
//!
//! Maps service errors onto HTTP status codes.

use crate::core::ValidationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// API error type
#[derive(Debug)]
pub enum ApiError {
    /// The request cannot be planned
    Validation(ValidationError),
    NotFound(String),
    /// The history store failed
    History(anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(ValidationError::DisallowedAgent(_)) => StatusCode::FORBIDDEN,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::History(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Validation(err) => {
                tracing::debug!("Rejected pipeline request: {}", err);
                err.to_string()
            }
            ApiError::NotFound(msg) => msg,
            ApiError::History(err) => {
                tracing::error!("History error: {:#}", err);
                "Internal server error".to_string()
            }
        };

        (status, Json(serde_json::json!({ "ok": false, "error": message }))).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
