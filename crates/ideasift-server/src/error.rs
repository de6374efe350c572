//! Error handling for the REST API server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ideasift_core::error::SiftError;
use serde::Serialize;
use std::fmt;

/// API error type.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.status, self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code,
                message: self.message,
                suggestion: self.suggestion,
            },
        };

        (self.status, Json(body)).into_response()
    }
}

// Convert from ideasift-core errors, keeping the structured code.
impl From<SiftError> for ApiError {
    fn from(err: SiftError) -> Self {
        let code = err.code().as_str();
        let suggestion = err.suggestion().map(str::to_string);
        let message = err.to_string();

        let status = match &err {
            SiftError::Validation { .. } | SiftError::Parse { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            SiftError::NotFound { .. } => StatusCode::NOT_FOUND,
            SiftError::InvalidTransition { .. } => StatusCode::CONFLICT,
            SiftError::Configuration(_) => StatusCode::BAD_REQUEST,
            SiftError::Database { .. }
            | SiftError::Io(_)
            | SiftError::Serialization(_)
            | SiftError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let api = ApiError::new(status, code, message);
        match suggestion {
            Some(s) => api.with_suggestion(s),
            None => api,
        }
    }
}

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_core_errors_to_status() {
        let api: ApiError = SiftError::experiment_not_found("x").into();
        assert_eq!(api.status, StatusCode::NOT_FOUND);
        assert_eq!(api.code, "NF_002");

        let api: ApiError = SiftError::invalid_transition("paused", "completed").into();
        assert_eq!(api.status, StatusCode::CONFLICT);
        assert!(api.suggestion.is_some());

        let api: ApiError = SiftError::database("down").into();
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
