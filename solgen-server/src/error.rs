//! API error types with HTTP status code mapping.
//!
//! [`ApiError`] is the error type for every endpoint. Client mistakes become
//! `400 { error }`; everything unexpected becomes `500 { error, details }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Invalid request (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Internal server error (500) with best-effort details.
    #[error("{message}: {details}")]
    Internal { message: String, details: String },
}

impl ApiError {
    pub fn internal(message: impl Into<String>, details: impl ToString) -> Self {
        Self::Internal {
            message: message.into(),
            details: details.to_string(),
        }
    }

    /// Replace the generic message of an internal error.
    pub fn context(self, message: impl Into<String>) -> Self {
        match self {
            Self::Internal { details, .. } => Self::Internal {
                message: message.into(),
                details,
            },
            other => other,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: message,
                    details: None,
                },
            ),
            ApiError::Internal { message, details } => {
                tracing::error!(error = %message, details = %details, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        error: message,
                        details: Some(details),
                    },
                )
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<solgen_core::Error> for ApiError {
    fn from(err: solgen_core::Error) -> Self {
        match err {
            solgen_core::Error::InvalidInput(message) => ApiError::BadRequest(message),
            other => ApiError::internal("Internal server error", other),
        }
    }
}
