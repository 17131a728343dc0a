//! API error types and JSON error response formatting.
//!
//! Every failure is returned as `{ "error": "<message>" }` with a status code
//! chosen from the error kind. Internal details such as exit codes or stack
//! traces never reach the body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use calgpt_bridge::BridgeError;
use calgpt_chat::ChatError;
use calgpt_core::error::CalgptError;

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - malformed body or empty question.
    BadRequest(String),
    /// 404 Not Found - unknown or expired session.
    NotFound(String),
    /// 500 Internal Server Error - the answering process failed.
    Internal(String),
    /// 503 Service Unavailable - no free subprocess slot.
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::Internal(msg)
            | ApiError::ServiceUnavailable(msg) => msg,
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        match &err {
            BridgeError::Saturated => ApiError::ServiceUnavailable(err.client_message()),
            _ => ApiError::Internal(err.client_message()),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match &err {
            ChatError::EmptyMessage => ApiError::BadRequest(err.to_string()),
            ChatError::SessionNotFound(_) => ApiError::NotFound(err.to_string()),
            ChatError::SessionLimit(_) => ApiError::ServiceUnavailable(err.to_string()),
            ChatError::StorageError(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<CalgptError> for ApiError {
    fn from(err: CalgptError) -> Self {
        match err {
            CalgptError::Validation(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
