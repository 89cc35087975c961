//! Error kinds surfaced by the fleet core and their HTTP mapping.
//!
//! Callers distinguish "nothing to update" from "the store is broken" by
//! matching on [`AppError`] variants, never by inspecting message text.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

// ---

#[derive(Debug, Error)]
pub enum AppError {
    // ---
    /// Missing or malformed input, detected before any store call.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// Uniqueness violation on create.
    #[error("{kind} with {field} '{value}' already exists")]
    Conflict {
        kind: &'static str,
        field: String,
        value: String,
    },

    /// The primary store could not be reached while building a connection.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("unsupported report type '{0}'")]
    UnsupportedReportType(String),

    #[error("store call timed out after {0} ms")]
    Timeout(u64),

    /// Any other failure raised by the underlying store.
    #[error("store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    // ---
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        AppError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        // ---
        match self {
            AppError::Validation(_) | AppError::UnsupportedReportType(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Store(_) | AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Store(err.to_string())
    }
}

/// Uniform response envelope returned by every HTTP operation.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    // ---
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Envelope {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // ---
        let status = self.status_code();
        let message = if status.is_server_error() && !matches!(self, AppError::StoreUnavailable(_)) {
            tracing::error!("request failed: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body: Envelope<()> = Envelope {
            success: false,
            data: None,
            error: Some(message),
        };
        (status, Json(body)).into_response()
    }
}
