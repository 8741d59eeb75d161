//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service, along with its
//! mapping onto the wire format every error response shares:
//! `{"statusCode": ..., "error": ..., "message": ...}`.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use forum_core::PortError;
use serde_json::{json, Value};
use tracing::error;

use crate::config::ConfigError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request carried no valid session token.
    #[error("Missing or invalid session token")]
    Unauthorized,

    /// The Google ID token failed verification.
    #[error("Google ID token verification failed")]
    GoogleAuthFailed,

    /// The authenticated user does not own the entity they tried to modify.
    #[error("Caller does not own the target entity")]
    Forbidden,

    /// A request referenced an entity that does not exist. `field` names the
    /// request field that carried the id.
    #[error("{kind} referenced by `{field}` not found")]
    EntityNotFound { field: String, kind: &'static str },

    /// An answer was posted to a closed question.
    #[error("Question is closed")]
    QuestionClosed,

    /// The `answerRef` of a ref-based answer listing did not resolve.
    #[error("Answer reference not found")]
    AnswerRefNotFound,

    /// The request body or query failed validation. Maps each offending
    /// field to its constraint message.
    #[error("Request validation failed")]
    Validation(BTreeMap<String, String>),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    /// A validation failure on a single field.
    pub fn validation(field: &str, message: &str) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(field.to_string(), message.to_string());
        ApiError::Validation(fields)
    }

    /// The status code and JSON body this error maps to on the wire.
    pub fn status_and_body(&self) -> (StatusCode, Value) {
        match self {
            ApiError::Validation(fields) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                envelope(422, "Validation error", json!(fields)),
            ),
            ApiError::EntityNotFound { field, kind } => (
                StatusCode::BAD_REQUEST,
                envelope(
                    400,
                    "Validation error",
                    json!({ field.as_str(): format!("{kind} not found") }),
                ),
            ),
            ApiError::QuestionClosed => (
                StatusCode::BAD_REQUEST,
                envelope(
                    400,
                    "Validation error",
                    json!({ "questionId": "question is closed and does not accept new answers" }),
                ),
            ),
            ApiError::AnswerRefNotFound => (
                StatusCode::BAD_REQUEST,
                envelope(400, "Validation error", json!({ "answerRef": "answer not found" })),
            ),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                envelope(
                    401,
                    "Unauthorized",
                    json!("You must be logged in to perform this action"),
                ),
            ),
            ApiError::GoogleAuthFailed => (
                StatusCode::UNAUTHORIZED,
                envelope(
                    401,
                    "Unauthorized",
                    json!("Authentication failed. Log in with Google again to retry"),
                ),
            ),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                envelope(
                    403,
                    "Unauthorized",
                    json!("You do not have the required permissions to perform this action"),
                ),
            ),
            ApiError::Config(_)
            | ApiError::Port(_)
            | ApiError::Database(_)
            | ApiError::Io(_)
            | ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                envelope(
                    500,
                    "Internal server error",
                    json!("An unexpected error occurred. Please try again later"),
                ),
            ),
        }
    }
}

fn envelope(status: u16, error: &str, message: Value) -> Value {
    json!({
        "statusCode": status,
        "error": error,
        "message": message,
    })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        if status.is_server_error() {
            error!("Request failed: {:?}", self);
        }
        (status, Json(body)).into_response()
    }
}
