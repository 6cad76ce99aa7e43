//! Error types for the book cover server
//!
//! Every handler returns `Result<_, ServerError>`, so each request ends with
//! exactly one response on every path.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bookcover_core::CoverError;
use serde::Serialize;
use shopify_admin::AdminError;
use thiserror::Error;

/// Body of every PDF processing failure
pub const PROCESSING_FAILED: &str = "An error occurred while processing the PDF.";

/// Body of every variant price update failure
pub const PRICE_UPDATE_FAILED: &str = "An error occurred while updating the variant price.";

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("Composition failed: {0}")]
    Composition(#[from] CoverError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Registration not found: {0}")]
    RegistrationNotFound(String),

    #[error("Upstream error: {0}")]
    Upstream(#[from] AdminError),

    #[error("Not configured: {0}")]
    NotConfigured(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::InvalidUpload(_)
            | ServerError::Composition(_)
            | ServerError::Internal(_) => {
                tracing::error!("Error in processing file: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, PROCESSING_FAILED.to_string())
            }
            ServerError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ServerError::RegistrationNotFound(id) => (
                StatusCode::NOT_FOUND,
                format!("Registration '{}' not found", id),
            ),
            ServerError::Upstream(e) => {
                tracing::error!("Error updating variant: {}", e);
                (StatusCode::BAD_GATEWAY, PRICE_UPDATE_FAILED.to_string())
            }
            ServerError::NotConfigured(what) => {
                tracing::error!("Missing configuration: {}", what);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    format!("{} is not configured", what),
                )
            }
        };

        (status, Json(ErrorResponse { message })).into_response()
    }
}
