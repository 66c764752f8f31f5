//! HTTP error mapping for the distribution core taxonomy

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use distribution_core::Error as CoreError;
use serde_json::json;
use thiserror::Error;

/// Gateway-level errors
#[derive(Error, Debug)]
pub enum ApiError {
    /// Error surfaced by the distribution core
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Request declared a content type the intake cannot accept
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Core(CoreError::TransactionNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Core(CoreError::DistributionNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Core(CoreError::Storage(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::UnsupportedContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.to_string(),
        }))
    }
}
