//! # Error Handling
//!
//! HTTP-facing error type and the JSON envelope every failure is reported in:
//!
//! ```json
//! {"error": {"type": "decode_error", "message": "...", "timestamp": "..."}}
//! ```
//!
//! Pipeline failures additionally carry `stage` and, for per-segment
//! failures, `segment_index`.
//!
//! ## Status Mapping:
//! - **400**: malformed requests, empty or unsupported uploads
//! - **404**: unknown routes
//! - **500**: decode, encode and provider failures
//! - **504**: a provider call that exceeded the unit timeout

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

use crate::pipeline::PipelineError;

/// Errors returned by request handlers.
#[derive(Debug)]
pub enum AppError {
    /// Client sent an unusable request (wrong content type, missing field, ...)
    BadRequest(String),

    NotFound(String),

    /// A pipeline run failed; status depends on the stage
    Pipeline(PipelineError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Pipeline(err) => write!(f, "Pipeline error: {}", err),
        }
    }
}

impl AppError {
    /// Machine-readable `type` field of the envelope.
    fn error_type(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::Pipeline(err) => match err {
                PipelineError::EmptyInput => "empty_input",
                PipelineError::UnsupportedFormat { .. } => "unsupported_format",
                PipelineError::Decode(_) => "decode_error",
                PipelineError::Encode { .. } => "encode_error",
                PipelineError::Provider { .. } if err.is_timeout() => "provider_timeout",
                PipelineError::Provider { .. } => "provider_error",
            },
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::BadRequest(msg) | AppError::NotFound(msg) => msg.clone(),
            AppError::Pipeline(err) => err.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Pipeline(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            AppError::Pipeline(err) if err.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            AppError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut body = json!({
            "type": self.error_type(),
            "message": self.message(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        if let AppError::Pipeline(err) = self {
            body["stage"] = json!(err.stage());
            if let Some(index) = err.segment_index() {
                body["segment_index"] = json!(index);
            }
        }

        HttpResponse::build(self.status_code()).json(json!({ "error": body }))
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::Pipeline(err)
    }
}

/// Handler result alias.
pub type AppResult<T> = Result<T, AppError>;
