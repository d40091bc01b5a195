//! Service error types with HTTP status code mapping.
//!
//! [`ServiceError`] is the central error type for request-level failures.
//! Each variant maps to a specific HTTP status code and structured JSON
//! error response. Per-document failures inside the vision pipeline are
//! not errors at this level: they are reported as a failed
//! [`crate::domain::DocumentProcessingResult`] carrying an [`ErrorCode`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::DocumentType;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1002,
///     "message": "unsupported document type: parking_ticket",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see [`ServiceError`] code ranges).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Failure taxonomy attached to failed processing results and metrics.
///
/// Serialized as `SCREAMING_SNAKE_CASE` (e.g. `"PARSE_FAILED"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The model reply could not be turned into usable structured data.
    ParseFailed,
    /// The vision model call exceeded its time budget.
    UpstreamTimeout,
    /// The vision provider rejected the call with a rate limit.
    UpstreamRateLimited,
    /// Any other vision provider failure (transport, 5xx, bad body).
    UpstreamError,
    /// No processor is registered for the requested document type.
    UnsupportedDocumentType,
    /// The uploaded image was empty, too large, or not an image.
    InvalidImage,
}

impl ErrorCode {
    /// Returns the wire representation of the code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ParseFailed => "PARSE_FAILED",
            Self::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            Self::UpstreamRateLimited => "UPSTREAM_RATE_LIMITED",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::UnsupportedDocumentType => "UNSUPPORTED_DOCUMENT_TYPE",
            Self::InvalidImage => "INVALID_IMAGE",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                   |
/// |-----------|-----------------|-------------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request / 413         |
/// | 2000–2999 | Registry        | 404 Not Found / 409 Conflict  |
/// | 3000–3999 | Server          | 500 Internal Server Error     |
/// | 5000–5999 | Upstream vision | 504 / 429 / 502               |
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown document type string.
    #[error("unsupported document type: {0}")]
    UnsupportedDocumentType(String),

    /// Image payload could not be decoded or is not an image.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Batch exceeds the configured maximum number of items.
    #[error("batch too large: {size} items (max {max})")]
    BatchTooLarge {
        /// Number of items submitted.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// No processor is registered for the document type.
    #[error("no processor registered for {0}")]
    ProcessorNotFound(DocumentType),

    /// A processor is already registered for the document type.
    #[error("processor already registered for {0}")]
    ProcessorAlreadyRegistered(DocumentType),

    /// Vision model call timed out.
    #[error("vision model timed out after {timeout_ms} ms")]
    UpstreamTimeout {
        /// Budget that was exceeded.
        timeout_ms: u64,
    },

    /// Vision provider rate limited the request.
    #[error("vision model rate limited")]
    UpstreamRateLimited,

    /// Vision provider failed.
    #[error("vision model error: {0}")]
    Upstream(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::UnsupportedDocumentType(_) => 1002,
            Self::InvalidImage(_) => 1003,
            Self::BatchTooLarge { .. } => 1004,
            Self::ProcessorNotFound(_) => 2001,
            Self::ProcessorAlreadyRegistered(_) => 2002,
            Self::Internal(_) => 3000,
            Self::UpstreamTimeout { .. } => 5001,
            Self::UpstreamRateLimited => 5002,
            Self::Upstream(_) => 5003,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::UnsupportedDocumentType(_) | Self::InvalidImage(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::BatchTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::ProcessorNotFound(_) => StatusCode::NOT_FOUND,
            Self::ProcessorAlreadyRegistered(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamRateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Returns the processing [`ErrorCode`] this error is reported as, if
    /// it can occur inside the per-document pipeline.
    #[must_use]
    pub const fn processing_code(&self) -> Option<ErrorCode> {
        match self {
            Self::UnsupportedDocumentType(_) | Self::ProcessorNotFound(_) => {
                Some(ErrorCode::UnsupportedDocumentType)
            }
            Self::InvalidImage(_) => Some(ErrorCode::InvalidImage),
            Self::UpstreamTimeout { .. } => Some(ErrorCode::UpstreamTimeout),
            Self::UpstreamRateLimited => Some(ErrorCode::UpstreamRateLimited),
            Self::Upstream(_) => Some(ErrorCode::UpstreamError),
            Self::InvalidRequest(_)
            | Self::BatchTooLarge { .. }
            | Self::ProcessorAlreadyRegistered(_)
            | Self::Internal(_) => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
