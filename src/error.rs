//! Error types for the HTTP surface and for per-connection duties.
//!
//! [`ServerError`] maps to an HTTP status code and a structured JSON error
//! response. [`ConnectionError`] describes why one client's inbound or
//! outbound duty stopped; it never leaves that connection.

use std::convert::Infallible;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "origin not allowed: http://evil.example",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// HTTP-facing error enum with status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category  | HTTP Status               |
/// |-----------|-----------|---------------------------|
/// | 1000–1999 | Upgrade   | 403 Forbidden             |
/// | 2000–2999 | Not Found | 404 Not Found             |
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The `Origin` header of a WebSocket upgrade is not on the allow-list.
    #[error("origin not allowed: {0}")]
    OriginRejected(String),

    /// No route matches the requested path.
    #[error("not found: {0}")]
    NotFound(String),
}

impl ServerError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::OriginRejected(_) => 1001,
            Self::NotFound(_) => 2001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::OriginRejected(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ServerError {
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

/// Reason a connection duty terminated.
///
/// Every variant is fatal to the affected connection and is never retried.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Read or write failure reported by the WebSocket transport.
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),

    /// An inbound message exceeded the size limit.
    #[error("message of {size} bytes exceeds the {limit}-byte limit")]
    MessageTooLarge {
        /// Size of the offending message in bytes.
        size: usize,
        /// Configured limit in bytes.
        limit: usize,
    },

    /// A binary frame did not carry UTF-8 text.
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Nothing was read from the peer within the idle window.
    #[error("no frame received within {0:?}")]
    IdleTimeout(Duration),

    /// A write did not complete within the write deadline.
    #[error("write did not complete within {0:?}")]
    WriteTimeout(Duration),
}

impl ConnectionError {
    /// Returns `true` for failures worth a warning: protocol violations and
    /// deadline expiries. Plain transport errors usually mean the peer went
    /// away and are logged at debug level.
    #[must_use]
    pub const fn is_anomaly(&self) -> bool {
        !matches!(self, Self::Transport(_))
    }
}

impl From<Infallible> for ConnectionError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}
