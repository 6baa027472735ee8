//! Relay error types with HTTP status code mapping.
//!
//! [`RelayError`] is the central error type for both the server and the
//! client. Variants that can surface during the upgrade handshake map to
//! an HTTP status code and a structured JSON error response; the rest
//! stay inside a single session or a single client call.

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::ConnectionId;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "admission denied: incorrect password"
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
    /// Numeric error code (see code ranges on [`RelayError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
}

/// Error enum shared by the relay server and client.
///
/// # Error Code Ranges
///
/// | Range     | Category           | HTTP Status                    |
/// |-----------|--------------------|--------------------------------|
/// | 1000–1999 | Admission / input  | 400 Bad Request / 401          |
/// | 2000–2999 | Connection state   | 409 Conflict / 502 Bad Gateway |
/// | 3000–3999 | Server / transport | 500 Internal Server Error      |
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The supplied `pwd` did not match the room secret.
    #[error("admission denied: incorrect password")]
    AdmissionDenied,

    /// Client called `send`/`receive` before `register`.
    #[error("websocket connection is not established, register first")]
    NotConnected,

    /// Client-side transport failure while sending or receiving.
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    /// The client could not reach the server, or the server hit a read or
    /// write failure on an established connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// A connection with the same identity is already registered.
    #[error("connection {0} is already registered")]
    AlreadyRegistered(ConnectionId),

    /// The listen address could not be bound.
    #[error("cannot listen on {addr}: {source}")]
    ListenFailure {
        /// Address the server tried to bind.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Server URL could not be parsed or turned into a handshake request.
    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    /// A configuration value could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RelayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::AdmissionDenied => 1001,
            Self::InvalidUrl(_) => 1002,
            Self::InvalidConfig(_) => 1003,
            Self::NotConnected => 2001,
            Self::DeliveryFailed(_) => 2002,
            Self::AlreadyRegistered(_) => 2003,
            Self::ListenFailure { .. } => 3001,
            Self::Transport(_) => 3002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::AdmissionDenied => StatusCode::UNAUTHORIZED,
            Self::InvalidUrl(_) | Self::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            Self::AlreadyRegistered(_) => StatusCode::CONFLICT,
            Self::NotConnected | Self::DeliveryFailed(_) => StatusCode::BAD_GATEWAY,
            Self::ListenFailure { .. } | Self::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` if the caller can recover by registering first.
    #[must_use]
    pub const fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected)
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
