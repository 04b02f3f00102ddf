//! # Error Handling Module
//!
//! Every failure the gateway can produce is a variant of [`GatewayError`]. Startup
//! failures (bad configuration, an empty signing secret) are returned from the
//! constructors and stop the process; per-request failures are turned into HTTP
//! responses at the pipeline boundary through the [`IntoResponse`] implementation
//! below, so one bad request never affects another.
//!
//! | Variant | HTTP status |
//! |---|---|
//! | `Configuration` | 500 (never reaches a client, fatal at startup) |
//! | `BadRequest` | 400 |
//! | `Authentication` | 401 |
//! | `RouteNotFound` | 404 |
//! | `BadGateway` | 502 |
//! | `GatewayTimeout` | 504 |

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::auth::providers::AuthError;

/// Main result type used throughout the gateway
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error types for the gateway
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    /// Invalid configuration detected while building the gateway
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The request path cannot be matched safely (dot segments, encoded separators)
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// The authentication gate rejected the request
    #[error("Authentication failed: {0}")]
    Authentication(#[from] AuthError),

    /// No route predicate matched the request path
    #[error("No route matches path: {path}")]
    RouteNotFound { path: String },

    /// The backend could not be reached (refused, DNS failure, reset)
    #[error("Bad gateway: route '{route}' - {reason}")]
    BadGateway { route: String, reason: String },

    /// The backend did not answer within the response timeout
    #[error("Gateway timeout: route '{route}' did not respond within {timeout_ms}ms")]
    GatewayTimeout { route: String, timeout_ms: u64 },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },

    /// I/O errors (config file, listener bind)
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl GatewayError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a bad request error with a custom message
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a route-not-found error for the given path
    pub fn route_not_found<S: Into<String>>(path: S) -> Self {
        Self::RouteNotFound { path: path.into() }
    }

    /// Create a bad gateway error for a route
    pub fn bad_gateway<R: Into<String>, S: Into<String>>(route: R, reason: S) -> Self {
        Self::BadGateway {
            route: route.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the HTTP status code returned to clients for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            Self::GatewayTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a string representation of the error type for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::BadRequest { .. } => "bad_request",
            Self::Authentication(_) => "authentication_error",
            Self::RouteNotFound { .. } => "route_not_found",
            Self::BadGateway { .. } => "bad_gateway",
            Self::GatewayTimeout { .. } => "gateway_timeout",
            Self::Internal { .. } => "internal_error",
            Self::Io { .. } => "io_error",
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// Converts the error into a JSON body with the mapped status code.
///
/// 401 responses also carry a `WWW-Authenticate` challenge; a presented but
/// unusable token is flagged with `error="invalid_token"`.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_response = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });

        let mut response = (status, Json(error_response)).into_response();

        if let Self::Authentication(reason) = &self {
            let challenge = match reason {
                AuthError::MissingToken => HeaderValue::from_static("Bearer"),
                _ => HeaderValue::from_static("Bearer error=\"invalid_token\""),
            };
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, challenge);
        }

        response
    }
}
