//! # Error Handling Module
//!
//! Error types for the relay built on `thiserror`, with the mapping from
//! each failure category to the HTTP status a client sees.
//!
//! Four categories matter at runtime:
//! - configuration errors are detected at startup and are fatal
//! - cache and allow-list transport errors never reach this type at request
//!   time; they are logged and absorbed where they happen
//! - request validation errors become `400` responses
//! - upstream failures become `500` responses
//!
//! Client-visible error bodies use the relay's historical shape,
//! `{"error": "<message>"}`, so that cached error responses and fresh ones are
//! indistinguishable.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main result type used throughout the relay
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error types for the relay
///
/// The `#[error("...")]` attribute provides the `Display` used in logs. The
/// message sent to clients comes from [`GatewayError::client_message`].
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    /// Invalid or missing settings, detected before serving
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A request parameter failed validation or the allow-list check
    #[error("Request validation failed: {field} - {reason}")]
    RequestValidation { field: String, reason: String },

    /// The upstream video API call failed
    #[error("Upstream error: {message}")]
    Upstream { message: String },

    /// Cache backend could not be built or reached during startup
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// Playlist allow-list could not be seeded during startup
    #[error("Allow-list error: {message}")]
    AllowList { message: String },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },

    /// I/O errors (config files, sockets)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },
}

impl GatewayError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a validation error for a named request field
    pub fn validation<F: Into<String>, S: Into<String>>(field: F, reason: S) -> Self {
        Self::RequestValidation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an upstream error
    pub fn upstream<S: Into<String>>(message: S) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RequestValidation { .. } => StatusCode::BAD_REQUEST,
            Self::Json { .. } => StatusCode::BAD_REQUEST,
            Self::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Configuration { .. }
            | Self::Cache { .. }
            | Self::AllowList { .. }
            | Self::Internal { .. }
            | Self::Io { .. }
            | Self::Yaml { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a string representation of the error type for logs
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::RequestValidation { .. } => "request_validation_error",
            Self::Upstream { .. } => "upstream_error",
            Self::Cache { .. } => "cache_error",
            Self::AllowList { .. } => "allowlist_error",
            Self::Internal { .. } => "internal_error",
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "json_error",
            Self::Yaml { .. } => "yaml_error",
        }
    }

    /// Message placed in the `error` field of the response body
    ///
    /// Validation failures report only the reason (`part cannot be empty`),
    /// everything else reports its full display string.
    pub fn client_message(&self) -> String {
        match self {
            Self::RequestValidation { reason, .. } => reason.clone(),
            Self::Upstream { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Body of every error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for GatewayError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream {
            message: err.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.client_message(),
        };

        (status, Json(body)).into_response()
    }
}

/// Convenience macro for creating configuration errors
///
/// Usage: `config_error!("Invalid port: {}", port)`
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::core::error::GatewayError::config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            GatewayError::validation("part", "part cannot be empty").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::upstream("quota exceeded").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::config("missing api_key").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_client_message_uses_reason_for_validation() {
        let err = GatewayError::validation("channelId", "channelId(bad) is invalid");
        assert_eq!(err.client_message(), "channelId(bad) is invalid");
        assert!(err.to_string().contains("channelId"));
    }

    #[tokio::test]
    async fn test_into_response_body_shape() {
        let response = GatewayError::validation("part", "part cannot be empty").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error, "part cannot be empty");
    }

    #[test]
    fn test_config_error_macro() {
        let err = config_error!("port {} is invalid", 0);
        assert_eq!(err.error_type(), "configuration_error");
        assert!(err.to_string().contains("port 0 is invalid"));
    }
}
