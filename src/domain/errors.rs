//! Domain error types
//!
//! This module defines the error hierarchy for quip-export. All errors are
//! domain-specific and don't expose third-party types, so the error handler
//! can classify them from their rendered message alone.

use thiserror::Error;

/// Main quip-export error type
///
/// This is the primary error type used throughout the crate. Collaborators
/// (discovery, exporter, writer) report failures through it, and the
/// [`ErrorHandler`](crate::core::resilience::ErrorHandler) categorizes them.
#[derive(Debug, Error)]
pub enum QuipError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Network/connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Remote API throttled the request
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    /// Client error (4xx)
    #[error("Client error: {status} - {message}")]
    Client { status: u16, message: String },

    /// Request or operation timeout
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Call rejected by an open circuit breaker
    #[error("Service unavailable: circuit breaker '{0}' is open")]
    ServiceUnavailable(String),

    /// Export session state errors
    #[error("State management error: {0}")]
    State(String),

    /// Batch execution errors
    #[error("Batch processing error: {0}")]
    Batch(String),

    /// Export process errors
    #[error("Export error: {0}")]
    Export(String),

    /// Operation cancelled by the operator
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl QuipError {
    /// Short, stable name of the error variant
    ///
    /// Used alongside the message when classifying errors.
    pub fn kind(&self) -> &'static str {
        match self {
            QuipError::Configuration(_) => "ConfigurationError",
            QuipError::Validation(_) => "ValidationError",
            QuipError::Authentication(_) => "AuthenticationError",
            QuipError::Connection(_) => "NetworkError",
            QuipError::RateLimited(_) => "RateLimitError",
            QuipError::Server { .. } => "ServerError",
            // throttling reported as a plain 4xx is still throttling
            QuipError::Client { status: 429, .. } => "RateLimitError",
            QuipError::Client { .. } => "ClientError",
            QuipError::Timeout(_) => "TimeoutError",
            QuipError::Io(_) => "FileSystemError",
            QuipError::Serialization(_) => "SerializationError",
            QuipError::ServiceUnavailable(_) => "ServiceUnavailableError",
            QuipError::State(_) => "StateError",
            QuipError::Batch(_) => "BatchError",
            QuipError::Export(_) => "ExportError",
            QuipError::Cancelled(_) => "CancelledError",
            QuipError::Other(_) => "Error",
        }
    }

    /// Returns true if the error came from an open circuit breaker
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, QuipError::ServiceUnavailable(_))
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for QuipError {
    fn from(err: std::io::Error) -> Self {
        QuipError::Io(format!("{} ({:?})", err, err.kind()))
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for QuipError {
    fn from(err: serde_json::Error) -> Self {
        QuipError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for QuipError {
    fn from(err: toml::de::Error) -> Self {
        QuipError::Configuration(format!("TOML parse error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quip_error_display() {
        let err = QuipError::Configuration("Invalid config".to_string());
        assert_eq!(err.to_string(), "Configuration error: Invalid config");
    }

    #[test]
    fn test_server_error_display() {
        let err = QuipError::Server {
            status: 503,
            message: "Service Unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "Server error: 503 - Service Unavailable");
        assert_eq!(err.kind(), "ServerError");
    }

    #[test]
    fn test_client_429_reports_rate_limit_kind() {
        let throttled = QuipError::Client {
            status: 429,
            message: "Too Many Requests".to_string(),
        };
        assert_eq!(throttled.kind(), "RateLimitError");

        let missing = QuipError::Client {
            status: 404,
            message: "Not Found".to_string(),
        };
        assert_eq!(missing.kind(), "ClientError");
    }

    #[test]
    fn test_circuit_open_error() {
        let err = QuipError::ServiceUnavailable("document-export".to_string());
        assert!(err.is_circuit_open());
        assert!(err.to_string().contains("document-export"));
        assert!(!QuipError::Other("x".to_string()).is_circuit_open());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: QuipError = io_err.into();
        assert!(matches!(err, QuipError::Io(_)));
        assert!(err.to_string().contains("NotFound"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: QuipError = json_err.into();
        assert!(matches!(err, QuipError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: QuipError = toml_err.into();
        assert!(matches!(err, QuipError::Configuration(_)));
        assert!(err.to_string().contains("TOML parse error"));
    }

    #[test]
    fn test_quip_error_implements_std_error() {
        let err = QuipError::Validation("Test error".to_string());
        let _: &dyn std::error::Error = &err;
    }
}
