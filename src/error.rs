use std::fmt;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Main error type for the miner
#[derive(Debug)]
pub enum MinerError {
    /// Configuration or CLI argument errors
    Config(String),

    /// Own hotkey missing from the ledger registration list (fatal at startup)
    Registration(String),

    /// Ledger collaborator errors: unreachable, bad status, malformed response
    Ledger(String),

    /// Counter store errors
    Store(String),

    /// Compression execution errors
    Processing(String),

    /// Compression did not finish within the configured timeout
    ProcessingTimeout(Duration),

    /// API/HTTP related errors
    Api(String),

    /// System I/O errors
    Io(std::io::Error),

    /// JSON serialization/deserialization errors
    Serialization(serde_json::Error),

    /// Internal lock poisoning or concurrency errors
    Concurrency(String),
}

impl fmt::Display for MinerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinerError::Config(msg) => write!(f, "Configuration error: {}", msg),
            MinerError::Registration(msg) => write!(f, "Registration error: {}", msg),
            MinerError::Ledger(msg) => write!(f, "Ledger error: {}", msg),
            MinerError::Store(msg) => write!(f, "Counter store error: {}", msg),
            MinerError::Processing(msg) => write!(f, "Processing error: {}", msg),
            MinerError::ProcessingTimeout(after) => {
                write!(f, "Processing timed out after {}ms", after.as_millis())
            }
            MinerError::Api(msg) => write!(f, "API error: {}", msg),
            MinerError::Io(err) => write!(f, "I/O error: {}", err),
            MinerError::Serialization(err) => write!(f, "Serialization error: {}", err),
            MinerError::Concurrency(msg) => write!(f, "Concurrency error: {}", msg),
        }
    }
}

impl std::error::Error for MinerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MinerError::Io(err) => Some(err),
            MinerError::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

// Convenient type alias for Results using our error type
pub type Result<T> = std::result::Result<T, MinerError>;

impl IntoResponse for MinerError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let error_response = json!({
            "error": {
                "code": status_code.as_u16(),
                "message": self.user_message(),
                "type": self.error_type(),
            }
        });

        (status_code, Json(error_response)).into_response()
    }
}

impl MinerError {
    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            MinerError::Config(_) => StatusCode::BAD_REQUEST,
            MinerError::Registration(_) => StatusCode::SERVICE_UNAVAILABLE,
            MinerError::Ledger(_) => StatusCode::SERVICE_UNAVAILABLE,
            MinerError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            MinerError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MinerError::ProcessingTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            MinerError::Api(_) => StatusCode::BAD_REQUEST,
            MinerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MinerError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MinerError::Concurrency(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            MinerError::Config(msg) => format!("Configuration error: {}", msg),
            MinerError::Registration(_) => "Miner is not registered.".to_string(),
            MinerError::Ledger(_) | MinerError::Store(_) => {
                "Service temporarily unavailable. Please try again later.".to_string()
            }
            MinerError::Processing(msg) => format!("Compression failed: {}", msg),
            MinerError::ProcessingTimeout(_) => "Compression timed out.".to_string(),
            MinerError::Api(msg) => format!("Invalid request: {}", msg),
            MinerError::Io(_) | MinerError::Serialization(_) | MinerError::Concurrency(_) => {
                "Internal server error. Please try again later.".to_string()
            }
        }
    }

    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            MinerError::Config(_) => "configuration_error",
            MinerError::Registration(_) => "registration_error",
            MinerError::Ledger(_) => "ledger_error",
            MinerError::Store(_) => "store_error",
            MinerError::Processing(_) => "processing_error",
            MinerError::ProcessingTimeout(_) => "processing_timeout",
            MinerError::Api(_) => "api_error",
            MinerError::Io(_) => "io_error",
            MinerError::Serialization(_) => "serialization_error",
            MinerError::Concurrency(_) => "concurrency_error",
        }
    }

    /// True for errors that must stop the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, MinerError::Registration(_) | MinerError::Config(_))
    }
}

// Conversions from common error types
impl From<std::io::Error> for MinerError {
    fn from(err: std::io::Error) -> Self {
        MinerError::Io(err)
    }
}

impl From<serde_json::Error> for MinerError {
    fn from(err: serde_json::Error) -> Self {
        MinerError::Serialization(err)
    }
}

impl From<redis::RedisError> for MinerError {
    fn from(err: redis::RedisError) -> Self {
        MinerError::Store(err.to_string())
    }
}

impl From<reqwest::Error> for MinerError {
    fn from(err: reqwest::Error) -> Self {
        MinerError::Ledger(err.to_string())
    }
}

impl From<tokio::task::JoinError> for MinerError {
    fn from(err: tokio::task::JoinError) -> Self {
        MinerError::Processing(format!("worker task failed: {}", err))
    }
}

// Helper macros for common error construction patterns
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::MinerError::Config($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::MinerError::Config(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! ledger_error {
    ($msg:expr) => {
        $crate::error::MinerError::Ledger($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::MinerError::Ledger(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! store_error {
    ($msg:expr) => {
        $crate::error::MinerError::Store($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::MinerError::Store(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! processing_error {
    ($msg:expr) => {
        $crate::error::MinerError::Processing($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::MinerError::Processing(format!($fmt, $($arg)*))
    };
}
