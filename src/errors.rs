//! Central error taxonomy for the wallet pool.
//!
//! Every fallible operation returns [`PoolError`]. The category decides
//! whether the retry layer tries again. Validation errors are raised
//! before any network call and simulation rejections carry the program logs so callers can show why the
//! transaction would fail.

use thiserror::Error;

/// High-level error categories for logging and retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network/RPC/HTTP errors, retried with backoff
    Network,
    /// Bad settings or missing keys
    Configuration,
    /// Caller input rejected before any network call
    Validation,
    /// Transaction rejected by pre-submission simulation
    Simulation,
    /// Signing, building or confirmation errors
    Transaction,
    /// Local persistence errors
    Storage,
}

impl ErrorCategory {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Simulation => "simulation",
            ErrorCategory::Transaction => "transaction",
            ErrorCategory::Storage => "storage",
        }
    }
}

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Network error: {message}")]
    Network {
        message: String,
        status: Option<u16>,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Simulation failed: {reason}; logs: {}", .logs.join(" | "))]
    Simulation { reason: String, logs: Vec<String> },

    #[error("Transaction error: {message}")]
    Transaction { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl PoolError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PoolError::Network { .. } => ErrorCategory::Network,
            PoolError::Configuration { .. } => ErrorCategory::Configuration,
            PoolError::Validation { .. } => ErrorCategory::Validation,
            PoolError::Simulation { .. } => ErrorCategory::Simulation,
            PoolError::Transaction { .. } => ErrorCategory::Transaction,
            PoolError::Storage { .. } => ErrorCategory::Storage,
        }
    }

    /// Network and confirmation failures are worth another attempt. A
    /// transaction the simulator rejects will be rejected again.
    pub fn is_transient(&self) -> bool {
        match self {
            // 4xx other than rate limiting means the request itself is wrong
            PoolError::Network { status: Some(code), .. } => *code == 429 || *code >= 500,
            PoolError::Network { .. } | PoolError::Transaction { .. } => true,
            _ => false,
        }
    }

    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
            status: None,
        }
    }

    pub fn http_status<S: Into<String>>(status: u16, message: S) -> Self {
        Self::Network {
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn simulation<S: Into<String>>(reason: S, logs: Vec<String>) -> Self {
        Self::Simulation {
            reason: reason.into(),
            logs,
        }
    }

    pub fn transaction<S: Into<String>>(message: S) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// HTTP status of a failed request, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            PoolError::Network { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for PoolError {
    fn from(e: reqwest::Error) -> Self {
        PoolError::Network {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

impl From<solana_client::client_error::ClientError> for PoolError {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        PoolError::network(e.to_string())
    }
}

impl From<serde_json::Error> for PoolError {
    fn from(e: serde_json::Error) -> Self {
        PoolError::storage(format!("json: {}", e))
    }
}

impl From<std::io::Error> for PoolError {
    fn from(e: std::io::Error) -> Self {
        PoolError::storage(e.to_string())
    }
}

pub type PoolResult<T> = std::result::Result<T, PoolError>;
