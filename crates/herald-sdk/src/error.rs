//! # SDK Error Types
//!
//! Errors surfaced to the host application.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SDK Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Network      │  │ Classification  │  │     Persistence         │ │
//! │  │  (retryable)    │  │ (deterministic) │  │  (attempt aborted)      │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Network        │  │  Classification │  │  Persistence            │ │
//! │  │  Timeout        │  │                 │  │                         │ │
//! │  │  Unexpected...  │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐  │
//! │  │  Configuration  │  │              Internal                       │  │
//! │  │                 │  │                                             │  │
//! │  │  InvalidConfig  │  │  NotRegistered   ShuttingDown               │  │
//! │  │  MissingCreds   │  │  Validation      Internal                   │  │
//! │  │  InvalidUrl     │  │                                             │  │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No error is fatal: a failed registration step leaves the state where it
//! was, a failed flush keeps the metrics queue, a bad payload is reported.

use thiserror::Error;

use herald_core::{CoreError, PayloadError, ValidationError};

use crate::client::SyncFailure;

/// Result type alias for SDK operations.
pub type SdkResult<T> = Result<T, SdkError>;

/// SDK error type.
#[derive(Debug, Error)]
pub enum SdkError {
    // =========================================================================
    // Network Errors
    // =========================================================================
    /// Transport failure or non-success response from a backend.
    ///
    /// ## When This Occurs
    /// - Connection refused, DNS failure, TLS failure (`status` is `None`)
    /// - Any response outside the 2xx class (`status` is the HTTP code)
    #[error("Network error{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Network {
        status: Option<u16>,
        message: String,
    },

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// A 2xx response whose body lacks what the step needs.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    // =========================================================================
    // Classification Errors
    // =========================================================================
    /// Push payload carries SDK data but is malformed.
    #[error("Malformed push payload: {0}")]
    Classification(#[from] PayloadError),

    // =========================================================================
    // Persistence Errors
    // =========================================================================
    /// Local store read or write failed.
    #[error("Local store error: {0}")]
    Persistence(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid SDK configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// App id or secret missing.
    #[error("App credentials not configured. Call initialize with an app id and secret.")]
    MissingCredentials,

    /// Invalid backend URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Operation needs a device id, but registration hasn't produced one.
    #[error("Device is not registered yet")]
    NotRegistered,

    /// Engine is shutting down.
    #[error("Engine is shutting down")]
    ShuttingDown,

    /// Invalid caller input (metric values, action ids).
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// Record rule violation.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SdkError {
    /// Creates a Network error.
    pub fn network(status: Option<u16>, message: impl Into<String>) -> Self {
        SdkError::Network {
            status,
            message: message.into(),
        }
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<herald_db::DbError> for SdkError {
    fn from(err: herald_db::DbError) -> Self {
        SdkError::Persistence(err.to_string())
    }
}

impl From<CoreError> for SdkError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Payload(e) => SdkError::Classification(e),
            CoreError::Validation(e) => SdkError::Validation(e),
            other => SdkError::Internal(other.to_string()),
        }
    }
}

impl From<SyncFailure> for SdkError {
    fn from(failure: SyncFailure) -> Self {
        if failure.timed_out {
            return SdkError::Timeout(failure.timeout_secs);
        }
        SdkError::Network {
            status: failure.status,
            message: failure.message,
        }
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::UnexpectedResponse(err.to_string())
    }
}

impl From<url::ParseError> for SdkError {
    fn from(err: url::ParseError) -> Self {
        SdkError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SdkError {
    fn from(err: reqwest::Error) -> Self {
        SdkError::Network {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for SdkError {
    fn from(err: std::io::Error) -> Self {
        SdkError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SdkError {
    fn from(err: toml::de::Error) -> Self {
        SdkError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SdkError {
    fn from(err: toml::ser::Error) -> Self {
        SdkError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SdkError {
    /// Returns true if the next natural trigger may succeed.
    ///
    /// ## Retryable Errors
    /// - Network failures and non-2xx responses
    /// - Timeouts
    /// - Unexpected response bodies
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SdkError::Network { .. } | SdkError::Timeout(_) | SdkError::UnexpectedResponse(_)
        )
    }

    /// Returns true for a malformed push payload.
    pub fn is_classification_error(&self) -> bool {
        matches!(self, SdkError::Classification(_))
    }

    /// Returns true for a local store failure.
    pub fn is_persistence_error(&self) -> bool {
        matches!(self, SdkError::Persistence(_))
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SdkError::InvalidConfig(_)
                | SdkError::MissingCredentials
                | SdkError::InvalidUrl(_)
                | SdkError::ConfigLoadFailed(_)
                | SdkError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SdkError::network(Some(503), "unavailable").is_retryable());
        assert!(SdkError::network(None, "connection refused").is_retryable());
        assert!(SdkError::Timeout(30).is_retryable());
        assert!(SdkError::UnexpectedResponse("no device_id".into()).is_retryable());

        assert!(!SdkError::Classification(PayloadError::missing("type")).is_retryable());
        assert!(!SdkError::Persistence("disk full".into()).is_retryable());
        assert!(!SdkError::MissingCredentials.is_retryable());
    }

    #[test]
    fn test_categories() {
        assert!(SdkError::Classification(PayloadError::missing("type")).is_classification_error());
        assert!(SdkError::from(herald_db::DbError::PoolExhausted).is_persistence_error());
        assert!(SdkError::InvalidUrl("ftp://x".into()).is_config_error());
        assert!(!SdkError::NotRegistered.is_config_error());
    }

    #[test]
    fn test_network_display_includes_status() {
        assert_eq!(
            SdkError::network(Some(500), "boom").to_string(),
            "Network error (status 500): boom"
        );
        assert_eq!(SdkError::network(None, "boom").to_string(), "Network error: boom");
    }

    #[test]
    fn test_sync_failure_conversion() {
        let timeout = SyncFailure::timeout(30);
        assert!(matches!(SdkError::from(timeout), SdkError::Timeout(30)));

        let failure = SyncFailure::status(404, "not found", None);
        assert!(matches!(
            SdkError::from(failure),
            SdkError::Network { status: Some(404), .. }
        ));
    }
}
