//! Error types for the scanner
//!
//! Provides unified error handling using thiserror. None of these errors
//! escape a scan: cache errors degrade to "no caching", scanner errors are
//! recorded against the unit that produced them.

use thiserror::Error;

// == Cache Error Enum ==
/// Failures raised by a cache backend or by the entry codec.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Underlying storage could not be read or written
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry or payload could not be encoded/decoded
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Entry was written by an incompatible envelope version
    #[error("Cache entry version {found} does not match expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    /// Entry found under a key it was not written for
    #[error("Cache entry key mismatch: expected {expected}, found {found}")]
    KeyMismatch { expected: String, found: String },

    /// Backend is not usable at all
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

// == Scanner Error Enum ==
/// Failure surfaced by a service or tag-discovery scanner.
///
/// Retrying transient failures is the scanner's business; once one of these
/// reaches the coordinators it is terminal for that unit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScannerError {
    /// Remote API returned an error response
    #[error("Remote error {code}: {message}")]
    Remote { code: String, message: String },

    /// Remote API throttled the caller
    #[error("Throttled: {0}")]
    Throttled(String),

    /// Remote call did not answer in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Session could not authenticate
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl ScannerError {
    /// Builds a [`ScannerError::Remote`] from an error code and message.
    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Returns true for failures a scanner could reasonably retry.
    pub fn is_transient(&self) -> bool {
        match self {
            ScannerError::Throttled(_) | ScannerError::Timeout(_) => true,
            ScannerError::Remote { code, .. } => matches!(
                code.as_str(),
                "Throttling" | "ThrottlingException" | "RequestLimitExceeded" | "ServiceUnavailable"
            ),
            ScannerError::Credentials(_) | ScannerError::Other(_) => false,
        }
    }
}

// == Config Error Enum ==
/// Invalid configuration value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: String, value: String },
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
