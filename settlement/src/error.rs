//! Error types for merchant settlement

use serde::Serialize;
use thiserror::Error;

/// Result type for settlement operations
pub type Result<T> = std::result::Result<T, Error>;

/// Settlement errors
#[derive(Error, Debug)]
pub enum Error {
    /// Directory service returned a failure or could not be reached
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Directory service answered with a non-success status
    #[error("Directory service returned {status_code} for {url}")]
    Status {
        /// HTTP status code
        status_code: u16,
        /// Requested URL
        url: String,
    },

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Fetch did not complete in time
    #[error("Timeout after {millis}ms: {operation}")]
    Timeout {
        /// Timeout duration in milliseconds
        millis: u64,
        /// Operation
        operation: String,
    },

    /// Malformed or missing merchant data
    #[error("Validation error: {0}")]
    Validation(String),

    /// Export file could not be written
    #[error("Export error: {0}")]
    Export(String),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Run was cancelled before completion
    #[error("Settlement run cancelled")]
    Cancelled,

    /// Processing of a single merchant failed
    #[error("Merchant {merchant_id}: {source}")]
    Merchant {
        /// Merchant whose processing failed
        merchant_id: String,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Network or service failure
    Fetch,
    /// Malformed merchant or discount data
    Validation,
    /// Export sink failure
    Export,
    /// Bad configuration
    Config,
    /// Run cancelled
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Fetch => "fetch",
            ErrorKind::Validation => "validation",
            ErrorKind::Export => "export",
            ErrorKind::Config => "config",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Fetch(_) | Error::Status { .. } | Error::Http(_) | Error::Timeout { .. } => {
                ErrorKind::Fetch
            }
            Error::Validation(_) => ErrorKind::Validation,
            Error::Export(_) | Error::Csv(_) | Error::Io(_) => ErrorKind::Export,
            Error::Config(_) => ErrorKind::Config,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Merchant { source, .. } => source.kind(),
        }
    }

    /// Whether a retry could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Status { status_code, .. } => *status_code >= 500 || *status_code == 429,
            Error::Merchant { source, .. } => source.is_retryable(),
            other => other.kind() == ErrorKind::Fetch,
        }
    }

    pub(crate) fn for_merchant(self, merchant_id: impl Into<String>) -> Self {
        Error::Merchant {
            merchant_id: merchant_id.into(),
            source: Box::new(self),
        }
    }
}
