//! Error types for the ETL core
//!
//! The taxonomy separates failures by how the pipeline reacts to them:
//! transient upstream errors are retried, permanent ones escalate
//! immediately, validation errors are counted per record and never abort
//! the run on their own.

use thiserror::Error;

/// Result type alias for ETL operations
pub type Result<T> = std::result::Result<T, EtlError>;

/// How a failure is expected to behave under retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Expected to succeed on retry (timeouts, connection errors, 5xx)
    Transient,
    /// Will not succeed on retry (4xx, malformed payloads)
    Permanent,
}

/// Error type for ETL pipeline operations
#[derive(Error, Debug)]
pub enum EtlError {
    /// Retryable upstream failure (timeout, connection error, 5xx)
    #[error("transient upstream error: {0}")]
    Transient(String),

    /// Non-retryable upstream failure (4xx, malformed response)
    #[error("permanent upstream error: {0}")]
    Permanent(String),

    /// Retry budget exhausted for an operation
    #[error("gave up after {attempts} attempts: {cause}")]
    GiveUp { attempts: u32, cause: String },

    /// A listing page could not be fetched; fatal to the run
    #[error("failed to fetch page {page}: {source}")]
    PageFetch {
        page: u32,
        #[source]
        source: Box<EtlError>,
    },

    /// The run was stopped by an explicit cancel signal
    #[error("run cancelled")]
    Cancelled,

    /// A run is already active; only one run may execute at a time
    #[error("an ETL run is already in progress")]
    AlreadyRunning,

    /// Run-wide record error threshold exceeded
    #[error("record error threshold exceeded ({errors} errors)")]
    TooManyRecordErrors { errors: u64 },

    /// Configuration is missing or invalid
    #[error("configuration error: {0}")]
    Config(String),
}

impl EtlError {
    /// Create a transient error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create a permanent error
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Retry classification of this error, if it is an I/O failure
    ///
    /// Returns `None` for errors that are not subject to retry at all
    /// (cancellation, exhausted budgets, configuration problems).
    pub fn class(&self) -> Option<FailureClass> {
        match self {
            EtlError::Transient(_) => Some(FailureClass::Transient),
            EtlError::Permanent(_) => Some(FailureClass::Permanent),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for EtlError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            if status.is_server_error() {
                return EtlError::Transient(format!("HTTP {}: {}", status, err));
            }
            return EtlError::Permanent(format!("HTTP {}: {}", status, err));
        }

        if err.is_timeout() || err.is_connect() {
            EtlError::Transient(err.to_string())
        } else if err.is_decode() {
            EtlError::Permanent(format!("malformed response: {}", err))
        } else {
            EtlError::Transient(err.to_string())
        }
    }
}

/// Per-record validation failure during normalization
///
/// Never aborts the run: the coordinator counts it, logs a warning, and
/// excludes the record from the batch stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field (identifier, name, category) is absent or has the
    /// wrong type
    #[error("missing required field '{0}'")]
    MissingField(String),

    /// The timestamp field is neither epoch milliseconds nor a parsable
    /// ISO-8601 string
    #[error("unparsable timestamp: {0}")]
    BadTimestamp(String),

    /// The relation list is neither a string nor a sequence of strings
    #[error("unexpected relation list shape: {0}")]
    BadRelationList(String),
}
