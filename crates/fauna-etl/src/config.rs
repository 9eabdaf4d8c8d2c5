//! ETL configuration

use crate::backoff::BackoffPolicy;
use crate::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// ETL Configuration Constants
// ============================================================================

/// Default upstream/sink base URL for local development.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3123";

/// Default timeout for page and detail requests in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default timeout for batch posts in seconds (batches are larger payloads).
pub const DEFAULT_POST_TIMEOUT_SECS: u64 = 60;

/// Largest batch the sink accepts.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Default number of detail fetches in flight at once.
pub const DEFAULT_DETAIL_CONCURRENCY: usize = 4;

/// Default per-subscriber buffer for published log events.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Page fetch retry ceiling. Higher than the detail ceiling so that long
/// upstream pauses of 5-15s are absorbed without failing the run.
pub const DEFAULT_PAGE_MAX_ATTEMPTS: u32 = 8;

/// Detail fetch retry ceiling.
pub const DEFAULT_DETAIL_MAX_ATTEMPTS: u32 = 5;

/// Batch post retry ceiling.
pub const DEFAULT_POST_MAX_ATTEMPTS: u32 = 5;

/// Configuration for one ETL pipeline instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    /// Base URL of the upstream source and sink
    pub base_url: String,

    /// Timeout applied to page and detail requests
    pub request_timeout: Duration,

    /// Timeout applied to batch posts
    pub post_timeout: Duration,

    /// Upper bound on the batch size accepted by `start_run`
    pub max_batch_size: usize,

    /// Detail fetches in flight at once; results are reassembled in
    /// original id order regardless of this value
    pub detail_concurrency: usize,

    /// Backoff for listing page fetches
    pub page_backoff: BackoffPolicy,

    /// Backoff for per-record detail fetches
    pub detail_backoff: BackoffPolicy,

    /// Backoff for batch posts
    pub post_backoff: BackoffPolicy,

    /// Stop the run on the first batch whose delivery gives up
    pub abort_on_batch_failure: bool,

    /// Abort the run once this many records have failed during processing
    /// (`None` = never abort on record errors alone)
    pub max_processing_errors: Option<u64>,

    /// Capacity of the log event broadcast buffer
    pub event_buffer: usize,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            post_timeout: Duration::from_secs(DEFAULT_POST_TIMEOUT_SECS),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            detail_concurrency: DEFAULT_DETAIL_CONCURRENCY,
            page_backoff: BackoffPolicy::new(
                Duration::from_secs(2),
                Duration::from_secs(60),
                DEFAULT_PAGE_MAX_ATTEMPTS,
            ),
            detail_backoff: BackoffPolicy::new(
                Duration::from_secs(1),
                Duration::from_secs(8),
                DEFAULT_DETAIL_MAX_ATTEMPTS,
            ),
            post_backoff: BackoffPolicy::new(
                Duration::from_secs(2),
                Duration::from_secs(10),
                DEFAULT_POST_MAX_ATTEMPTS,
            ),
            abort_on_batch_failure: false,
            max_processing_errors: None,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl EtlConfig {
    /// Load configuration from environment variables and defaults
    ///
    /// Recognized variables:
    /// - `FAUNA_BASE_URL`: upstream/sink base URL
    /// - `FAUNA_REQUEST_TIMEOUT_SECS`, `FAUNA_POST_TIMEOUT_SECS`
    /// - `FAUNA_MAX_BATCH_SIZE`, `FAUNA_DETAIL_CONCURRENCY`
    /// - `FAUNA_ABORT_ON_BATCH_FAILURE` (true/false)
    /// - `FAUNA_MAX_PROCESSING_ERRORS` (unset = never abort)
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(url) = std::env::var("FAUNA_BASE_URL") {
            config.base_url = url;
        }

        if let Some(secs) = env_parse::<u64>("FAUNA_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = env_parse::<u64>("FAUNA_POST_TIMEOUT_SECS") {
            config.post_timeout = Duration::from_secs(secs);
        }

        if let Some(size) = env_parse::<usize>("FAUNA_MAX_BATCH_SIZE") {
            config.max_batch_size = size;
        }

        if let Some(n) = env_parse::<usize>("FAUNA_DETAIL_CONCURRENCY") {
            config.detail_concurrency = n;
        }

        if let Some(flag) = env_parse::<bool>("FAUNA_ABORT_ON_BATCH_FAILURE") {
            config.abort_on_batch_failure = flag;
        }

        if let Some(limit) = env_parse::<u64>("FAUNA_MAX_PROCESSING_ERRORS") {
            config.max_processing_errors = Some(limit);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(EtlError::config("base URL cannot be empty"));
        }

        if self.max_batch_size == 0 {
            return Err(EtlError::config("max batch size must be greater than 0"));
        }

        if self.detail_concurrency == 0 {
            return Err(EtlError::config("detail concurrency must be greater than 0"));
        }

        if self.event_buffer == 0 {
            return Err(EtlError::config("event buffer must be greater than 0"));
        }

        for (name, policy) in [
            ("page", &self.page_backoff),
            ("detail", &self.detail_backoff),
            ("post", &self.post_backoff),
        ] {
            if policy.max_attempts == 0 {
                return Err(EtlError::config(format!(
                    "{} backoff must allow at least one attempt",
                    name
                )));
            }
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EtlConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.max_batch_size, 100);
        assert!(config.max_processing_errors.is_none());
        assert!(!config.abort_on_batch_failure);
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let config = EtlConfig {
            max_batch_size: 0,
            ..EtlConfig::default()
        };
        assert!(matches!(config.validate(), Err(EtlError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = EtlConfig {
            detail_concurrency: 0,
            ..EtlConfig::default()
        };
        assert!(matches!(config.validate(), Err(EtlError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_base_url() {
        let config = EtlConfig {
            base_url: String::new(),
            ..EtlConfig::default()
        };
        assert!(matches!(config.validate(), Err(EtlError::Config(_))));
    }
}
