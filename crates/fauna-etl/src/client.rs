//! HTTP client for the upstream source and downstream sink
//!
//! Maps transport failures to the retry classification: connection errors,
//! timeouts, and 5xx responses are transient; 4xx responses and malformed
//! detail payloads are permanent. A listing page with an unexpected shape
//! is transient so it is retried before being escalated.

use crate::config::EtlConfig;
use crate::error::{EtlError, Result};
use crate::models::{ListingPage, NormalizedRecord, PostResult, RawRecord, RecordId, SinkReceipt};
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Client for `GET /pages/{n}`, `GET /details/{id}` and `POST /batch`
#[derive(Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    post_timeout: Duration,
}

impl ApiClient {
    /// Create a new client from the pipeline configuration
    pub fn new(config: &EtlConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            post_timeout: config.post_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn page_url(&self, page: u32) -> String {
        format!("{}/pages/{}", self.base_url, page)
    }

    fn detail_url(&self, id: &RecordId) -> String {
        format!("{}/details/{}", self.base_url, id)
    }

    fn batch_url(&self) -> String {
        format!("{}/batch", self.base_url)
    }

    /// Fetch one listing page
    pub async fn fetch_page(&self, page: u32) -> Result<ListingPage> {
        let response = self.client.get(self.page_url(page)).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &format!("page {}", page)));
        }

        // An unexpected page shape is retried before being escalated, so
        // decode failures here are transient rather than permanent.
        response.json::<ListingPage>().await.map_err(|e| {
            EtlError::transient(format!("unexpected shape on page {}: {}", page, e))
        })
    }

    /// Fetch the raw record behind one identifier
    pub async fn fetch_detail(&self, id: &RecordId) -> Result<RawRecord> {
        let response = self.client.get(self.detail_url(id)).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &format!("detail {}", id)));
        }

        Ok(response.json::<RawRecord>().await?)
    }

    /// Deliver one batch to the sink
    ///
    /// Returns the per-item accept/reject counts. A 2xx response with a
    /// missing or unparsable body counts the whole batch as accepted.
    pub async fn post_batch(&self, batch: &[NormalizedRecord]) -> Result<PostResult> {
        let response = self
            .client
            .post(self.batch_url())
            .timeout(self.post_timeout)
            .json(batch)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(
                status,
                &format!("batch of {} records", batch.len()),
            ));
        }

        let receipt = response.json::<SinkReceipt>().await.unwrap_or_default();
        let total = batch.len() as u64;
        let succeeded = match (receipt.accepted, receipt.rejected) {
            (Some(accepted), _) => accepted.min(total),
            (None, Some(rejected)) => total.saturating_sub(rejected),
            (None, None) => total,
        };

        Ok(PostResult {
            succeeded,
            failed: total - succeeded,
        })
    }
}

/// Classify an unsuccessful HTTP status
fn status_error(status: StatusCode, context: &str) -> EtlError {
    if status.is_server_error() {
        EtlError::transient(format!("{}: HTTP {}", context, status))
    } else {
        EtlError::permanent(format!("{}: HTTP {}", context, status))
    }
}
