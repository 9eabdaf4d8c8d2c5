//! Batch delivery to the downstream sink
//!
//! Posts one batch at a time under its own backoff policy, using the same
//! transient/permanent classification as the fetch side. A batch whose
//! delivery gives up is reported to the caller; whether that aborts the
//! run is the coordinator's decision.

use crate::backoff::{retry, BackoffPolicy};
use crate::client::ApiClient;
use crate::error::{EtlError, Result};
use crate::events::EventBus;
use crate::models::{NormalizedRecord, PostResult};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Sink loader with its own retry policy
pub struct Loader {
    client: Arc<ApiClient>,
    policy: BackoffPolicy,
    cancel: CancellationToken,
    events: EventBus,
    max_batch_size: usize,
}

impl Loader {
    pub fn new(
        client: Arc<ApiClient>,
        policy: BackoffPolicy,
        cancel: CancellationToken,
        events: EventBus,
        max_batch_size: usize,
    ) -> Self {
        Self {
            client,
            policy,
            cancel,
            events,
            max_batch_size,
        }
    }

    /// Deliver one batch, retrying transient sink failures
    pub async fn post(&self, batch: &[NormalizedRecord]) -> Result<PostResult> {
        if batch.is_empty() {
            return Ok(PostResult {
                succeeded: 0,
                failed: 0,
            });
        }

        if batch.len() > self.max_batch_size {
            return Err(EtlError::config(format!(
                "batch size {} exceeds sink maximum of {}",
                batch.len(),
                self.max_batch_size
            )));
        }

        let label = format!("post of {}-record batch", batch.len());
        let result = retry(&self.policy, &self.cancel, &self.events, &label, || {
            self.client.post_batch(batch)
        })
        .await?;

        self.events.info(format!(
            "Posted batch: {} accepted, {} rejected",
            result.succeeded, result.failed
        ));

        Ok(result)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::EtlConfig;
    use crate::models::RecordId;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(n: i64) -> NormalizedRecord {
        NormalizedRecord {
            id: RecordId::Int(n),
            name: format!("animal-{}", n),
            species: "dog".to_string(),
            age: Some(3),
            friends: vec!["A".to_string()],
            born_at: None,
            friends_raw: None,
        }
    }

    fn loader_for(server: &MockServer, max_attempts: u32) -> Loader {
        let config = EtlConfig {
            base_url: server.uri(),
            ..EtlConfig::default()
        };
        Loader::new(
            Arc::new(ApiClient::new(&config).unwrap()),
            BackoffPolicy::new(
                Duration::from_millis(1),
                Duration::from_millis(4),
                max_attempts,
            ),
            CancellationToken::new(),
            EventBus::new(16),
            100,
        )
    }

    #[tokio::test]
    async fn test_post_reports_receipt_counts() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/batch"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accepted": 2,
                "rejected": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let loader = loader_for(&server, 3);
        let batch = vec![record(1), record(2), record(3)];
        let result = loader.post(&batch).await.unwrap();

        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 1);
    }

    #[tokio::test]
    async fn test_post_without_receipt_counts_all_accepted() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/batch"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let loader = loader_for(&server, 3);
        let batch = vec![record(1), record(2)];
        let result = loader.post(&batch).await.unwrap();

        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 0);
    }

    #[tokio::test]
    async fn test_post_gives_up_after_persistent_server_errors() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/batch"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let loader = loader_for(&server, 2);
        let batch = vec![record(1)];
        let result = loader.post(&batch).await;

        assert!(matches!(result, Err(EtlError::GiveUp { attempts: 2, .. })));
    }

    #[tokio::test]
    async fn test_oversized_batch_is_rejected_locally() {
        let server = MockServer::start().await;
        let loader = loader_for(&server, 3);

        let batch: Vec<NormalizedRecord> = (0..101).map(record).collect();
        let result = loader.post(&batch).await;
        assert!(matches!(result, Err(EtlError::Config(_))));

        // Nothing reached the sink
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
