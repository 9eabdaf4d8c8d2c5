//! Retry backoff policy
//!
//! Pure decision function plus the async retry loop built on top of it.
//! Delays grow exponentially with a configurable base and cap. Jitter uses
//! the "equal jitter" formula: for a capped exponential delay `d`, the
//! actual sleep is `d/2 + uniform(0..=d/2)`, which keeps at least half the
//! intended spacing while spreading recontact times.

use crate::error::{EtlError, FailureClass, Result};
use crate::events::EventBus;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Decision for a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep this long, then retry
    RetryAfter(Duration),
    /// Stop retrying and escalate
    GiveUp,
}

/// Exponential backoff policy with a retry ceiling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay for the first retry
    pub base: Duration,
    /// Upper bound on the exponential delay
    pub cap: Duration,
    /// Maximum number of attempts before giving up
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts,
        }
    }

    /// Decide what to do after attempt number `attempt` (1-based) failed
    /// with the given classification
    ///
    /// Permanent failures and attempts at or beyond the ceiling yield
    /// [`RetryDecision::GiveUp`].
    pub fn next_delay(&self, attempt: u32, class: FailureClass) -> RetryDecision {
        if class == FailureClass::Permanent || attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }

        let exponent = attempt.saturating_sub(1).min(20);
        let delay = self
            .base
            .saturating_mul(1u32 << exponent)
            .min(self.cap);

        let half_ms = (delay.as_millis() as u64) / 2;
        let jitter_ms = rand::thread_rng().gen_range(0..=half_ms);

        RetryDecision::RetryAfter(Duration::from_millis(half_ms + jitter_ms))
    }
}

/// Run `op` under the given backoff policy until it succeeds, the budget
/// is exhausted, or the run is cancelled
///
/// Permanent failures escalate immediately without consuming the budget.
/// Sleeps between attempts observe the cancellation token, so an in-flight
/// retry abandons its backoff promptly on cancel.
pub async fn retry<T, F, Fut>(
    policy: &BackoffPolicy,
    cancel: &CancellationToken,
    events: &EventBus,
    label: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(EtlError::Cancelled);
        }

        attempt += 1;
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let class = match err.class() {
            Some(FailureClass::Transient) => FailureClass::Transient,
            Some(FailureClass::Permanent) => return Err(err),
            None => return Err(err),
        };

        match policy.next_delay(attempt, class) {
            RetryDecision::RetryAfter(delay) => {
                events.warning(format!(
                    "{} failed (attempt {}/{}): {}; retrying in {}ms",
                    label,
                    attempt,
                    policy.max_attempts,
                    err,
                    delay.as_millis()
                ));

                tokio::select! {
                    _ = cancel.cancelled() => return Err(EtlError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            },
            RetryDecision::GiveUp => {
                return Err(EtlError::GiveUp {
                    attempts: attempt,
                    cause: err.to_string(),
                });
            },
        }
    }
}
