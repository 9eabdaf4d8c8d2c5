//! Run coordination
//!
//! Drives one pipeline execution through
//! fetch -> normalize -> batch -> post, owns the run statistics, and
//! enforces the single-active-run constraint. Detail fetches fan out up to
//! the configured concurrency but results re-enter the batch stream in
//! original id order, so batch contents are deterministic.

use crate::backoff::retry;
use crate::batch::BatchAccumulator;
use crate::client::ApiClient;
use crate::config::EtlConfig;
use crate::error::{EtlError, Result};
use crate::events::{EventBus, LogEvent};
use crate::fetcher::PageFetcher;
use crate::loader::Loader;
use crate::models::{NormalizedRecord, RecordId, RunOutcome};
use crate::normalize::normalize;
use crate::stats::{RunStats, RunStep, StatsSnapshot};
use futures::{StreamExt, TryStreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Handle to a background pipeline run
pub struct RunHandle {
    run_id: Uuid,
    cancel: CancellationToken,
    join: JoinHandle<RunOutcome>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Signal the run to stop; best-effort, the run lands in Failed with a
    /// cancelled reason once in-flight work notices the signal
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run to reach its terminal state
    pub async fn wait(self) -> Result<RunOutcome> {
        self.join
            .await
            .map_err(|e| EtlError::permanent(format!("run task failed: {}", e)))
    }
}

struct Inner {
    config: EtlConfig,
    client: Arc<ApiClient>,
    events: EventBus,
    active: AtomicBool,
    current: RwLock<Option<Arc<RunStats>>>,
}

/// Clears the active flag when the run ends, including on panic.
struct ActiveGuard {
    inner: Arc<Inner>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.inner.active.store(false, Ordering::SeqCst);
    }
}

/// Coordinator for ETL pipeline runs
///
/// Cheap to clone; all clones share the same single-active-run state and
/// event bus.
#[derive(Clone)]
pub struct EtlCoordinator {
    inner: Arc<Inner>,
}

impl EtlCoordinator {
    /// Create a coordinator from a validated configuration
    pub fn new(config: EtlConfig) -> Result<Self> {
        config.validate()?;

        let client = Arc::new(ApiClient::new(&config)?);
        let events = EventBus::new(config.event_buffer);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                client,
                events,
                active: AtomicBool::new(false),
                current: RwLock::new(None),
            }),
        })
    }

    /// Subscribe to the structured log event stream
    pub fn subscribe_events(&self) -> broadcast::Receiver<LogEvent> {
        self.inner.events.subscribe()
    }

    /// Snapshot of the current (or most recent) run's statistics
    ///
    /// Safe to call concurrently from any number of readers. `None` until
    /// the first run starts or after an explicit clear.
    pub fn current_statistics(&self) -> Option<StatsSnapshot> {
        self.inner
            .current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|stats| stats.snapshot())
    }

    /// Drop the retained statistics of the last run
    pub fn clear_statistics(&self) -> Result<()> {
        if self.inner.active.load(Ordering::SeqCst) {
            return Err(EtlError::AlreadyRunning);
        }
        let mut current = self.inner.current.write().unwrap_or_else(|e| e.into_inner());
        *current = None;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Best-effort cancellation of a run started by this coordinator
    pub fn cancel_run(&self, handle: &RunHandle) {
        handle.cancel();
    }

    /// Start a pipeline run in the background
    ///
    /// Rejects a zero or oversized batch size, and rejects the call while
    /// another run is active; a second run is never queued.
    pub fn start_run(&self, batch_size: usize) -> Result<RunHandle> {
        if batch_size == 0 {
            return Err(EtlError::config("batch size must be greater than 0"));
        }
        if batch_size > self.inner.config.max_batch_size {
            return Err(EtlError::config(format!(
                "batch size {} exceeds sink maximum of {}",
                batch_size, self.inner.config.max_batch_size
            )));
        }

        if self.inner.active.swap(true, Ordering::SeqCst) {
            return Err(EtlError::AlreadyRunning);
        }
        let guard = ActiveGuard {
            inner: self.inner.clone(),
        };

        let stats = Arc::new(RunStats::new());
        {
            let mut current = self.inner.current.write().unwrap_or_else(|e| e.into_inner());
            *current = Some(stats.clone());
        }

        let run_id = stats.run_id();
        let cancel = CancellationToken::new();

        let inner = self.inner.clone();
        let task_cancel = cancel.clone();
        let join = tokio::spawn(async move {
            let _guard = guard;
            let result = run_pipeline(&inner, &stats, &task_cancel, batch_size).await;
            finalize(&inner.events, &stats, result)
        });

        Ok(RunHandle {
            run_id,
            cancel,
            join,
        })
    }
}

/// Freeze statistics and translate the pipeline result into the terminal
/// outcome
fn finalize(events: &EventBus, stats: &RunStats, result: Result<()>) -> RunOutcome {
    match result {
        Ok(()) => {
            stats.freeze(RunStep::Completed);
            let snapshot = stats.snapshot();
            events.info(format!(
                "Run {} completed in {:.2}s: {} found, {} processed, {} posted in {} batches, {} errors",
                snapshot.run_id,
                snapshot.elapsed.as_secs_f64(),
                snapshot.found,
                snapshot.processed,
                snapshot.posted,
                snapshot.batches_posted,
                snapshot.errors
            ));
            RunOutcome::Completed { stats: snapshot }
        },
        Err(err) => {
            stats.freeze(RunStep::Failed);
            let snapshot = stats.snapshot();
            let reason = err.to_string();
            events.error(format!("Run {} failed: {}", snapshot.run_id, reason));
            RunOutcome::Failed {
                stats: snapshot,
                reason,
            }
        },
    }
}

async fn run_pipeline(
    inner: &Arc<Inner>,
    stats: &Arc<RunStats>,
    cancel: &CancellationToken,
    batch_size: usize,
) -> Result<()> {
    let config = &inner.config;
    let events = inner.events.clone();

    events.info(format!("Starting ETL run {}", stats.run_id()));
    stats.advance_step(RunStep::Fetching);

    // Drain the listing. Duplicate ids across pages collapse to their
    // first occurrence, keeping the downstream order stable.
    let fetcher = PageFetcher::new(
        inner.client.clone(),
        config.page_backoff.clone(),
        cancel.clone(),
        events.clone(),
    );
    let id_stream = fetcher.into_id_stream();
    tokio::pin!(id_stream);

    let mut ids: Vec<RecordId> = Vec::new();
    let mut seen: HashSet<RecordId> = HashSet::new();
    while let Some(id) = id_stream.try_next().await? {
        if cancel.is_cancelled() {
            return Err(EtlError::Cancelled);
        }
        if seen.insert(id.clone()) {
            ids.push(id);
        }
    }
    drop(seen);

    stats.add_found(ids.len() as u64);
    events.info(format!("Found {} unique records", ids.len()));
    stats.advance_step(RunStep::Processing);

    if ids.is_empty() {
        events.warning("No records found to process");
        return Ok(());
    }

    let loader = Loader::new(
        inner.client.clone(),
        config.post_backoff.clone(),
        cancel.clone(),
        events.clone(),
        config.max_batch_size,
    );
    let mut accumulator = BatchAccumulator::new(batch_size);

    // Fan out detail fetches; `buffered` reassembles results in the
    // original id order before they reach the accumulator.
    let client = inner.client.clone();
    let detail_policy = config.detail_backoff.clone();
    let worker_cancel = cancel.clone();
    let worker_events = events.clone();

    let details = futures::stream::iter(ids)
        .map(move |id| {
            let client = client.clone();
            let policy = detail_policy.clone();
            let cancel = worker_cancel.clone();
            let events = worker_events.clone();
            async move {
                let label = format!("detail fetch for record {}", id);
                let fetched = retry(&policy, &cancel, &events, &label, || {
                    client.fetch_detail(&id)
                })
                .await;
                (id, fetched)
            }
        })
        .buffered(config.detail_concurrency);
    tokio::pin!(details);

    let mut processing_errors = 0u64;

    while let Some((id, fetched)) = details.next().await {
        if cancel.is_cancelled() {
            return Err(EtlError::Cancelled);
        }

        let raw = match fetched {
            Ok(raw) => raw,
            Err(EtlError::Cancelled) => return Err(EtlError::Cancelled),
            Err(err) => {
                // Record-scoped failure: counted, run continues.
                stats.add_errors(1);
                processing_errors += 1;
                events.error(format!("Record {}: {}", id, err));
                check_error_budget(config, processing_errors)?;
                continue;
            },
        };

        let record = match normalize(&raw) {
            Ok(record) => record,
            Err(err) => {
                stats.add_errors(1);
                processing_errors += 1;
                events.warning(format!("Record {} failed validation: {}", id, err));
                check_error_budget(config, processing_errors)?;
                continue;
            },
        };

        stats.incr_processed();

        if let Some(batch) = accumulator.accept(record) {
            deliver(&loader, config, stats, &events, batch).await?;
        }
    }

    if let Some(batch) = accumulator.flush() {
        deliver(&loader, config, stats, &events, batch).await?;
    }

    Ok(())
}

/// Abort once record-scoped errors exceed the configured threshold;
/// unconfigured means record errors alone never abort the run
fn check_error_budget(config: &EtlConfig, processing_errors: u64) -> Result<()> {
    if let Some(limit) = config.max_processing_errors {
        if processing_errors > limit {
            return Err(EtlError::TooManyRecordErrors {
                errors: processing_errors,
            });
        }
    }
    Ok(())
}

/// Post one batch and account for the outcome
///
/// A batch whose delivery gives up marks all its records as errors; the
/// run continues unless abort-on-batch-failure is set.
async fn deliver(
    loader: &Loader,
    config: &EtlConfig,
    stats: &RunStats,
    events: &EventBus,
    batch: Vec<NormalizedRecord>,
) -> Result<()> {
    stats.advance_step(RunStep::Posting);
    let size = batch.len() as u64;

    match loader.post(&batch).await {
        Ok(result) => {
            stats.add_posted(result.succeeded);
            stats.incr_batches_posted();
            if result.failed > 0 {
                stats.add_errors(result.failed);
                events.warning(format!(
                    "Sink rejected {} of {} records",
                    result.failed, size
                ));
            }
            Ok(())
        },
        Err(EtlError::Cancelled) => Err(EtlError::Cancelled),
        Err(err) => {
            stats.add_errors(size);
            events.error(format!("Batch of {} records failed: {}", size, err));
            if config.abort_on_batch_failure {
                Err(err)
            } else {
                Ok(())
            }
        },
    }
}
