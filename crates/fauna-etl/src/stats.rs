//! Run statistics
//!
//! One `RunStats` is created per run, owned by the coordinator, and shared
//! read-only with concurrent workers and external observers. Counters are
//! atomic so concurrent increments never lose updates; the step label only
//! ever advances through the run ordering so the externally observed
//! progression is monotone.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Pipeline stage label, in run order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStep {
    Idle,
    Fetching,
    Processing,
    Posting,
    Completed,
    Failed,
}

impl RunStep {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStep::Completed | RunStep::Failed)
    }
}

impl std::fmt::Display for RunStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunStep::Idle => "idle",
            RunStep::Fetching => "fetching",
            RunStep::Processing => "processing",
            RunStep::Posting => "posting",
            RunStep::Completed => "completed",
            RunStep::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy)]
struct Frozen {
    at: DateTime<Utc>,
    elapsed: Duration,
}

/// Live statistics for one run
///
/// Written by the coordinator (and its detail-fetch workers), snapshotted
/// by any number of readers.
#[derive(Debug)]
pub struct RunStats {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    start: Instant,
    found: AtomicU64,
    processed: AtomicU64,
    posted: AtomicU64,
    batches_posted: AtomicU64,
    errors: AtomicU64,
    step: RwLock<RunStep>,
    frozen: RwLock<Option<Frozen>>,
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            start: Instant::now(),
            found: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            posted: AtomicU64::new(0),
            batches_posted: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            step: RwLock::new(RunStep::Idle),
            frozen: RwLock::new(None),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn add_found(&self, n: u64) {
        self.found.fetch_add(n, Ordering::Relaxed);
    }

    pub fn incr_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_posted(&self, n: u64) {
        self.posted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn incr_batches_posted(&self) {
        self.batches_posted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record `n` failed records and return the new error total
    pub fn add_errors(&self, n: u64) -> u64 {
        self.errors.fetch_add(n, Ordering::Relaxed) + n
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Advance the step label; regressions and writes after the terminal
    /// state are ignored
    pub fn advance_step(&self, step: RunStep) {
        let mut current = self.step.write().unwrap_or_else(|e| e.into_inner());
        if !current.is_terminal() && step > *current {
            *current = step;
        }
    }

    /// Enter the terminal state and finalize the duration
    pub fn freeze(&self, terminal: RunStep) {
        debug_assert!(terminal.is_terminal());
        self.advance_step(terminal);
        let mut frozen = self.frozen.write().unwrap_or_else(|e| e.into_inner());
        if frozen.is_none() {
            *frozen = Some(Frozen {
                at: Utc::now(),
                elapsed: self.start.elapsed(),
            });
        }
    }

    /// Take a point-in-time snapshot; safe to call from any thread
    pub fn snapshot(&self) -> StatsSnapshot {
        let step = *self.step.read().unwrap_or_else(|e| e.into_inner());
        let frozen = *self.frozen.read().unwrap_or_else(|e| e.into_inner());

        StatsSnapshot {
            run_id: self.run_id,
            step,
            found: self.found.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            posted: self.posted.load(Ordering::Relaxed),
            batches_posted: self.batches_posted.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            started_at: self.started_at,
            finished_at: frozen.map(|f| f.at),
            elapsed: frozen.map(|f| f.elapsed).unwrap_or_else(|| self.start.elapsed()),
        }
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable view of the run statistics
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub run_id: Uuid,
    pub step: RunStep,
    pub found: u64,
    pub processed: u64,
    pub posted: u64,
    pub batches_posted: u64,
    pub errors: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed: Duration,
}
