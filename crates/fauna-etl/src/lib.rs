//! Fauna ETL Pipeline
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Resilient extract-transform-load pipeline for a paginated upstream API:
//! walks the listing endpoint, fetches record details concurrently,
//! normalizes heterogeneous field encodings into a canonical shape, and
//! delivers fixed-size batches to a downstream sink. Every network hop is
//! wrapped in capped exponential backoff with jitter, and a run's progress
//! is observable through live statistics and a structured event stream.
//!
//! # Example
//!
//! ```no_run
//! use fauna_etl::{EtlConfig, EtlCoordinator};
//!
//! #[tokio::main]
//! async fn main() -> fauna_etl::Result<()> {
//!     let coordinator = EtlCoordinator::new(EtlConfig::load()?)?;
//!     let handle = coordinator.start_run(50)?;
//!     let outcome = handle.wait().await?;
//!     println!("{:?}", outcome.stats());
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod batch;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod loader;
pub mod models;
pub mod normalize;
pub mod stats;

pub use backoff::{retry, BackoffPolicy, RetryDecision};
pub use batch::BatchAccumulator;
pub use client::ApiClient;
pub use config::EtlConfig;
pub use coordinator::{EtlCoordinator, RunHandle};
pub use error::{EtlError, FailureClass, Result, ValidationError};
pub use events::{EventBus, EventLevel, LogEvent};
pub use fetcher::PageFetcher;
pub use loader::Loader;
pub use models::{NormalizedRecord, RawRecord, RecordId, RunOutcome};
pub use normalize::normalize;
pub use stats::{RunStep, StatsSnapshot};
