//! Fauna Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared facilities for the Fauna ETL workspace.
//!
//! # Overview
//!
//! This crate provides functionality used across all workspace members:
//!
//! - **Error Handling**: Shared error and result types
//! - **Logging**: Centralized `tracing` configuration and initialization
//!
//! # Example
//!
//! ```no_run
//! use fauna_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> fauna_common::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     tracing::info!("Application started");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{FaunaError, Result};
