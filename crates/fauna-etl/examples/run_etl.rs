//! Run one full pipeline pass against a live upstream.
//!
//! ```sh
//! FAUNA_BASE_URL=http://localhost:3123 cargo run --example run_etl
//! ```

use fauna_common::logging::{init_logging, LogConfig};
use fauna_etl::{EtlConfig, EtlCoordinator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(&LogConfig::from_env()?)?;

    let coordinator = EtlCoordinator::new(EtlConfig::load()?)?;
    let mut events = coordinator.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("[{:?}] {} {}", event.level, event.timestamp, event.message);
        }
    });

    let handle = coordinator.start_run(50)?;
    let outcome = handle.wait().await?;

    println!("{}", serde_json::to_string_pretty(outcome.stats())?);
    Ok(())
}
