//! # Sequencer Runtime
//!
//! Reads NDJSON broker records from stdin, sequences them per context and
//! writes released messages to stdout in release order.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sequencer_core::MessageHandler;
use sequencer_runtime::logging::init_logging;
use sequencer_runtime::{
    feed, JobScheduler, JsonMessage, LocalJobLock, ReleaseSink, RuntimeConfig, SequencerContainer,
};
use tokio::io::BufReader;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Grace period for scheduled jobs after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let config = RuntimeConfig::load().context("Failed to load runtime configuration")?;
    init_logging(&config.log_level, config.json_logs)?;

    let sink: Arc<dyn MessageHandler<JsonMessage>> = Arc::new(ReleaseSink::new(std::io::stdout()));
    let container =
        SequencerContainer::new(config, sink).context("Failed to load sequence document")?;

    let scheduler = Arc::new(JobScheduler::new(
        &container.service,
        Arc::new(LocalJobLock::new()),
        container.config.housekeeping_interval,
        container.config.override_interval,
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let jobs = scheduler.spawn(shutdown_rx);

    info!("Sequencer running. Reading records from stdin, Ctrl+C to stop.");

    let inbox = container.service.inbox();
    let reader = BufReader::new(tokio::io::stdin());
    tokio::select! {
        summary = feed(reader, inbox.as_ref(), container.sink.as_ref()) => {
            let summary = summary.context("Failed to read stdin")?;
            info!(?summary, "Feed finished");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            info!("Interrupted");
        }
    }

    info!("Initiating graceful shutdown...");
    if let Err(e) = shutdown_tx.send(true) {
        error!("Failed to send shutdown signal: {}", e);
    }
    for job in jobs {
        if tokio::time::timeout(SHUTDOWN_GRACE, job).await.is_err() {
            warn!("Scheduled job did not stop within the grace period");
        }
    }

    info!("Shutdown complete");
    Ok(())
}
