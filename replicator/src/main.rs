//! Audit replicator service binary.
//!
//! Claims rows from the Postgres `audit_log` table and indexes them into the configured sink
//! until SIGINT or SIGTERM.

use config::shared::ReplicatorConfig;
use telemetry::metrics::init_metrics;
use telemetry::tracing::init_tracing;
use tracing::error;

use crate::replicator_config::load_replicator_config;
use crate::core::start_replicator_with_config;
use crate::error::{ReplicatorError, ReplicatorResult};

mod core;
mod error;
mod replicator_config;

fn main() {
    if let Err(err) = run() {
        eprint!("{}", err.render_report());
        std::process::exit(1);
    }
}

fn run() -> ReplicatorResult<()> {
    let replicator_config = load_replicator_config()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME")).map_err(ReplicatorError::config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(replicator_config))?;

    Ok(())
}

async fn async_main(replicator_config: ReplicatorConfig) -> ReplicatorResult<()> {
    // The exporter's HTTP listener runs on this runtime.
    init_metrics(env!("CARGO_BIN_NAME")).map_err(ReplicatorError::config)?;

    if let Err(err) = start_replicator_with_config(replicator_config).await {
        error!("{err}");

        return Err(err);
    }

    Ok(())
}
