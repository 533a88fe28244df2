//! Relay binary.
//!
//! Copies a catalog of files from a source bucket to a destination bucket, uploads their metadata
//! to an API and verifies every file made it through. Both external calls are simulated. The
//! three steps run as a handoff pipeline configured from `configuration/`.

use anyhow::Context;
use handoff_telemetry::metrics::init_metrics;
use handoff_telemetry::tracing::init_tracing;
use tracing::{error, info, warn};

use crate::config::{RelayConfig, load_relay_config};
use crate::core::start_relay_with_config;
use crate::error::{RelayError, RelayResult};

mod config;
mod core;
mod error;
mod files;
mod report;
mod transforms;

fn main() -> anyhow::Result<()> {
    let relay_config = load_relay_config().context("failed to load the relay configuration")?;

    let _log_flusher =
        init_tracing(env!("CARGO_BIN_NAME")).context("failed to initialize tracing")?;

    if let Some(metrics) = &relay_config.metrics {
        init_metrics(env!("CARGO_BIN_NAME"), metrics.port)
            .map_err(RelayError::metrics)
            .context("failed to initialize metrics")?;
    }

    // We start the runtime.
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(relay_config))?;

    Ok(())
}

async fn async_main(relay_config: RelayConfig) -> RelayResult<()> {
    match start_relay_with_config(relay_config).await {
        Ok(report) if report.is_complete() => {
            info!(%report, "relay completed");
        }
        Ok(report) => {
            warn!(%report, "relay completed with failed or missing files");
        }
        Err(err) => {
            error!("{}", err.render_report());
            return Err(err);
        }
    }

    Ok(())
}
