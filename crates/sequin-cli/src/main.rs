#![doc = include_str!("../README.md")]

mod app;

use app::config::{CliArgs, RunConfig};
use app::telemetry::init_telemetry;
use clap::Parser;
use sequin::Stats;
use std::{io, sync::Arc};

// mimalloc; the default musl allocator contends across worker threads.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = RunConfig::try_from(args)?;

    init_telemetry()?;
    log_startup_info(&config);

    let stats = Arc::new(Stats::new());
    let summary = app::run(&config, Arc::clone(&stats), io::stdout().lock())?;

    #[cfg(feature = "tracing")]
    {
        if summary.timed_out {
            tracing::warn!(written = summary.written, "Timed out, output is partial");
        } else {
            tracing::info!(written = summary.written, "Done");
        }
    }
    #[cfg(not(feature = "tracing"))]
    let _ = summary;

    if config.stats {
        eprintln!("{}", serde_json::to_string(&stats.snapshot())?);
    }
    Ok(())
}

fn log_startup_info(_config: &RunConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!("Starting pipeline with full config: {:#?}", _config);
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting {:?} pipeline over {:?}",
            _config.command,
            _config.input
        );
    }
}
