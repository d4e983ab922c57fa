//! Log output for the `sequin` binary.
//!
//! Events go to stderr through `tracing_subscriber::fmt`, leaving stdout to
//! the pipeline's records. The level filter comes from `RUST_LOG` and
//! defaults to `info`; engine internals log at `debug` and `trace`:
//!
//! ```bash
//! RUST_LOG=sequin=debug sequin --range 1000 digest > /dev/null
//! ```

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_thread_names(true)
                .with_target(false),
        )
        .try_init()?;
    Ok(())
}
