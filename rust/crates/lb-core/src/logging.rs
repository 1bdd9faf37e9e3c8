//! Structured logging setup, simplified from the telemetry stack this workspace once carried: no
//! OTLP exporter, just `tracing-subscriber` with an env filter.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global `tracing` subscriber for a CLI run.
///
/// `verbose` raises the default filter to `debug`; otherwise `info`. `RUST_LOG` always takes
/// precedence when set.
pub fn init_telemetry(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
