//! Global `tracing` subscriber and panic hook.

// External crates
use std::io;
use std::panic;
use tracing::error;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    filter::EnvFilter,
    fmt,
    prelude::*,
    registry::Registry,
};

/// Environment variable holding the diagnostics filter, e.g. `sutools=debug`.
pub const LOG_ENV: &str = "SUTOOLS_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Install the process-wide subscriber for sutools' own diagnostics.
///
/// Output goes to stderr so it never mixes with command output. Named
/// loggers are unaffected: each one dispatches to its own sinks. If a global
/// subscriber is already installed it is kept and a notice goes to stderr.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let subscriber = Registry::default()
        .with(filter)
        .with(fmt_layer)
        .with(ErrorLayer::default());

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("sutools: diagnostics subscriber not installed: {e}");
    }
}

/// Route panics through `tracing::error!` before the default hook runs.
pub fn init_panic_handler() {
    panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info.payload();
        let msg = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("Unknown panic");

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());

        error!(
            message = %msg,
            location = %location,
            "Application panicked!"
        );
        eprintln!("panicked at {location}: {msg}");
    }));
}
