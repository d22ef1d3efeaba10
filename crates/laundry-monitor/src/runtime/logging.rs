use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "info,laundry_monitor=debug,laundry_io=debug,laundry_core=debug";

/// Initialize the tracing subscriber with optional JSON output.
///
/// Logs go to stderr so replay output on stdout stays machine-readable.
/// `log` records from the core crate are forwarded into the same subscriber.
pub fn init_tracing(json_output: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }
}
