//! Logging bootstrap.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "my_butler=info";

/// Install the global `tracing` subscriber. Safe to call more than once;
/// later calls are ignored.
///
/// Under Lambda, CloudWatch neither renders ANSI colours nor needs our
/// timestamps, so both are dropped.
pub fn init(lambda: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(!lambda);

    let _ = if lambda {
        builder.without_time().try_init()
    } else {
        builder.try_init()
    };
}
