use std::error::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_DIAGNOSTICS_FILTER: &str = "buffered_access_log=info";

/// Install a global `tracing` subscriber that prints this crate's own
/// diagnostics (open/close, dropped lines, misconfiguration) to stderr.
///
/// The library itself never installs a subscriber; this is for binaries
/// and demos that do not set one up of their own. The filter is read from
/// `RUST_LOG`, falling back to [`DEFAULT_DIAGNOSTICS_FILTER`].
///
/// Access log lines do not go through `tracing`; they are written by the
/// [`BufferedSink`](crate::sink::BufferedSink) directly.
pub fn init_diagnostics() -> Result<(), Box<dyn Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_DIAGNOSTICS_FILTER))?;
    init_diagnostics_with_filter(filter)
}

/// Same as [`init_diagnostics`] with an explicit filter.
pub fn init_diagnostics_with_filter(filter: EnvFilter) -> Result<(), Box<dyn Error + Send + Sync>> {
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    Registry::default().with(filter).with(fmt_layer).try_init()?;
    Ok(())
}
