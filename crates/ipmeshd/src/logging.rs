//! Logging setup for the engine.
//!
//! Events are structured (`node`, `kind`, `overlay`, `path` fields) and
//! filtered through `RUST_LOG`, falling back to `info` when it is unset.

use crate::config::LogFormat;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialise the global subscriber writing to stderr.
///
/// Call once, before the first event.
///
/// # Examples
///
/// ```rust,no_run
/// use ipmeshd::{config::LogFormat, logging};
///
/// logging::init(LogFormat::Text);
/// tracing::info!("logging ready");
/// ```
pub fn init(format: LogFormat) {
    init_with_writer(format, fmt::writer::BoxMakeWriter::new(std::io::stderr));
}

/// Initialise the global subscriber with a custom writer.
pub fn init_with_writer<W>(format: LogFormat, writer: W)
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let builder = fmt().with_env_filter(env_filter()).with_writer(writer);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
