use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::cli::LogFormat;

const DEFAULT_DIRECTIVES: &str = "info";

/// Installs the global subscriber. Output goes to stderr so the LSP stdio
/// stream on stdout stays clean.
pub fn init_tracing(format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_DIRECTIVES))
        .context("invalid log filter")?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match format {
        LogFormat::Human => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    result.context("failed to install tracing subscriber")?;
    tracing::debug!(format = format.as_str(), "tracing initialized");
    Ok(())
}
