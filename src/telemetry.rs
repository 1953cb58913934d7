//! Structured logging setup shared by the binaries.
//!
//! Logs always go to stderr: the MCP server speaks its protocol on stdout and
//! a stray log line there would corrupt the stream.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{Result, WeatherError};

/// `RUST_LOG` takes precedence over the configured filter.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|err| WeatherError::Config(format!("invalid log filter `{}`: {err}", config.filter))),
    }
}

/// Installs the global subscriber. Calling it twice is a no-op.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::NONE)
        .with_target(false);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };

    if let Err(err) = installed {
        tracing::debug!(error = %err, "tracing subscriber already installed");
    }
    Ok(())
}
