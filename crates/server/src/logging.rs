use anyhow::{anyhow, Result};
use std::io::Write;
use std::str::FromStr;
use tiergate_core::config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "plain" | "text" | "pretty" => Ok(LogFormat::Plain),
            other => Err(anyhow!("unknown log format '{}'", other)),
        }
    }
}

/// `RUST_LOG` wins; otherwise the configured level.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| anyhow!("invalid log filter '{}': {}", config.level, e))
}

/// Installs the global subscriber. Keep the guard alive until exit or
/// buffered lines are lost.
pub fn init_logging<W>(config: &LoggingConfig, sink: W) -> Result<WorkerGuard>
where
    W: Write + Send + 'static,
{
    let format: LogFormat = config.format.parse()?;
    let filter = build_filter(config)?;
    let (writer, guard) = tracing_appender::non_blocking(sink);

    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(writer);

    let installed = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Plain => builder.try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))?;

    Ok(guard)
}
