//! Telemetry and logging initialization.
//!
//! Structured logging with tracing: pretty or JSON on stdout, plus an
//! optional non-blocking file sink.

use crate::config::LoggingConfig;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// Flushes the file writer on exit; must outlive the subscriber
static LOG_GUARD: Mutex<Option<tracing_appender::non_blocking::WorkerGuard>> = Mutex::new(None);

/// Build the level filter. `RUST_LOG` takes precedence over the configured level.
pub fn build_filter(level: &str) -> anyhow::Result<EnvFilter> {
    match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.trim().is_empty() => Ok(EnvFilter::try_new(directives)?),
        _ => Ok(EnvFilter::try_new(level)?),
    }
}

/// Initialize logging. Fails if a global subscriber is already installed.
pub fn init_telemetry(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = build_filter(&config.level)?;

    let stdout = if config.json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().pretty().boxed()
    };

    let file = match &config.file {
        Some(path) => Some(file_layer(path)?),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(file)
        .try_init()?;
    Ok(())
}

fn file_layer<S>(path: &Path) -> anyhow::Result<Box<dyn Layer<S> + Send + Sync>>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| anyhow::anyhow!("Failed to open log file '{}': {}", path.display(), e))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    if let Ok(mut g) = LOG_GUARD.lock() {
        *g = Some(guard);
    }

    Ok(fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .boxed())
}
