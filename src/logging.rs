//! `tracing` integration
//!
//! Routes formatted log records into a [`SerializedSink`]. Events emitted by
//! this crate's own modules go to stderr instead, since they can fire while the
//! sink lock is held.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::Subscriber;
use tracing_subscriber::filter::{filter_fn, EnvFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::clock::Clock;
use crate::config::SinkConfig;
use crate::sink::SerializedSink;

/// Record format written to the sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Level and format for the file logger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset, e.g. `info` or `app=debug`
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

/// Keeps the file logger alive; closing the sink on drop flushes buffered records
pub struct LoggingGuard<C: Clock = crate::clock::SystemClock> {
    sink: SerializedSink<C>,
}

impl<C: Clock> LoggingGuard<C> {
    /// The sink the subscriber writes to
    pub fn sink(&self) -> &SerializedSink<C> {
        &self.sink
    }
}

impl<C: Clock> Drop for LoggingGuard<C> {
    fn drop(&mut self) {
        if let Err(e) = self.sink.close() {
            eprintln!("Failed to close log file: {}", e);
        }
    }
}

/// Map a level name to a filter directive
///
/// Accepts `trace`, `debug`, `info`, `warn`, `error`; `panic` and `fatal`
/// collapse to `error`. Anything else is treated as a full directive.
pub fn level_directive(level: &str) -> String {
    match level.trim().to_ascii_lowercase().as_str() {
        "panic" | "fatal" => "error".to_string(),
        "warning" => "warn".to_string(),
        other => other.to_string(),
    }
}

fn is_sink_internal(target: &str) -> bool {
    target.starts_with(concat!(env!("CARGO_CRATE_NAME"), "::"))
}

/// Filter from `RUST_LOG`, falling back to the configured level
pub fn env_filter(logging: &LoggingConfig) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level_directive(&logging.level)))
        .with_context(|| format!("Invalid log level {:?}", logging.level))
}

/// Build a subscriber writing to `sink` without installing it
pub fn build_subscriber<C: Clock + 'static>(
    sink: SerializedSink<C>,
    filter: EnvFilter,
    format: LogFormat,
) -> Box<dyn Subscriber + Send + Sync> {
    let not_internal = filter_fn(|meta| !is_sink_internal(meta.target()));
    let file_layer = match format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_writer(sink)
            .with_ansi(false)
            .with_target(true)
            .with_filter(not_internal)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(sink)
            .with_target(true)
            .with_filter(not_internal)
            .boxed(),
    };

    let internal_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(filter_fn(|meta| is_sink_internal(meta.target())));

    Box::new(
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(internal_layer),
    )
}

/// Install a global subscriber that writes into a rotating file sink
///
/// Returns a guard that must be kept alive for the duration of logging.
pub fn init_file_logging(config: &SinkConfig, logging: &LoggingConfig) -> Result<LoggingGuard> {
    let sink = SerializedSink::open(config.clone()).context("Failed to open log sink")?;

    build_subscriber(sink.clone(), env_filter(logging)?, logging.format)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::debug!("File logging installed at {}", config.path);

    Ok(LoggingGuard { sink })
}
