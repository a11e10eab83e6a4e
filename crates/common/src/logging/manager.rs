//! Logging initialization.

use std::io;

use thiserror::Error;
use tracing::*;
use tracing_appender::rolling::{InitError, RollingFileAppender};
use tracing_subscriber::{
    fmt::{layer, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Layer,
};

use super::types::LoggerConfig;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("open log file: {0}")]
    File(#[from] InitError),

    #[error("install subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

/// Default directive when `RUST_LOG` is unset.
fn env_filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy()
}

/// Initializes the logging subsystem with the provided config.
///
/// Fails if a global subscriber is already installed or the log directory
/// cannot be used.
pub fn init(config: LoggerConfig) -> Result<(), LoggingError> {
    let filt = env_filter();

    let writer = if config.stdout_config.use_stderr {
        BoxMakeWriter::new(io::stderr)
    } else {
        BoxMakeWriter::new(io::stdout)
    };

    let stdout_sub = if config.stdout_config.json_format {
        layer()
            .json()
            .with_writer(writer)
            .with_span_events(config.stdout_config.fmt_span.clone())
            .with_filter(filt.clone())
            .boxed()
    } else {
        layer()
            .compact()
            .with_writer(writer)
            .with_span_events(config.stdout_config.fmt_span.clone())
            .with_filter(filt.clone())
            .boxed()
    };

    let file_layer = match config.file_logging_config.as_ref() {
        Some(file_config) => {
            let file_appender = RollingFileAppender::builder()
                .rotation(file_config.rotation.clone())
                .filename_prefix(&file_config.file_name_prefix)
                .build(&file_config.directory)?;

            let layer = if file_config.json_format {
                layer()
                    .json()
                    .with_writer(file_appender)
                    .with_ansi(false) // No color codes in files
                    .with_filter(filt)
                    .boxed()
            } else {
                layer()
                    .compact()
                    .with_writer(file_appender)
                    .with_ansi(false) // No color codes in files
                    .with_filter(filt)
                    .boxed()
            };
            Some(layer)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stdout_sub)
        .with(file_layer)
        .try_init()?;

    info!(
        service_name = %config.service_name,
        service_version = ?config.service_version,
        "logging initialized"
    );
    Ok(())
}
