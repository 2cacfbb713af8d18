use anyhow::{Context, bail};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

use crate::config::AppConfig;

fn rotation(name: &str) -> anyhow::Result<Rotation> {
    Ok(match name {
        "minutely" => Rotation::MINUTELY,
        "hourly" => Rotation::HOURLY,
        "daily" => Rotation::DAILY,
        "never" => Rotation::NEVER,
        other => bail!("Unknown log rotation: {other}"),
    })
}

/// Rolling appender for `log_dir/log_file`, pruned to `max_log_files` if set.
pub fn file_appender(config: &AppConfig) -> anyhow::Result<RollingFileAppender> {
    let mut builder = RollingFileAppender::builder()
        .rotation(rotation(&config.rotation)?)
        .filename_prefix(&config.log_file);
    if let Some(max) = config.max_log_files {
        builder = builder.max_log_files(max);
    }
    builder
        .build(&config.log_dir)
        .with_context(|| format!("Failed to open log directory {}", config.log_dir))
}

/// Install the global subscriber. `RUST_LOG` takes precedence over
/// `log_level`. Keep the guard alive until exit.
pub fn init_logging(config: &AppConfig) -> anyhow::Result<WorkerGuard> {
    let (writer, guard) = tracing_appender::non_blocking(file_appender(config)?);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .with_context(|| format!("Invalid log level: {}", config.log_level))?;

    let file_layer = if config.use_json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(writer)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(writer)
            .boxed()
    };
    // JSON output is for collectors, the console only gets text
    let stdout_layer = (!config.use_json).then(|| fmt::layer().with_target(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(guard)
}
