// ABOUTME: Layer constructors for console, JSON and rolling-file log output
// ABOUTME: Each returns a boxed layer so the subscriber can compose whichever are enabled

use anyhow::{Context, Result};
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan},
};

use crate::config::{FileConfig, LEVEL_ENV, LoggingConfig, OutputConfig};

pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Human-readable console layer. Disabled when JSON output is requested.
pub fn create_console_layer(config: &OutputConfig) -> Option<BoxedLayer> {
    if !config.console || config.json {
        return None;
    }

    let layer: BoxedLayer = if config.pretty_console {
        fmt::layer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .pretty()
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .compact()
            .boxed()
    };

    Some(layer)
}

/// JSON lines on stdout for structured log collection.
pub fn create_json_layer(config: &OutputConfig) -> Option<BoxedLayer> {
    if !config.json {
        return None;
    }

    let layer = fmt::layer()
        .json()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .boxed();

    Some(layer)
}

/// Daily-rolling file layer. The returned guard flushes the writer on drop.
pub fn create_file_layer(config: &FileConfig) -> Result<(BoxedLayer, WorkerGuard)> {
    let directory = config
        .path
        .parent()
        .context("Log file path has no parent directory")?;

    fs::create_dir_all(directory).context(format!(
        "Failed to create log directory: {}",
        directory.display()
    ))?;

    let file_name = config
        .path
        .file_name()
        .and_then(|n| n.to_str())
        .context("Invalid log file path")?;

    let file_appender = rolling::daily(directory, file_name);
    let (writer, guard) = non_blocking(file_appender);

    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .boxed();

    Ok((layer, guard))
}

/// Build the level filter. RUST_LOG is used as-is unless SOURCEBUS_LOG is set.
pub fn create_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directives = select_directives(config, std::env::var(LEVEL_ENV).is_ok(), rust_log);
    EnvFilter::try_new(&directives).context(format!("Invalid filter directives '{directives}'"))
}

fn select_directives(
    config: &LoggingConfig,
    level_env_set: bool,
    rust_log: Option<String>,
) -> String {
    match rust_log {
        Some(rust_log) if !level_env_set => rust_log,
        _ => config.filter_directives(),
    }
}
