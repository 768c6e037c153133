// ABOUTME: Tracing subscriber initialization and layer composition
// ABOUTME: Combines console, JSON and file layers under one env filter

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, util::SubscriberInitExt};

use crate::config::LoggingConfig;
use crate::layers::{
    BoxedLayer, create_console_layer, create_env_filter, create_file_layer, create_json_layer,
};

/// Keeps the background file writer alive. Drop it on shutdown to flush.
#[must_use = "dropping the guard stops file logging"]
#[derive(Default)]
pub struct LoggingGuard {
    file: Option<WorkerGuard>,
}

impl LoggingGuard {
    pub fn has_file_output(&self) -> bool {
        self.file.is_some()
    }
}

/// Initialize the global tracing subscriber with the given configuration.
pub fn init_subscriber(config: LoggingConfig) -> Result<LoggingGuard> {
    let env_filter = create_env_filter(&config).context("Failed to create environment filter")?;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    layers.extend(create_console_layer(&config.output));
    layers.extend(create_json_layer(&config.output));

    let mut guard = LoggingGuard::default();
    if config.output.file {
        let (layer, file_guard) =
            create_file_layer(&config.file).context("Failed to create file log layer")?;
        layers.push(layer);
        guard.file = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    tracing::info!(
        log_level = %config.level.0,
        console_output = config.output.console,
        file_output = config.output.file,
        json_output = config.output.json,
        file_path = %config.file.path.display(),
        "Sourcebus logging initialized"
    );

    Ok(guard)
}
