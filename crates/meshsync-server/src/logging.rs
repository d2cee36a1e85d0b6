//! Logging initialization
//!
//! Console output plus an optional daily-rotated `meshsync.log` in the
//! configured directory. `RUST_LOG` overrides the configured level for
//! every layer.

use std::path::PathBuf;

use anyhow::{Context, Result};
use meshsync_common::LogSettings;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

pub const LOG_FILE_NAME: &str = "meshsync.log";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub console_output: bool,
    /// Rolling file output is enabled when set
    pub log_dir: Option<PathBuf>,
}

impl LoggingConfig {
    /// Debug mode raises the default level to `debug`.
    pub fn from_settings(settings: &LogSettings, debug: bool) -> Self {
        let level = if debug {
            "debug".to_string()
        } else {
            settings.level.clone()
        };
        Self {
            level,
            console_output: settings.console,
            log_dir: settings
                .dir
                .as_deref()
                .filter(|d| !d.is_empty())
                .map(PathBuf::from),
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Guard that keeps the file writer alive; buffered output is flushed on drop.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let mut file_guard = None;

    if config.console_output {
        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_filter(config.filter());
        layers.push(Box::new(console_layer));
    }

    if let Some(dir) = &config.log_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
        let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_NAME);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);

        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_filter(config.filter());
        layers.push(Box::new(file_layer));
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    if let Some(dir) = &config.log_dir {
        tracing::info!(log_dir = %dir.display(), "File logging initialized");
    }

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_raises_level() {
        let settings = LogSettings::default();
        assert_eq!(LoggingConfig::from_settings(&settings, false).level, "info");
        assert_eq!(LoggingConfig::from_settings(&settings, true).level, "debug");
    }

    #[test]
    fn test_empty_dir_disables_file_output() {
        let settings = LogSettings {
            dir: Some(String::new()),
            ..Default::default()
        };
        assert!(LoggingConfig::from_settings(&settings, false).log_dir.is_none());
    }
}
