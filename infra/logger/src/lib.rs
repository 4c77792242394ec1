//! # Logger
//!
//! Installs the process-wide `tracing` subscriber for applications hosting a
//! message bus tree: a console layer, an optional rolling file layer written
//! through a non-blocking worker, and an [`EnvFilter`](tracing_subscriber::EnvFilter)
//! combining a default level with `RUST_LOG` or explicit directives.
//!
//! ## Example
//!
//! ```rust
//! use canopy_logger::{LevelFilter, Logger};
//!
//! let _logger = Logger::builder()
//!     .name("canopy")
//!     .level(LevelFilter::DEBUG)
//!     .env_filter("canopy_bus=trace,info")
//!     .init()
//!     .unwrap();
//!
//! tracing::info!("ready");
//! ```

mod config;
mod error;

pub use crate::config::{LogFormat, LoggerConfig};
pub use crate::error::{LoggerError, LoggerErrorExt};
pub use tracing::level_filters::LevelFilter;
pub use tracing_appender::rolling::Rotation;

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{Subscriber, debug};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

const LOG_FILE_SUFFIX: &str = "log";

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Configures and installs the global subscriber.
#[derive(Debug, Default)]
#[must_use = "The builder does nothing until `init` is called."]
pub struct LoggerBuilder {
    config: LoggerConfig,
}

impl LoggerBuilder {
    /// Application name; also the prefix of rolling log files (`<name>.<date>.log`).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Default level for targets without an explicit directive.
    pub const fn level(mut self, level: LevelFilter) -> Self {
        self.config.level = level;
        self
    }

    /// Explicit filter directives (e.g. `canopy_bus=trace,info`), used instead of `RUST_LOG`.
    pub fn env_filter(mut self, directives: impl Into<String>) -> Self {
        self.config.env_filter = Some(directives.into());
        self
    }

    pub const fn console(mut self, enabled: bool) -> Self {
        self.config.console = enabled;
        self
    }

    /// Also writes to rolling files under `path`, created if missing.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = Some(path.into());
        self
    }

    /// Emits one JSON object per event on every enabled output.
    pub const fn json(mut self) -> Self {
        self.config.format = LogFormat::Json;
        self
    }

    pub const fn rotation(mut self, rotation: Rotation) -> Self {
        self.config.rotation = rotation;
        self
    }

    pub const fn max_files(mut self, max: usize) -> Self {
        self.config.max_files = max;
        self
    }

    /// Replaces every setting at once, e.g. with a config assembled from CLI flags.
    pub fn config(mut self, config: LoggerConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the settings and installs the global subscriber.
    ///
    /// The returned [`Logger`] owns the file writer's worker guard; keep it alive
    /// for as long as events should reach the log files.
    ///
    /// # Errors
    /// - [`LoggerError::InvalidConfiguration`] for invalid settings or filter directives.
    /// - [`LoggerError::Internal`] if the log directory cannot be created.
    /// - [`LoggerError::Appender`] if the rolling file appender cannot be built.
    /// - [`LoggerError::Subscriber`] if a global subscriber is already installed.
    pub fn init(self) -> Result<Logger, LoggerError> {
        let config = self.config;
        config.validate()?;
        let filter = config.env_filter()?;

        let mut layers: Vec<BoxedLayer<_>> = Vec::new();
        if config.console {
            layers.push(console_layer(config.format));
        }

        let guard = match &config.path {
            Some(path) => {
                let (file, guard) = file_layer(&config, path)?;
                layers.push(file);
                Some(guard)
            },
            None => None,
        };

        tracing_subscriber::registry().with(filter).with(layers).try_init()?;

        debug!(
            name = %config.name,
            level = %config.level,
            file = config.path.as_ref().map(|p| p.display().to_string()).as_deref(),
            "Logger initialized"
        );

        Ok(Logger { guard, config })
    }
}

fn console_layer<S>(format: LogFormat) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    match format {
        LogFormat::Compact => layer().compact().with_ansi(true).boxed(),
        LogFormat::Json => layer().json().boxed(),
    }
}

fn file_layer<S>(
    config: &LoggerConfig,
    path: &Path,
) -> Result<(BoxedLayer<S>, WorkerGuard), LoggerError>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fs::create_dir_all(path).context(format!("Failed to create path: {}", path.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(config.rotation.clone())
        .filename_prefix(&config.name)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(config.max_files)
        .build(path)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = layer().with_writer(writer).with_ansi(false);
    let layer = match config.format {
        LogFormat::Compact => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    };
    Ok((layer, guard))
}

/// Handle to the installed logging system.
///
/// Dropping it stops the file writer after flushing buffered events, so hold it
/// until shutdown.
#[must_use = "Dropping this handle stops the background file writer."]
#[derive(Debug)]
pub struct Logger {
    guard: Option<WorkerGuard>,
    config: LoggerConfig,
}

impl Logger {
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::default()
    }

    /// Settings the subscriber was installed with.
    #[must_use]
    pub const fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// Whether events are also written to rolling files.
    #[must_use]
    pub const fn writes_files(&self) -> bool {
        self.guard.is_some()
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        if self.guard.is_some() {
            debug!(name = %self.config.name, "Logger shutting down, flushing file writer");
        }
    }
}
