use crate::error::LoggerError;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::EnvFilter;

const DEFAULT_MAX_FILES: usize = 10;

/// Line format shared by the console and file layers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Single-line human readable output.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

/// Settings collected by [`crate::LoggerBuilder`] and checked at `init`.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub name: String,
    pub level: LevelFilter,
    pub env_filter: Option<String>,
    pub console: bool,
    pub path: Option<PathBuf>,
    pub format: LogFormat,
    pub rotation: Rotation,
    pub max_files: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            level: LevelFilter::INFO,
            env_filter: None,
            console: true,
            path: None,
            format: LogFormat::Compact,
            rotation: Rotation::DAILY,
            max_files: DEFAULT_MAX_FILES,
        }
    }
}

impl LoggerConfig {
    /// Rejects settings that would produce no output or unusable file names.
    ///
    /// # Errors
    /// Returns [`LoggerError::InvalidConfiguration`] describing the first problem found.
    pub fn validate(&self) -> Result<(), LoggerError> {
        if self.name.trim().is_empty() {
            return Err(LoggerError::invalid("Logger name cannot be empty"));
        }
        if self.max_files == 0 {
            return Err(LoggerError::invalid("max_files must be greater than zero"));
        }
        if !self.console && self.path.is_none() {
            return Err(LoggerError::invalid(
                "No logging layers enabled. Enable console or file output.",
            ));
        }
        Ok(())
    }

    /// Builds the filter: the explicit directives when set, `RUST_LOG` otherwise, both
    /// on top of `level` as the default directive.
    ///
    /// # Errors
    /// Returns [`LoggerError::InvalidConfiguration`] if the explicit directives do not parse.
    pub fn env_filter(&self) -> Result<EnvFilter, LoggerError> {
        let builder = EnvFilter::builder().with_default_directive(self.level.into());
        match &self.env_filter {
            Some(directives) => builder.parse(directives).map_err(|e| {
                LoggerError::invalid(format!("Invalid env filter '{directives}': {e}"))
            }),
            None => Ok(builder.from_env_lossy()),
        }
    }
}
