//! Logging setup on top of the tracing ecosystem.
//!
//! # Environment Variables
//!
//! - `QAGALLERY_LOG`: Filter directive (like `RUST_LOG`), e.g., `qagallery_store=debug`
//! - `QAGALLERY_LOG_FORMAT`: Output format for stderr: `pretty`, `json`, `compact`
//! - `QAGALLERY_LOG_DIR`: Directory for file logs (overrides `[logging.file] directory`)
//!
//! # Configuration
//!
//! ```toml
//! [logging]
//! level = "warn"
//! format = "pretty"
//!
//! [logging.file]
//! enabled = false
//! ```
//!
//! # Example
//!
//! ```no_run
//! use qagallery_core::logging::{self, LogSettings};
//!
//! let _guard = logging::init_logging(Some(LogSettings::new().with_level("debug")))?;
//! # Ok::<(), qagallery_core::Error>(())
//! ```

use crate::Error;
use crate::config::{FileLoggingConfig, LoggingConfig};
use std::env;
use std::io;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format for stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Pretty, human-readable output with colors (default for TTY)
    #[default]
    Pretty,
    /// JSON output (one line per event)
    Json,
    /// Compact, single-line output
    Compact,
}

impl LogFormat {
    pub const VALUES: &[LogFormat] = &[LogFormat::Pretty, LogFormat::Json, LogFormat::Compact];

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pretty" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            "compact" => Some(LogFormat::Compact),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
            LogFormat::Compact => "compact",
        }
    }
}

/// Resolved logging settings, built from the `[logging]` config section.
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Default log level for stderr output.
    pub level: String,
    /// Output format for stderr; `None` picks by TTY detection.
    pub format: Option<LogFormat>,
    /// File logging configuration (optional).
    pub file: Option<FileLoggingConfig>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { level: "warn".to_string(), format: None, file: None }
    }
}

impl From<LoggingConfig> for LogSettings {
    fn from(config: LoggingConfig) -> Self {
        Self {
            level: config.level,
            format: LogFormat::parse_str(&config.format),
            file: if config.file.enabled { Some(config.file) } else { None },
        }
    }
}

impl LogSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_file_logging(mut self, config: FileLoggingConfig) -> Self {
        self.file = Some(config);
        self
    }

    /// Build an EnvFilter from these settings and environment variables.
    fn build_env_filter(&self) -> EnvFilter {
        let filter = env::var("QAGALLERY_LOG")
            .ok()
            .or_else(|| env::var("RUST_LOG").ok())
            .unwrap_or_else(|| self.level.clone());

        EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new(&self.level))
    }

    fn is_tty() -> bool {
        atty::is(atty::Stream::Stderr)
    }

    /// Environment beats config; without either, pretty on a TTY and compact otherwise.
    fn detect_format(&self) -> LogFormat {
        if let Ok(fmt_str) = env::var("QAGALLERY_LOG_FORMAT")
            && let Some(fmt) = LogFormat::parse_str(&fmt_str)
        {
            return fmt;
        }

        if let Some(fmt) = self.format {
            return fmt;
        }

        if Self::is_tty() { LogFormat::Pretty } else { LogFormat::Compact }
    }

    fn log_dir(file: &FileLoggingConfig) -> Result<PathBuf, Error> {
        if let Ok(custom_dir) = env::var("QAGALLERY_LOG_DIR") {
            return Ok(PathBuf::from(custom_dir));
        }
        if let Some(dir) = &file.directory {
            return Ok(dir.clone());
        }

        let home = env::var("HOME")
            .or_else(|_| env::var("USERPROFILE"))
            .map_err(|_| Error::Config("Could not determine home directory".to_string()))?;

        Ok(PathBuf::from(home).join(".qagallery").join("logs"))
    }
}

/// Initialize the global tracing subscriber.
///
/// Sets up an env-based filter, formatted stderr output, and, when file
/// logging is enabled, a daily-rolling JSON log. Keep the returned guard alive
/// for the life of the program so buffered file logs are flushed.
pub fn init_logging(settings: Option<LogSettings>) -> Result<Option<WorkerGuard>, Error> {
    let settings = settings.unwrap_or_default();
    let env_filter = settings.build_env_filter();
    let format = settings.detect_format();

    let registry = Registry::default().with(env_filter);

    if let Some(file_config) = &settings.file {
        let log_dir = LogSettings::log_dir(file_config)?;
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| Error::Config(format!("Failed to create log directory: {}", e)))?;

        let file_appender = tracing_appender::rolling::daily(log_dir, "qagallery.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        match format {
            LogFormat::Pretty => {
                registry
                    .with(fmt::layer().pretty().with_writer(io::stderr).with_ansi(true))
                    .with(fmt::layer().json().with_writer(non_blocking))
                    .try_init()
                    .map_err(|e| Error::Config(format!("Failed to install subscriber: {}", e)))?;
            }
            LogFormat::Json => {
                registry
                    .with(fmt::layer().json().with_writer(io::stderr))
                    .with(fmt::layer().json().with_writer(non_blocking))
                    .try_init()
                    .map_err(|e| Error::Config(format!("Failed to install subscriber: {}", e)))?;
            }
            LogFormat::Compact => {
                registry
                    .with(fmt::layer().compact().with_writer(io::stderr))
                    .with(fmt::layer().json().with_writer(non_blocking))
                    .try_init()
                    .map_err(|e| Error::Config(format!("Failed to install subscriber: {}", e)))?;
            }
        }

        return Ok(Some(guard));
    }

    let installed = match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(io::stderr).with_ansi(true))
            .try_init(),
        LogFormat::Json => registry.with(fmt::layer().json().with_writer(io::stderr)).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact().with_writer(io::stderr)).try_init(),
    };
    installed.map_err(|e| Error::Config(format!("Failed to install subscriber: {}", e)))?;

    Ok(None)
}

/// Sanitize file paths for display (home directory becomes `~`).
pub fn sanitize_path(path: &std::path::Path) -> String {
    if let Ok(home) = env::var("HOME")
        && home != "/"
        && let Ok(stripped) = path.strip_prefix(&home)
    {
        return format!("~/{}", stripped.display());
    }

    path.display().to_string()
}
