use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::retry::RetryConfig;

/// Which tier serves reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    /// Compiled-in seed questions, nothing persisted
    Memory,
    /// The local cache file, timestamp ids
    Local,
    /// SQLite database, the authoritative store (default)
    #[default]
    Sqlite,
}

impl StoreBackend {
    pub const VALUES: &[StoreBackend] = &[StoreBackend::Memory, StoreBackend::Local, StoreBackend::Sqlite];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Local => "local",
            StoreBackend::Sqlite => "sqlite",
        }
    }
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "local" => Ok(StoreBackend::Local),
            "sqlite" => Ok(StoreBackend::Sqlite),
            _ => Err(crate::Error::Config(ConfigError::InvalidBackend(s.to_string()).to_string())),
        }
    }
}

/// `[store]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// JSON file holding the local cache slots
    #[serde(default = "default_local_cache_path")]
    pub local_cache_path: PathBuf,
}

fn default_database_path() -> PathBuf {
    PathBuf::from(".qagallery/questions.db")
}

fn default_local_cache_path() -> PathBuf {
    PathBuf::from(".qagallery/local_cache.json")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            database_path: default_database_path(),
            local_cache_path: default_local_cache_path(),
        }
    }
}

/// `[fetch]` section: retry policy for list reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { max_attempts: default_max_attempts(), retry_delay_ms: default_retry_delay_ms() }
    }
}

impl FetchConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::from_options(self.max_attempts, self.retry_delay_ms)
    }
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter directive for stderr output
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty`, `json`, or `compact`
    #[serde(default = "default_log_format")]
    pub format: String,

    #[serde(default)]
    pub file: FileLoggingConfig,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format(), file: FileLoggingConfig::default() }
    }
}

/// `[logging.file]` section
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileLoggingConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Log directory; `~/.qagallery/logs` when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

/// Root configuration structure for qagallery.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML string
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml_str).map_err(|e| crate::Error::Config(ConfigError::from(e).to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Resolve store paths against a base directory
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        if self.store.database_path.is_relative() {
            self.store.database_path = base.join(&self.store.database_path);
        }
        if self.store.local_cache_path.is_relative() {
            self.store.local_cache_path = base.join(&self.store.local_cache_path);
        }
        self
    }

    fn validate(&self) -> Result<()> {
        use crate::Error;

        if self.fetch.max_attempts == 0 {
            return Err(Error::Config(ConfigError::InvalidValue("fetch.max_attempts must be at least 1".into()).to_string()));
        }
        if self.store.database_path.as_os_str().is_empty() {
            return Err(Error::Config(ConfigError::InvalidValue("store.database_path is empty".into()).to_string()));
        }
        if self.store.local_cache_path.as_os_str().is_empty() {
            return Err(Error::Config(ConfigError::InvalidValue("store.local_cache_path is empty".into()).to_string()));
        }
        Ok(())
    }

    /// Example configuration (as a string)
    pub fn example() -> &'static str {
        r#"# qagallery configuration

[store]
# "memory" (seed questions only), "local" (local cache file), or "sqlite"
backend = "sqlite"
# Relative paths resolve against the working directory
database_path = ".qagallery/questions.db"
local_cache_path = ".qagallery/local_cache.json"

[fetch]
# Attempts per list read before the error is shown
max_attempts = 3
retry_delay_ms = 1000

[logging]
level = "warn"
format = "pretty"

[logging.file]
enabled = false
# directory = "/var/log/qagallery"
"#
    }
}

/// Configuration-specific errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Unknown store backend
    #[error("invalid store backend: {0}")]
    InvalidBackend(String),

    /// Out-of-range or empty value
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::TomlParse(err.to_string())
    }
}
