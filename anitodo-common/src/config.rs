//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration lives in a small TOML file. Everything in it has a
//! compiled default, so a missing file never prevents startup.
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. `ANITODO_ROOT_FOLDER` environment variable
//! 3. `root_folder` key of the TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable consulted for the root folder
pub const ROOT_FOLDER_ENV: &str = "ANITODO_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "anitodo.db";

/// How a source's response body is turned into weekday buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMode {
    /// Body is already `{ "<weekday>": [entry, ...] }`
    WeekdayJson,
    /// bilibili `pgc/web/timeline` response
    BilibiliTimeline,
}

/// Static descriptor of one upstream source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique display name, also the key in partial-error maps
    pub name: String,
    /// URL fetched on every refresh
    pub endpoint: String,
    /// Response format
    pub parse_mode: ParseMode,
}

impl SourceConfig {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, parse_mode: ParseMode) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            parse_mode,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Background refresh settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Minutes between scheduled refreshes
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    /// Per-attempt timeout for a single source fetch
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,

    /// Extra attempts after the first failed fetch of a source
    #[serde(default = "default_retry_times")]
    pub retry_times: u8,

    /// Pause between attempts
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Refresh once immediately when the scheduler starts
    #[serde(default = "default_true")]
    pub run_on_startup: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            source_timeout_secs: default_source_timeout_secs(),
            retry_times: default_retry_times(),
            retry_delay_secs: default_retry_delay_secs(),
            run_on_startup: true,
        }
    }
}

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Configured sources, in fan-out order
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            logging: LoggingConfig::default(),
            refresh: RefreshConfig::default(),
            sources: default_sources(),
        }
    }
}

impl TomlConfig {
    /// Reject configurations the refresh loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.refresh.interval_minutes == 0 {
            return Err(Error::Config("refresh.interval_minutes must be > 0".to_string()));
        }
        if self.refresh.interval_minutes > MAX_INTERVAL_MINUTES {
            return Err(Error::Config(format!(
                "refresh.interval_minutes must be <= {}",
                MAX_INTERVAL_MINUTES
            )));
        }
        if self.refresh.source_timeout_secs == 0 {
            return Err(Error::Config("refresh.source_timeout_secs must be > 0".to_string()));
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(Error::Config("source name must not be empty".to_string()));
            }
            if !names.insert(source.name.as_str()) {
                return Err(Error::Config(format!("duplicate source name: {}", source.name)));
            }
            if !(source.endpoint.starts_with("http://") || source.endpoint.starts_with("https://")) {
                return Err(Error::Config(format!(
                    "source {} has a non-http endpoint: {}",
                    source.name, source.endpoint
                )));
            }
        }
        Ok(())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Longest accepted refresh interval (one week)
pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

fn default_interval_minutes() -> u64 {
    60
}

fn default_source_timeout_secs() -> u64 {
    15
}

fn default_retry_times() -> u8 {
    2
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig::new(
            "bilibili-guochuang",
            "https://api.bilibili.com/pgc/web/timeline?types=4&before=6&after=6",
            ParseMode::BilibiliTimeline,
        ),
        SourceConfig::new(
            "bilibili-fanju",
            "https://api.bilibili.com/pgc/web/timeline?types=1&before=6&after=6",
            ParseMode::BilibiliTimeline,
        ),
    ]
}

/// Default config file location: `<config_dir>/anitodo/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("anitodo").join("config.toml"))
}

/// Load and validate a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
    config.validate()?;
    Ok(config)
}

/// Load the config file if present, falling back to compiled defaults
///
/// A missing file is logged and tolerated; a file that exists but does not
/// parse or validate is an error.
pub fn load_or_default(path: Option<&Path>) -> Result<TomlConfig> {
    let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(p) => p,
        None => {
            warn!("Could not determine config directory, using defaults");
            return Ok(TomlConfig::default());
        }
    };

    if !path.exists() {
        warn!("Config file not found: {}, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let config = load_toml_config(&path)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Write config to disk, creating parent directories
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Resolves the root folder following the documented priority order
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    config_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_config_root(mut self, path: Option<PathBuf>) -> Self {
        self.config_root = path;
        self
    }

    pub fn resolve(&self) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }

        // Priority 3: TOML config file
        if let Some(path) = &self.config_root {
            return path.clone();
        }

        // Priority 4: OS-dependent compiled default
        default_root_folder()
    }
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/anitodo
        dirs::data_local_dir()
            .map(|d| d.join("anitodo"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/anitodo"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("anitodo"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/anitodo"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\anitodo
        dirs::data_local_dir()
            .map(|d| d.join("anitodo"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\anitodo"))
    } else {
        PathBuf::from("./anitodo_data")
    }
}

/// Creates the root folder and knows where the database lives inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root)?;
            info!("Created root folder: {}", self.root.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE_NAME)
    }
}
