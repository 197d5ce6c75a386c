//! Configuration management
//!
//! Settings come from a TOML file (explicit path or the platform config
//! directory), then environment variables override individual fields.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage settings
    #[serde(default)]
    pub database: DatabaseConfig,
    /// How feedback writes are applied
    #[serde(default)]
    pub feedback: FeedbackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    data_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("ml-monitor.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Strategy for the "insert feedback, flag the inference" pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackWriteMode {
    /// Both writes in one transaction
    #[default]
    Transactional,
    /// Two independent writes; a failure between them leaves the flag unset
    Sequential,
}

impl std::str::FromStr for FeedbackWriteMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "transactional" => Ok(FeedbackWriteMode::Transactional),
            "sequential" => Ok(FeedbackWriteMode::Sequential),
            other => anyhow::bail!("Unknown feedback write mode '{}' (expected transactional or sequential)", other),
        }
    }
}

impl std::fmt::Display for FeedbackWriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedbackWriteMode::Transactional => write!(f, "transactional"),
            FeedbackWriteMode::Sequential => write!(f, "sequential"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedbackConfig {
    #[serde(default)]
    pub write_mode: FeedbackWriteMode,
}

pub const ENV_HOST: &str = "ML_MONITOR_HOST";
pub const ENV_PORT: &str = "ML_MONITOR_PORT";
pub const ENV_DB_PATH: &str = "ML_MONITOR_DB_PATH";
pub const ENV_FEEDBACK_MODE: &str = "ML_MONITOR_FEEDBACK_MODE";

impl Config {
    /// Load configuration from `path`, or from the default location when `None`.
    ///
    /// A missing file means defaults. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };

        let mut config = if config_path.exists() {
            Self::from_file(&config_path)?
        } else {
            if path.is_some() {
                anyhow::bail!("Config file not found: {}", config_path.display());
            }
            tracing::debug!("No config at {}, using defaults", config_path.display());
            Config::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Apply `ML_MONITOR_*` overrides read through `lookup`. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(host) = get(ENV_HOST) {
            self.server.host = host;
        }
        if let Some(port) = get(ENV_PORT) {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid {}: {}", ENV_PORT, port))?;
        }
        if let Some(db_path) = get(ENV_DB_PATH) {
            self.database.path = PathBuf::from(db_path);
        }
        if let Some(mode) = get(ENV_FEEDBACK_MODE) {
            self.feedback.write_mode = mode
                .parse()
                .with_context(|| format!("Invalid {}", ENV_FEEDBACK_MODE))?;
        }
        Ok(())
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "ml-monitor", "ml-monitor")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "ml-monitor", "ml-monitor")
        .context("Failed to get project directories")?;
    Ok(base.data_dir().to_path_buf())
}
