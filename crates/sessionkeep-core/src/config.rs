//! Configuration management for sessionkeep
//!
//! Handles loading and validation of `sessionkeep.toml`. Every section and
//! field is optional; a missing file at the default location yields defaults.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logging::LogConfig;
use crate::snapshot::DEFAULT_SHELL_WRAPPER_TOKEN;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "SK_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub watcher: WatcherConfig,

    #[serde(default)]
    pub replay: ReplayConfig,

    #[serde(default)]
    pub controller: ControllerConfig,

    #[serde(default)]
    pub logging: LogConfig,
}

// =============================================================================
// Store
// =============================================================================

/// Which persistence backend holds session layouts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Json,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Store file path; defaults depend on the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SQLite busy timeout in milliseconds
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl StoreConfig {
    /// Store path with `~` expanded and the backend default applied.
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        let raw = self.path.as_deref().unwrap_or(match self.backend {
            StoreBackend::Sqlite => "~/.local/share/sessionkeep/state.db",
            StoreBackend::Json => "~/.local/share/sessionkeep/state.json",
        });
        expand_tilde(raw)
    }
}

// =============================================================================
// Watcher
// =============================================================================

/// Change watcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Command basenames whose start never triggers a refresh
    #[serde(default = "default_ignored_commands")]
    pub ignored_commands: Vec<String>,

    /// Windows whose argv contains one of these (by basename) are never tracked
    #[serde(default = "default_excluded_prompt_commands")]
    pub excluded_prompt_commands: Vec<String>,

    /// Skip the store write when the captured topology did not change
    #[serde(default = "default_true")]
    pub skip_unchanged: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            ignored_commands: default_ignored_commands(),
            excluded_prompt_commands: default_excluded_prompt_commands(),
            skip_unchanged: true,
        }
    }
}

fn default_ignored_commands() -> Vec<String> {
    [
        "cd", "ls", "ll", "la", "pwd", "clear", "git", "z", "zoxide", "exa", "eza", "tree",
        "echo", "exit", "history",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

pub(crate) fn default_excluded_prompt_commands() -> Vec<String> {
    vec!["ask".to_string()]
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Replay
// =============================================================================

/// Replay configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Keep windows open after their program exits
    #[serde(default = "default_true")]
    pub hold: bool,

    /// Per controller call timeout; 0 disables
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Close the invoking window once replay finishes
    #[serde(default = "default_true")]
    pub close_origin: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            hold: true,
            call_timeout_ms: default_call_timeout_ms(),
            close_origin: true,
        }
    }
}

fn default_call_timeout_ms() -> u64 {
    10_000
}

// =============================================================================
// Controller
// =============================================================================

/// Terminal remote-control configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Binary used for `@` remote-control commands
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Remote-control socket (`unix:/path`); unset talks to the enclosing terminal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket: Option<String>,

    /// argv token identifying a "run one shell command" wrapper process
    #[serde(default = "default_shell_wrapper_token")]
    pub shell_wrapper_token: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            socket: None,
            shell_wrapper_token: default_shell_wrapper_token(),
        }
    }
}

fn default_binary() -> String {
    "kitty".to_string()
}

fn default_shell_wrapper_token() -> String {
    DEFAULT_SHELL_WRAPPER_TOKEN.to_string()
}

/// Logging output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}. Expected pretty or json")),
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

impl Config {
    /// Default config file location.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sessionkeep").join("sessionkeep.toml"))
    }

    /// Load from `$SK_CONFIG` or the default location.
    ///
    /// An explicit path must exist; a missing default file means defaults.
    pub fn load() -> crate::Result<Self> {
        if let Some(explicit) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            return Self::load_from(Path::new(&explicit));
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> crate::Result<Self> {
        let display = path.display().to_string();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(display).into());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(display, e.to_string()))?;
        let config = Self::from_toml(&text)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeFailed(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.store.path {
            if path.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "store.path must not be empty".to_string(),
                ));
            }
        }
        if self.controller.binary.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "controller.binary must not be empty".to_string(),
            ));
        }
        if self.controller.shell_wrapper_token.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "controller.shell_wrapper_token must not be empty".to_string(),
            ));
        }
        if self.logging.level.parse::<crate::logging::LogLevel>().is_err() {
            return Err(ConfigError::ValidationError(format!(
                "logging.level is not a log level: {}",
                self.logging.level
            )));
        }
        Ok(())
    }
}

/// Expand a leading `~` to the home directory.
#[must_use]
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    if let Some(suffix) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(suffix);
        }
    }
    PathBuf::from(path)
}
