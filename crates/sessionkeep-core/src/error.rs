//! Error types for sessionkeep-core

use std::fmt::Write;
use thiserror::Error;

use crate::identify::IdentifyError;
use crate::logging::LogError;
use crate::replay::ReplayError;
use crate::snapshot::SnapshotError;
use crate::topology::ModelError;

/// Remediation command for resolving an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemediationCommand {
    /// Short label describing the command purpose
    pub label: String,
    /// Command to run
    pub command: String,
}

/// Actionable remediation guidance for an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Remediation {
    /// One-line summary of how to fix the issue
    pub summary: String,
    /// Suggested commands to resolve or diagnose the issue
    pub commands: Vec<RemediationCommand>,
    /// Additional alternative guidance
    pub alternatives: Vec<String>,
}

impl Remediation {
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            commands: Vec::new(),
            alternatives: Vec::new(),
        }
    }

    #[must_use]
    pub fn command(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.commands.push(RemediationCommand {
            label: label.into(),
            command: command.into(),
        });
        self
    }

    #[must_use]
    pub fn alternative(mut self, alternative: impl Into<String>) -> Self {
        self.alternatives.push(alternative.into());
        self
    }

    /// Render remediation text for human-readable output
    #[must_use]
    pub fn render_plain(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "To fix:");
        let _ = writeln!(output, "  {}", self.summary);

        if !self.commands.is_empty() {
            let _ = writeln!(output, "  Commands:");
            for cmd in &self.commands {
                let _ = writeln!(output, "    - {}: {}", cmd.label, cmd.command);
            }
        }

        if !self.alternatives.is_empty() {
            let _ = writeln!(output, "  Alternatives:");
            for alt in &self.alternatives {
                let _ = writeln!(output, "    - {alt}");
            }
        }

        output
    }
}

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sessionkeep-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid topology: {0}")]
    Model(#[from] ModelError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Controller error: {0}")]
    Controller(#[from] ControllerError),

    #[error("Replay error: {0}")]
    Replay(#[from] ReplayError),

    #[error("Identify error: {0}")]
    Identify(#[from] IdentifyError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging error: {0}")]
    Log(#[from] LogError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Background task failures (join errors, closed channels)
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl Error {
    /// Return remediation guidance when available.
    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::Model(_) => Some(
                Remediation::new("The session layout is incomplete; capture it again.")
                    .command("Forget the stored layout", "sk forget <name>")
                    .alternative("Every tab needs at least one window with an absolute cwd."),
            ),
            Self::Snapshot(_) => Some(
                Remediation::new("The terminal returned unexpected introspection output.")
                    .command("Inspect raw output", "kitty @ ls")
                    .alternative("Upgrade kitty if the `ls` format changed."),
            ),
            Self::Store(err) => Some(err.remediation()),
            Self::Controller(err) => Some(err.remediation()),
            Self::Replay(err) => err.remediation(),
            Self::Identify(_) => Some(
                Remediation::new("Could not determine which session the window belongs to.")
                    .command("Inspect raw output", "kitty @ ls")
                    .alternative("Open the project with `sk open <dir>` to tag its windows."),
            ),
            Self::Config(err) => Some(err.remediation()),
            Self::Log(_) => Some(
                Remediation::new("Check the log file path and log level.")
                    .alternative("Valid levels: trace, debug, info, warn, error."),
            ),
            Self::Io(_) => Some(
                Remediation::new("Check filesystem permissions and paths, then retry.")
                    .alternative("Verify the data directory exists and is writable."),
            ),
            Self::Json(_) => Some(
                Remediation::new("Validate the JSON input and retry.")
                    .alternative("Check for trailing commas or invalid UTF-8."),
            ),
            Self::Runtime(_) => None,
        }
    }
}

/// Session store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("No session named {0}")]
    NotFound(String),

    #[error("Stored session data is corrupt: {details}")]
    Corrupt { details: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize session: {0}")]
    Serialization(String),

    #[error("Failed to lock store: {0}")]
    Lock(String),
}

impl StoreError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::NotFound(_) => Remediation::new("No layout has been captured for this session yet.")
                .command("List sessions", "sk list")
                .alternative("Open the project with `sk open <dir>` to start tracking it."),
            Self::Corrupt { .. } => Remediation::new(
                "The store file could not be decoded. Move it aside to start fresh.",
            )
            .command("Show config", "sk config")
            .alternative("Restore the store file from a backup."),
            Self::Database(_) => Remediation::new(
                "Database operation failed. Check data directory permissions and retry.",
            )
            .alternative("Ensure no other tool holds a long write lock on the database."),
            Self::Io(_) | Self::Lock(_) => {
                Remediation::new("Check that the store path is writable and retry.")
                    .command("Show config", "sk config")
            }
            Self::Serialization(_) => {
                Remediation::new("The session could not be encoded. Retry the capture.")
            }
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Workspace controller (terminal remote control) errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("Terminal control binary not found: {0}")]
    BinaryNotFound(String),

    #[error("Terminal is not accepting remote control commands")]
    NotRunning,

    #[error("Launch failed: {0}")]
    LaunchFailed(String),

    #[error("Unknown layout: {0}")]
    UnknownLayout(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Failed to parse controller output: {0}")]
    ParseError(String),

    #[error("Command timed out after {0} ms")]
    Timeout(u64),
}

impl ControllerError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::BinaryNotFound(binary) => {
                Remediation::new(format!("Install kitty or point [controller].binary at it (tried `{binary}`)."))
                    .command("Verify install", "kitty --version")
            }
            Self::NotRunning => Remediation::new(
                "Enable remote control in kitty and run sk from inside a kitty window.",
            )
            .command("Check remote control", "kitty @ ls")
            .alternative("Set `allow_remote_control yes` in kitty.conf.")
            .alternative("Set [controller].socket when kitty listens on a socket."),
            Self::LaunchFailed(_) | Self::CommandFailed(_) => {
                Remediation::new("kitty rejected the command. Check kitty's output and retry.")
                    .command("Check remote control", "kitty @ ls")
            }
            Self::UnknownLayout(layout) => Remediation::new(format!(
                "Layout `{layout}` is not enabled. Add it to enabled_layouts in kitty.conf."
            )),
            Self::ParseError(_) => {
                Remediation::new("kitty returned unexpected output; verify the version.")
                    .command("Check version", "kitty --version")
            }
            Self::Timeout(ms) => Remediation::new(format!(
                "kitty did not answer within {ms} ms. Retry when the terminal is idle."
            ))
            .alternative("Raise [replay].call_timeout_ms in sessionkeep.toml."),
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file {0}: {1}")]
    ReadFailed(String, String),

    #[error("Failed to parse config: {0}")]
    ParseFailed(String),

    #[error("Failed to serialize config: {0}")]
    SerializeFailed(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ConfigError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::FileNotFound(path) => {
                Remediation::new(format!("Create the config file or drop --config: {path}"))
                    .command("Print defaults", "sk config --defaults")
            }
            Self::ReadFailed(..) => Remediation::new("Check config file permissions and retry."),
            Self::ParseFailed(_) => Remediation::new("Fix the TOML syntax in sessionkeep.toml.")
                .command("Print defaults", "sk config --defaults"),
            Self::SerializeFailed(_) => Remediation::new("Retry; the config could not be rendered."),
            Self::ValidationError(_) => {
                Remediation::new("Correct the invalid setting in sessionkeep.toml.")
                    .command("Show effective config", "sk config")
            }
        }
    }
}

/// Format an error with remediation text for display.
#[must_use]
pub fn format_error_with_remediation(error: &Error) -> String {
    let mut output = format!("Error: {error}");
    if let Some(remediation) = error.remediation() {
        output.push('\n');
        output.push('\n');
        output.push_str(&remediation.render_plain());
    }
    output
}
