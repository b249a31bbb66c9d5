//! Workspace topology model for session persistence.
//!
//! A [`TopologyModel`] is the normalized, ordered snapshot of one workspace:
//! tabs in replay order, each holding windows in replay order. The first
//! window of the first tab is the root window of the workspace.
//!
//! # Data flow
//!
//! ```text
//! introspection payload → SnapshotExtractor → TopologyModel → SessionStore
//!                                                   ↓
//!                                             ReplayEngine
//! ```
//!
//! Models are immutable once built; a newer capture supersedes the stored
//! model instead of editing it in place.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

// =============================================================================
// Constants
// =============================================================================

/// Tag key that carries the session name on every tracked window.
pub const SESSION_TAG: &str = "session_name";

/// Layout applied when the captured data does not name one.
pub const DEFAULT_LAYOUT: &str = "fat";

// =============================================================================
// Errors
// =============================================================================

/// Validation failures when constructing a topology model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("session name is empty")]
    EmptySessionName,

    #[error("topology has no tabs")]
    NoTabs,

    #[error("tab {tab_index} has no windows")]
    EmptyTab { tab_index: usize },

    #[error("window {window_index} of tab {tab_index} has no working directory")]
    MissingCwd {
        tab_index: usize,
        window_index: usize,
    },

    #[error("window {window_index} of tab {tab_index} has a relative working directory: {cwd}")]
    RelativeCwd {
        tab_index: usize,
        window_index: usize,
        cwd: String,
    },
}

// =============================================================================
// Core types
// =============================================================================

/// Primary key of a persisted session. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionName(String);

impl SessionName {
    /// Validate and wrap a session name.
    pub fn new(name: impl Into<String>) -> Result<Self, ModelError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ModelError::EmptySessionName);
        }
        Ok(Self(name))
    }

    /// Derive a session name from a project directory's base name.
    pub fn from_project_dir(dir: &Path) -> Result<Self, ModelError> {
        let base = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(base)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionName {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SessionName> for String {
    fn from(value: SessionName) -> Self {
        value.0
    }
}

/// One terminal window inside a tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    /// Absolute working directory to launch in.
    pub cwd: String,
    /// Program to run; `None` starts a default shell.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmdline: Option<Vec<String>>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Window {
    /// A bare-shell window in `cwd` with no env or tags.
    #[must_use]
    pub fn shell(cwd: impl Into<String>) -> Self {
        Self {
            cwd: cwd.into(),
            cmdline: None,
            env: BTreeMap::new(),
            tags: BTreeMap::new(),
        }
    }

    /// Session name carried by this window's tags, if any.
    #[must_use]
    pub fn session_tag(&self) -> Option<&str> {
        self.tags.get(SESSION_TAG).map(String::as_str)
    }
}

/// One tab: a layout plus an ordered list of windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tab {
    /// Tab id at capture time. Informational only; ids are reassigned on replay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default = "default_layout")]
    pub layout: String,
    #[serde(default)]
    pub is_focused: bool,
    pub windows: Vec<Window>,
}

fn default_layout() -> String {
    DEFAULT_LAYOUT.to_string()
}

/// Complete persisted unit: a session name and its tabs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyModel {
    pub session_name: SessionName,
    pub tabs: Vec<Tab>,
}

// =============================================================================
// Construction / validation
// =============================================================================

impl TopologyModel {
    /// Build a validated model.
    pub fn new(session_name: SessionName, tabs: Vec<Tab>) -> Result<Self, ModelError> {
        let model = Self { session_name, tabs };
        model.validate()?;
        Ok(model)
    }

    /// Check the structural invariants. Models decoded from storage go
    /// through here too.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.session_name.as_str().trim().is_empty() {
            return Err(ModelError::EmptySessionName);
        }
        if self.tabs.is_empty() {
            return Err(ModelError::NoTabs);
        }
        for (tab_index, tab) in self.tabs.iter().enumerate() {
            if tab.windows.is_empty() {
                return Err(ModelError::EmptyTab { tab_index });
            }
            for (window_index, window) in tab.windows.iter().enumerate() {
                if window.cwd.trim().is_empty() {
                    return Err(ModelError::MissingCwd {
                        tab_index,
                        window_index,
                    });
                }
                if !Path::new(&window.cwd).is_absolute() {
                    return Err(ModelError::RelativeCwd {
                        tab_index,
                        window_index,
                        cwd: window.cwd.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Index of the focused tab. First `is_focused` wins; `None` if no tab is marked.
    #[must_use]
    pub fn focused_tab_index(&self) -> Option<usize> {
        self.tabs.iter().position(|t| t.is_focused)
    }

    /// The root window (first window of the first tab).
    #[must_use]
    pub fn root_window(&self) -> Option<&Window> {
        self.tabs.first().and_then(|t| t.windows.first())
    }

    /// Total windows across all tabs.
    #[must_use]
    pub fn window_count(&self) -> usize {
        self.tabs.iter().map(|t| t.windows.len()).sum()
    }

    /// Serialize only the tabs, the form stored next to the session key.
    pub fn tabs_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.tabs)
    }

    /// Rebuild a model from a session key and a stored tabs document.
    ///
    /// Returns `None` for documents that decode but violate the model
    /// invariants, so callers can treat them like corrupt records.
    pub fn from_tabs_json(
        session_name: SessionName,
        tabs_json: &str,
    ) -> Result<Option<Self>, serde_json::Error> {
        let tabs: Vec<Tab> = serde_json::from_str(tabs_json)?;
        Ok(Self::new(session_name, tabs).ok())
    }
}

// =============================================================================
// Tests
// =============================================================================
