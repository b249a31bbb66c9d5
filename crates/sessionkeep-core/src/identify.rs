//! Session identification for live windows.
//!
//! A window belongs to a session when it carries the `session_name` tag. A
//! window that has just started and has no tag inherits the tag of a
//! sibling in the same OS window; the inherited tag is written back so the
//! next event resolves directly.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::controller::{ControllerError, ControllerHandle};
use crate::snapshot::{SnapshotError, parse_payload};
use crate::topology::{SESSION_TAG, SessionName};

#[derive(Debug, thiserror::Error)]
pub enum IdentifyError {
    #[error("controller call failed during identification: {0}")]
    Controller(#[from] ControllerError),

    #[error("could not read sibling windows: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// The window an event refers to, as reported by the event source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveWindow {
    pub id: u64,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// argv of the window's child process.
    #[serde(default)]
    pub cmdline: Vec<String>,
}

impl LiveWindow {
    #[must_use]
    pub fn session_tag(&self) -> Option<&str> {
        self.tags
            .get(SESSION_TAG)
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionResolution {
    Tracked(SessionName),
    /// Not part of any tracked session; do not persist.
    Untracked,
    /// Transient prompt window; never tracked.
    Excluded,
}

/// Whether any token of `argv`, or its basename, names an excluded command.
#[must_use]
pub fn runs_excluded_command(argv: &[String], excluded: &[String]) -> bool {
    argv.iter().any(|token| {
        let base = Path::new(token)
            .file_name()
            .map_or(token.as_str(), |n| n.to_str().unwrap_or(token));
        excluded.iter().any(|cmd| cmd == token || cmd == base)
    })
}

pub struct SessionIdentifier {
    controller: ControllerHandle,
    excluded_prompt_commands: Vec<String>,
}

impl SessionIdentifier {
    #[must_use]
    pub fn new(controller: ControllerHandle, excluded_prompt_commands: Vec<String>) -> Self {
        Self {
            controller,
            excluded_prompt_commands,
        }
    }

    /// Whether the window runs an excluded prompt command (any argv token,
    /// compared by basename).
    #[must_use]
    pub fn is_excluded(&self, window: &LiveWindow) -> bool {
        runs_excluded_command(&window.cmdline, &self.excluded_prompt_commands)
    }

    /// Resolve the session a window belongs to.
    ///
    /// The sibling fallback only runs when `is_window_start` is set.
    pub async fn resolve(
        &self,
        window: &LiveWindow,
        is_window_start: bool,
    ) -> Result<SessionResolution, IdentifyError> {
        if self.is_excluded(window) {
            debug!(window_id = window.id, "window runs an excluded prompt command");
            return Ok(SessionResolution::Excluded);
        }

        if let Some(tag) = window.session_tag() {
            if let Ok(name) = SessionName::new(tag) {
                return Ok(SessionResolution::Tracked(name));
            }
        }

        if !is_window_start {
            return Ok(SessionResolution::Untracked);
        }

        let payload = self.controller.introspect(None).await?;
        let os_windows = parse_payload(&payload)?;

        let inherited = os_windows
            .iter()
            .filter(|os| os.contains_window(window.id))
            .flat_map(|os| os.windows())
            .filter(|w| w.id != Some(window.id))
            .find_map(|w| w.session_tag().and_then(|t| SessionName::new(t).ok()));

        let Some(name) = inherited else {
            debug!(window_id = window.id, "no tagged sibling; window is untracked");
            return Ok(SessionResolution::Untracked);
        };

        self.controller
            .set_tag(window.id, SESSION_TAG, name.as_str())
            .await?;
        info!(window_id = window.id, session = %name, "propagated session tag to new window");
        Ok(SessionResolution::Tracked(name))
    }
}
