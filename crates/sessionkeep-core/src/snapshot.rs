//! Snapshot extraction: normalize raw introspection output into a [`TopologyModel`].
//!
//! The controller's introspection payload (kitty `ls` JSON) is overdefined:
//! a window reports its own cwd, a cmdline, a last-reported command line, and
//! zero or more foreground processes that each carry their own cwd and argv.
//! The wire structs below accept all of that with every field optional, and
//! [`SnapshotExtractor`] applies the disambiguation rules in one place. Raw
//! maps never leave this module.
//!
//! # Resolution rules
//!
//! - cwd: no foreground process → the window's cwd; otherwise the first
//!   foreground process's cwd.
//! - cmdline (only with at least one foreground process):
//!   1. last-reported command line is a substring of the first process's
//!      joined argv → its whitespace tokens;
//!   2. first process's argv contains the shell-wrapper token → the second
//!      process's argv (overrides rule 1);
//!   3. otherwise unset.
//!
//! Windows running an excluded prompt command (checked against the window's
//! argv and the first foreground process's argv) are dropped, along with any
//! tab left empty by that.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::identify::runs_excluded_command;
use crate::topology::{
    DEFAULT_LAYOUT, ModelError, SESSION_TAG, SessionName, Tab, TopologyModel, Window,
};

/// Token marking a "run a single shell command" wrapper process.
pub const DEFAULT_SHELL_WRAPPER_TOKEN: &str = "run-shell";

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Payload could not be decoded, or decoded to nothing usable.
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// Payload decoded but produced a model that violates its invariants.
    #[error("snapshot produced an invalid topology: {0}")]
    InvalidModel(#[from] ModelError),
}

// =============================================================================
// Wire types
// =============================================================================

/// Top-level container (kitty "OS window").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOsWindow {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub is_focused: bool,
    #[serde(default)]
    pub tabs: Vec<RawTab>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTab {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub is_focused: bool,
    #[serde(default)]
    pub layout: Option<String>,
    #[serde(default)]
    pub windows: Vec<RawWindow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawWindow {
    #[serde(default)]
    pub id: Option<u64>,
    /// The window shell's own cwd.
    #[serde(default)]
    pub cwd: Option<String>,
    /// argv the window was started with.
    #[serde(default)]
    pub cmdline: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub user_vars: BTreeMap<String, String>,
    #[serde(default)]
    pub foreground_processes: Vec<RawProcess>,
    /// Last command line reported by shell integration, as a single string.
    #[serde(default)]
    pub last_reported_cmdline: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawProcess {
    #[serde(default)]
    pub pid: Option<u64>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub cmdline: Vec<String>,
}

impl RawOsWindow {
    /// Whether any window in this container carries the given session tag.
    #[must_use]
    pub fn is_tagged_with(&self, session: &str) -> bool {
        self.windows().any(|w| w.session_tag() == Some(session))
    }

    /// Whether this container holds the window with `window_id`.
    #[must_use]
    pub fn contains_window(&self, window_id: u64) -> bool {
        self.windows().any(|w| w.id == Some(window_id))
    }

    /// All windows in tab order.
    pub fn windows(&self) -> impl Iterator<Item = &RawWindow> {
        self.tabs.iter().flat_map(|t| t.windows.iter())
    }
}

impl RawWindow {
    #[must_use]
    pub fn session_tag(&self) -> Option<&str> {
        self.user_vars.get(SESSION_TAG).map(String::as_str)
    }
}

/// Decode a raw introspection payload.
pub fn parse_payload(payload: &str) -> Result<Vec<RawOsWindow>, SnapshotError> {
    serde_json::from_str(payload).map_err(|e| SnapshotError::MalformedSnapshot(e.to_string()))
}

// =============================================================================
// Extractor
// =============================================================================

/// Converts introspection payloads into topology models.
#[derive(Debug, Clone)]
pub struct SnapshotExtractor {
    shell_wrapper_token: String,
    excluded_prompt_commands: Vec<String>,
}

impl Default for SnapshotExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_SHELL_WRAPPER_TOKEN)
    }
}

impl SnapshotExtractor {
    #[must_use]
    pub fn new(shell_wrapper_token: impl Into<String>) -> Self {
        Self {
            shell_wrapper_token: shell_wrapper_token.into(),
            excluded_prompt_commands: crate::config::default_excluded_prompt_commands(),
        }
    }

    /// Replace the prompt commands whose windows are left out of snapshots.
    #[must_use]
    pub fn with_excluded_commands(mut self, commands: Vec<String>) -> Self {
        self.excluded_prompt_commands = commands;
        self
    }

    /// Whether `raw` is a transient prompt window.
    #[must_use]
    pub fn is_excluded(&self, raw: &RawWindow) -> bool {
        let first_fg = raw
            .foreground_processes
            .first()
            .map_or(&[][..], |p| p.cmdline.as_slice());
        runs_excluded_command(&raw.cmdline, &self.excluded_prompt_commands)
            || runs_excluded_command(first_fg, &self.excluded_prompt_commands)
    }

    /// Extract the topology of `session` from a raw payload.
    ///
    /// Normalizes the OS window holding a window tagged with the session
    /// name, or the first OS window when none is tagged.
    pub fn extract(
        &self,
        session: &SessionName,
        payload: &str,
    ) -> Result<TopologyModel, SnapshotError> {
        let os_windows = parse_payload(payload)?;
        self.extract_from(session, &os_windows)
    }

    /// Same as [`extract`](Self::extract) over an already decoded payload.
    pub fn extract_from(
        &self,
        session: &SessionName,
        os_windows: &[RawOsWindow],
    ) -> Result<TopologyModel, SnapshotError> {
        let os_window = os_windows
            .iter()
            .find(|w| w.is_tagged_with(session.as_str()))
            .or_else(|| os_windows.first())
            .ok_or_else(|| {
                SnapshotError::MalformedSnapshot("payload contains no OS windows".to_string())
            })?;

        let tabs: Vec<Tab> = os_window
            .tabs
            .iter()
            .filter_map(|raw_tab| self.normalize_tab(raw_tab))
            .collect();

        debug!(
            session = %session,
            os_window_id = ?os_window.id,
            tabs = tabs.len(),
            windows = tabs.iter().map(|t| t.windows.len()).sum::<usize>(),
            "extracted topology"
        );

        Ok(TopologyModel::new(session.clone(), tabs)?)
    }

    fn normalize_tab(&self, raw: &RawTab) -> Option<Tab> {
        let windows: Vec<Window> = raw
            .windows
            .iter()
            .filter(|w| {
                let excluded = self.is_excluded(w);
                if excluded {
                    trace!(window_id = ?w.id, "skipping prompt window");
                }
                !excluded
            })
            .map(|w| self.normalize_window(w))
            .collect();
        if windows.is_empty() && !raw.windows.is_empty() {
            return None;
        }
        Some(Tab {
            id: raw.id,
            layout: raw
                .layout
                .clone()
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| DEFAULT_LAYOUT.to_string()),
            is_focused: raw.is_focused,
            windows,
        })
    }

    /// Normalize one window. A missing cwd becomes an empty string, which
    /// model validation rejects.
    #[must_use]
    pub fn normalize_window(&self, raw: &RawWindow) -> Window {
        let cwd = resolve_cwd(raw).unwrap_or_default();
        let cmdline = resolve_cmdline(raw, &self.shell_wrapper_token);
        trace!(window_id = ?raw.id, has_cmdline = cmdline.is_some(), "normalized window");
        Window {
            cwd,
            cmdline,
            env: raw.env.clone(),
            tags: raw.user_vars.clone(),
        }
    }
}

/// Working directory to replay a window in.
#[must_use]
pub fn resolve_cwd(raw: &RawWindow) -> Option<String> {
    match raw.foreground_processes.first() {
        None => raw.cwd.clone(),
        Some(first) => first.cwd.clone().or_else(|| raw.cwd.clone()),
    }
}

/// Program to replay in a window, if one can be recovered.
#[must_use]
pub fn resolve_cmdline(raw: &RawWindow, shell_wrapper_token: &str) -> Option<Vec<String>> {
    let first = raw.foreground_processes.first()?;

    if first.cmdline.iter().any(|token| token == shell_wrapper_token) {
        return raw
            .foreground_processes
            .get(1)
            .map(|second| second.cmdline.clone())
            .filter(|argv| !argv.is_empty());
    }

    let reported = raw.last_reported_cmdline.as_deref()?.trim();
    if reported.is_empty() {
        return None;
    }
    let joined = first.cmdline.join(" ");
    if joined.contains(reported) {
        Some(reported.split_whitespace().map(String::from).collect())
    } else {
        None
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn proc(cwd: &str, argv: &[&str]) -> RawProcess {
        RawProcess {
            pid: Some(100),
            cwd: Some(cwd.to_string()),
            cmdline: argv.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    fn window(cwd: &str, fg: Vec<RawProcess>, last: Option<&str>) -> RawWindow {
        RawWindow {
            id: Some(1),
            cwd: Some(cwd.to_string()),
            cmdline: vec!["/bin/zsh".to_string()],
            foreground_processes: fg,
            last_reported_cmdline: last.map(String::from),
            ..RawWindow::default()
        }
    }

    fn session(name: &str) -> SessionName {
        SessionName::new(name).unwrap()
    }

    #[test]
    fn no_foreground_uses_window_cwd_and_no_cmdline() {
        let raw = window("/home/u/proj", vec![], Some("ls"));
        let w = SnapshotExtractor::default().normalize_window(&raw);
        assert_eq!(w.cwd, "/home/u/proj");
        assert_eq!(w.cmdline, None);
    }

    #[test]
    fn first_foreground_cwd_wins() {
        let raw = window(
            "/home/u",
            vec![proc("/home/u/proj/src", &["vim"]), proc("/tmp", &["x"])],
            None,
        );
        assert_eq!(resolve_cwd(&raw).as_deref(), Some("/home/u/proj/src"));
    }

    #[test]
    fn foreground_without_cwd_falls_back_to_window() {
        let mut p = proc("/x", &["vim"]);
        p.cwd = None;
        let raw = window("/home/u", vec![p], None);
        assert_eq!(resolve_cwd(&raw).as_deref(), Some("/home/u"));
    }

    #[test]
    fn last_reported_substring_strips_wrapper_noise() {
        let raw = window(
            "/home/u/proj",
            vec![proc("/home/u/proj", &["env", "FOO=1", "vim", "file.txt"])],
            Some("vim file.txt"),
        );
        assert_eq!(
            resolve_cmdline(&raw, DEFAULT_SHELL_WRAPPER_TOKEN),
            Some(vec!["vim".to_string(), "file.txt".to_string()])
        );
    }

    #[test]
    fn shell_wrapper_uses_second_process() {
        let raw = window(
            "/home/u/proj",
            vec![
                proc("/home/u/proj", &["kitty", "+kitten", "run-shell"]),
                proc("/home/u/proj", &["npm", "run", "dev"]),
            ],
            Some("something else"),
        );
        assert_eq!(
            resolve_cmdline(&raw, DEFAULT_SHELL_WRAPPER_TOKEN),
            Some(vec!["npm".into(), "run".into(), "dev".into()])
        );
    }

    #[test]
    fn shell_wrapper_overrides_substring_match() {
        let raw = window(
            "/p",
            vec![
                proc("/p", &["kitty", "run-shell"]),
                proc("/p", &["htop"]),
            ],
            Some("run-shell"),
        );
        assert_eq!(
            resolve_cmdline(&raw, DEFAULT_SHELL_WRAPPER_TOKEN),
            Some(vec!["htop".to_string()])
        );
    }

    #[test]
    fn shell_wrapper_without_second_process_is_unset() {
        let raw = window("/p", vec![proc("/p", &["kitty", "run-shell"])], None);
        assert_eq!(resolve_cmdline(&raw, DEFAULT_SHELL_WRAPPER_TOKEN), None);
    }

    #[test]
    fn unmatched_last_reported_is_unset() {
        let raw = window("/p", vec![proc("/p", &["python3", "-m", "http.server"])], Some("vim"));
        assert_eq!(resolve_cmdline(&raw, DEFAULT_SHELL_WRAPPER_TOKEN), None);
    }

    #[test]
    fn empty_last_reported_never_matches() {
        let raw = window("/p", vec![proc("/p", &["top"])], Some("  "));
        assert_eq!(resolve_cmdline(&raw, DEFAULT_SHELL_WRAPPER_TOKEN), None);
    }

    #[test]
    fn custom_wrapper_token() {
        let raw = window(
            "/p",
            vec![proc("/p", &["sh", "-c", "wrap"]), proc("/p", &["make"])],
            None,
        );
        assert_eq!(resolve_cmdline(&raw, "wrap"), Some(vec!["make".to_string()]));
        assert_eq!(resolve_cmdline(&raw, DEFAULT_SHELL_WRAPPER_TOKEN), None);
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let err = SnapshotExtractor::default()
            .extract(&session("p"), "{\"not\": \"a list\"}")
            .unwrap_err();
        assert!(matches!(err, SnapshotError::MalformedSnapshot(_)));

        let err = SnapshotExtractor::default()
            .extract(&session("p"), "[]")
            .unwrap_err();
        assert!(matches!(err, SnapshotError::MalformedSnapshot(_)));
    }

    #[test]
    fn missing_cwd_is_invalid_model() {
        let payload = r#"[{"tabs":[{"windows":[{"id":1}]}]}]"#;
        let err = SnapshotExtractor::default()
            .extract(&session("p"), payload)
            .unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::InvalidModel(ModelError::MissingCwd { .. })
        ));
    }

    #[test]
    fn extract_full_payload() {
        let payload = r#"[
          {"id": 1, "is_focused": true, "tabs": [
            {"id": 10, "is_focused": false, "layout": "tall", "windows": [
              {"id": 100, "cwd": "/home/u/proj", "env": {"EDITOR": "vim"},
               "user_vars": {"session_name": "proj"},
               "foreground_processes": [], "last_reported_cmdline": ""},
              {"id": 101, "cwd": "/home/u/proj",
               "foreground_processes": [{"pid": 7, "cwd": "/home/u/proj/web", "cmdline": ["kitty", "run-shell"]},
                                        {"pid": 8, "cwd": "/home/u/proj/web", "cmdline": ["npm", "run", "dev"]}]}
            ]},
            {"id": 11, "is_focused": true, "windows": [
              {"id": 102, "cwd": "/home/u"}
            ]}
          ]}
        ]"#;
        let model = SnapshotExtractor::default()
            .extract(&session("proj"), payload)
            .unwrap();

        assert_eq!(model.tabs.len(), 2);
        assert_eq!(model.tabs[0].layout, "tall");
        assert_eq!(model.tabs[1].layout, DEFAULT_LAYOUT);
        assert_eq!(model.tabs[0].id, Some(10));
        assert_eq!(model.focused_tab_index(), Some(1));

        let root = &model.tabs[0].windows[0];
        assert_eq!(root.cwd, "/home/u/proj");
        assert_eq!(root.cmdline, None);
        assert_eq!(root.env.get("EDITOR").map(String::as_str), Some("vim"));
        assert_eq!(root.session_tag(), Some("proj"));

        let dev = &model.tabs[0].windows[1];
        assert_eq!(dev.cwd, "/home/u/proj/web");
        assert_eq!(
            dev.cmdline,
            Some(vec!["npm".into(), "run".into(), "dev".into()])
        );
    }

    #[test]
    fn extract_prefers_os_window_tagged_with_session() {
        let payload = r#"[
          {"id": 1, "tabs": [{"windows": [{"id": 1, "cwd": "/other"}]}]},
          {"id": 2, "tabs": [{"windows": [{"id": 2, "cwd": "/mine",
                                           "user_vars": {"session_name": "mine"}}]}]}
        ]"#;
        let extractor = SnapshotExtractor::default();
        let model = extractor.extract(&session("mine"), payload).unwrap();
        assert_eq!(model.root_window().unwrap().cwd, "/mine");

        let model = extractor.extract(&session("untagged"), payload).unwrap();
        assert_eq!(model.root_window().unwrap().cwd, "/other");
    }
}
