//! Change watcher: refresh a session's stored topology on terminal events.
//!
//! Three triggers are understood:
//!
//! - **resize**: only when the previous geometry had a zero dimension,
//!   which marks a window that just started.
//! - **command**: only on command start, and only when the command's
//!   basename is not in the ignore set.
//! - **focus**: only the "gained focus" half of a focus change.
//!
//! A firing trigger resolves the window's session, introspects the live
//! workspace, extracts a topology and upserts it. Events are handled one at
//! a time; nothing here returns an error to the event source. Failures are
//! logged and reported as [`WatchOutcome::Failed`].

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use crate::config::WatcherConfig;
use crate::controller::ControllerHandle;
use crate::identify::{LiveWindow, SessionIdentifier, SessionResolution};
use crate::snapshot::SnapshotExtractor;
use crate::store::StoreHandle;
use crate::topology::{SessionName, TopologyModel};

/// Window grid size in cells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub xnum: u32,
    pub ynum: u32,
}

impl Geometry {
    #[must_use]
    pub fn is_zero_sized(self) -> bool {
        self.xnum == 0 || self.ynum == 0
    }
}

/// Terminal event, as a JSON object tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WatchEvent {
    Resize {
        window: LiveWindow,
        old_geometry: Geometry,
    },
    Command {
        window: LiveWindow,
        /// The command line as typed.
        cmdline: String,
        is_start: bool,
    },
    Focus {
        window: LiveWindow,
        focused: bool,
    },
}

impl WatchEvent {
    #[must_use]
    pub fn window(&self) -> &LiveWindow {
        match self {
            Self::Resize { window, .. } | Self::Command { window, .. } | Self::Focus { window, .. } => {
                window
            }
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Resize { .. } => "resize",
            Self::Command { .. } => "command",
            Self::Focus { .. } => "focus",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum SkipReason {
    /// Resize of a window that already had a size.
    NotWindowStart,
    CommandStop,
    IgnoredCommand(String),
    FocusLost,
    Excluded,
    Untracked,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum WatchOutcome {
    Refreshed(SessionName),
    Skipped(SkipReason),
    Failed(String),
}

/// Which events are worth a refresh.
#[derive(Debug, Clone)]
pub struct TriggerPolicy {
    ignored_commands: HashSet<String>,
}

impl TriggerPolicy {
    #[must_use]
    pub fn new(ignored_commands: impl IntoIterator<Item = String>) -> Self {
        Self {
            ignored_commands: ignored_commands.into_iter().collect(),
        }
    }

    /// `Ok(is_window_start)` when the event should refresh, else the reason
    /// it should not.
    pub fn evaluate(&self, event: &WatchEvent) -> Result<bool, SkipReason> {
        match event {
            WatchEvent::Resize { old_geometry, .. } => {
                if old_geometry.is_zero_sized() {
                    Ok(true)
                } else {
                    Err(SkipReason::NotWindowStart)
                }
            }
            WatchEvent::Command {
                cmdline, is_start, ..
            } => {
                if !is_start {
                    return Err(SkipReason::CommandStop);
                }
                match command_name(cmdline) {
                    Some(name) if self.ignored_commands.contains(name) => {
                        Err(SkipReason::IgnoredCommand(name.to_string()))
                    }
                    _ => Ok(false),
                }
            }
            WatchEvent::Focus { focused, .. } => {
                if *focused {
                    Ok(false)
                } else {
                    Err(SkipReason::FocusLost)
                }
            }
        }
    }
}

/// Basename of the first token of a command line.
#[must_use]
pub fn command_name(cmdline: &str) -> Option<&str> {
    let first = cmdline.split_whitespace().next()?;
    Path::new(first)
        .file_name()
        .and_then(|n| n.to_str())
        .or(Some(first))
}

pub struct ChangeWatcher {
    controller: ControllerHandle,
    store: StoreHandle,
    identifier: SessionIdentifier,
    extractor: SnapshotExtractor,
    policy: TriggerPolicy,
    skip_unchanged: bool,
    last_persisted: Mutex<HashMap<SessionName, TopologyModel>>,
}

impl ChangeWatcher {
    #[must_use]
    pub fn new(
        controller: ControllerHandle,
        store: StoreHandle,
        extractor: SnapshotExtractor,
        config: &WatcherConfig,
    ) -> Self {
        Self {
            identifier: SessionIdentifier::new(
                controller.clone(),
                config.excluded_prompt_commands.clone(),
            ),
            controller,
            store,
            extractor,
            policy: TriggerPolicy::new(config.ignored_commands.iter().cloned()),
            skip_unchanged: config.skip_unchanged,
            last_persisted: Mutex::new(HashMap::new()),
        }
    }

    /// Handle one event to completion.
    pub async fn handle(&self, event: &WatchEvent) -> WatchOutcome {
        let trigger = event.kind();
        let window = event.window();

        let is_window_start = match self.policy.evaluate(event) {
            Ok(start) => start,
            Err(reason) => {
                debug!(trigger, window_id = window.id, ?reason, "event does not trigger a refresh");
                return WatchOutcome::Skipped(reason);
            }
        };

        let session = match self.identifier.resolve(window, is_window_start).await {
            Ok(SessionResolution::Tracked(name)) => name,
            Ok(SessionResolution::Excluded) => return WatchOutcome::Skipped(SkipReason::Excluded),
            Ok(SessionResolution::Untracked) => return WatchOutcome::Skipped(SkipReason::Untracked),
            Err(e) => {
                warn!(trigger, window_id = window.id, error = %e, "session identification failed");
                return WatchOutcome::Failed(e.to_string());
            }
        };

        let payload = match self.controller.introspect(None).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(trigger, session = %session, error = %e, "introspection failed");
                return WatchOutcome::Failed(e.to_string());
            }
        };

        let model = match self.extractor.extract(&session, &payload) {
            Ok(model) => model,
            Err(e) => {
                warn!(trigger, session = %session, error = %e, "snapshot not persisted");
                return WatchOutcome::Failed(e.to_string());
            }
        };

        if self.skip_unchanged && self.is_unchanged(&model) {
            debug!(trigger, session = %session, "topology unchanged since last write");
            return WatchOutcome::Skipped(SkipReason::Unchanged);
        }

        let store = self.store.clone();
        let to_write = model.clone();
        let written = tokio::task::spawn_blocking(move || store.upsert(&to_write)).await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(trigger, session = %session, error = %e, "store upsert failed");
                return WatchOutcome::Failed(e.to_string());
            }
            Err(e) => {
                warn!(trigger, session = %session, error = %e, "store task failed");
                return WatchOutcome::Failed(e.to_string());
            }
        }

        info!(
            trigger,
            session = %session,
            tabs = model.tabs.len(),
            windows = model.window_count(),
            "session refreshed"
        );
        self.last_persisted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session.clone(), model);
        WatchOutcome::Refreshed(session)
    }

    fn is_unchanged(&self, model: &TopologyModel) -> bool {
        self.last_persisted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&model.session_name)
            .is_some_and(|last| last == model)
    }

    /// Consume newline-delimited JSON events until EOF. Undecodable lines
    /// are logged and skipped. Returns the number of events handled.
    pub async fn run<R>(&self, reader: R) -> std::io::Result<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut handled = 0;
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<WatchEvent>(line) {
                Ok(event) => {
                    let outcome = self.handle(&event).await;
                    debug!(trigger = event.kind(), ?outcome, "event handled");
                    handled += 1;
                }
                Err(e) => warn!(error = %e, "skipping undecodable event"),
            }
        }
        Ok(handled)
    }
}
