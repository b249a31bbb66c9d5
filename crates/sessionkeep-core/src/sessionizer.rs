//! Open a project as a session.
//!
//! The picker phase lists candidate project directories and validates the
//! chosen one. The apply phase either replays the stored layout for the
//! project's session, or, on first use, opens a fresh OS window tagged with
//! the session name and records it as the session's first snapshot.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ReplayConfig;
use crate::controller::{ControllerHandle, LaunchRequest, LaunchType, bounded};
use crate::error::{Error, Result, StoreError};
use crate::replay::{ReplayEngine, ReplayReport};
use crate::snapshot::SnapshotExtractor;
use crate::store::StoreHandle;
use crate::topology::{ModelError, SESSION_TAG, SessionName, TopologyModel};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum OpenOutcome {
    /// Stored layout was replayed.
    Replayed {
        session: SessionName,
        report: ReplayReport,
    },
    /// First use: a fresh window was opened and captured.
    Created { session: SessionName, window_id: u64 },
}

/// Session name for a project directory (its base name).
pub fn session_name_for(project_dir: &Path) -> std::result::Result<SessionName, ModelError> {
    SessionName::from_project_dir(project_dir)
}

/// Immediate subdirectories of `root`, sorted.
pub fn project_candidates(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Turn a picker answer into a project directory. Blank answers and paths
/// that are not directories mean no choice was made.
#[must_use]
pub fn capture_choice(answer: &str) -> Option<PathBuf> {
    let answer = answer.trim();
    if answer.is_empty() {
        return None;
    }
    let path = PathBuf::from(answer);
    path.is_dir().then_some(path)
}

pub struct Sessionizer {
    controller: ControllerHandle,
    store: StoreHandle,
    extractor: SnapshotExtractor,
    replay: ReplayEngine,
    config: ReplayConfig,
}

impl Sessionizer {
    #[must_use]
    pub fn new(
        controller: ControllerHandle,
        store: StoreHandle,
        extractor: SnapshotExtractor,
        config: ReplayConfig,
    ) -> Self {
        Self {
            replay: ReplayEngine::new(controller.clone(), config.clone()),
            controller,
            store,
            extractor,
            config,
        }
    }

    /// Open `project_dir`. `origin` is the window that asked; it is closed
    /// once the session is up (when `close_origin` is set).
    pub async fn apply(&self, project_dir: &Path, origin: Option<u64>) -> Result<OpenOutcome> {
        let project_dir = normalize_dir(&std::path::absolute(project_dir)?);
        let session = session_name_for(&project_dir)?;

        let store = self.store.clone();
        let key = session.clone();
        let found = tokio::task::spawn_blocking(move || store.lookup(&key))
            .await
            .map_err(|e| Error::Runtime(e.to_string()))?;

        match found {
            Ok(model) => {
                debug!(session = %session, tabs = model.tabs.len(), "replaying stored session");
                let report = self.replay.replay(&model, origin).await?;
                if !report.origin_closed {
                    self.close_origin(origin).await?;
                }
                Ok(OpenOutcome::Replayed { session, report })
            }
            Err(StoreError::NotFound(_)) => {
                let window_id = self.bootstrap(&session, &project_dir, origin).await?;
                Ok(OpenOutcome::Created { session, window_id })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn close_origin(&self, origin: Option<u64>) -> Result<()> {
        if let Some(origin) = origin.filter(|_| self.config.close_origin) {
            bounded(self.config.call_timeout_ms, self.controller.close_window(origin)).await?;
        }
        Ok(())
    }

    /// Open one tagged OS window at the project and store it as the
    /// session's first snapshot.
    async fn bootstrap(
        &self,
        session: &SessionName,
        project_dir: &Path,
        origin: Option<u64>,
    ) -> Result<u64> {
        let timeout_ms = self.config.call_timeout_ms;
        let mut tags = BTreeMap::new();
        tags.insert(SESSION_TAG.to_string(), session.to_string());
        let request = LaunchRequest {
            launch_type: LaunchType::NewOsWindow,
            cwd: project_dir.to_string_lossy().into_owned(),
            env: BTreeMap::new(),
            tags,
            cmdline: None,
            hold: false,
        };
        let window_id = bounded(timeout_ms, self.controller.launch(request)).await?;
        info!(session = %session, window_id, "opened new session window");

        let filter = format!("id:{window_id}");
        let payload = bounded(timeout_ms, self.controller.introspect(Some(&filter))).await?;
        let model: TopologyModel = match self.extractor.extract(session, &payload) {
            Ok(model) => model,
            Err(e) => {
                warn!(session = %session, window_id, error = %e, "new session window not recorded");
                return Err(e.into());
            }
        };

        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.upsert(&model))
            .await
            .map_err(|e| Error::Runtime(e.to_string()))??;

        // The origin may host this process, so it goes last.
        self.close_origin(origin).await?;
        Ok(window_id)
    }
}

/// Resolve `.` and `..` lexically so the base name is the directory's own.
fn normalize_dir(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
