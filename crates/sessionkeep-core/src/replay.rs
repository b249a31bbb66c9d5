//! Replay engine: recreate a stored topology through a controller.
//!
//! Tabs and windows are launched strictly in stored order, one controller
//! call at a time. Window creation type depends only on position:
//!
//! | tab index | window index | launch type        |
//! |-----------|--------------|--------------------|
//! | 0         | 0            | `NewOsWindow`      |
//! | > 0       | 0            | `NewTab`           |
//! | any       | > 0          | `NewWindowInTab`   |
//!
//! After the last window of a tab with more than one window the tab's
//! layout is applied. A multi-tab replay ends by focusing the tab that was
//! focused at capture time and closing the window that requested the
//! replay.
//!
//! Launch failures abort (later launches depend on earlier containers);
//! unknown layouts are recorded and skipped. Every call is bounded by
//! `call_timeout_ms`; a timeout aborts with the number of windows already
//! launched, and nothing is rolled back.

use serde::Serialize;
use tracing::{Instrument, debug, info, info_span, warn};

pub use crate::config::ReplayConfig;
use crate::controller::{
    ControllerError, ControllerFuture, ControllerHandle, LaunchRequest, LaunchType, TabRef,
    bounded,
};
use crate::error::Remediation;
use crate::topology::{ModelError, TopologyModel};

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("launching window {window_index} of tab {tab_index} failed ({launched} windows launched): {source}")]
    LaunchFailed {
        tab_index: usize,
        window_index: usize,
        launched: usize,
        source: ControllerError,
    },

    #[error("{operation} timed out after {timeout_ms} ms ({launched} windows launched)")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
        launched: usize,
    },

    #[error("{operation} failed ({launched} windows launched): {source}")]
    Controller {
        operation: &'static str,
        launched: usize,
        source: ControllerError,
    },

    #[error("refusing to replay invalid topology: {0}")]
    InvalidModel(#[from] ModelError),
}

impl ReplayError {
    /// Windows created before the failure.
    #[must_use]
    pub fn windows_launched(&self) -> usize {
        match self {
            Self::LaunchFailed { launched, .. }
            | Self::Timeout { launched, .. }
            | Self::Controller { launched, .. } => *launched,
            Self::InvalidModel(_) => 0,
        }
    }

    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::LaunchFailed { source, .. } | Self::Controller { source, .. } => {
                Some(source.remediation())
            }
            Self::Timeout { timeout_ms, .. } => {
                Some(ControllerError::Timeout(*timeout_ms).remediation())
            }
            Self::InvalidModel(_) => Some(
                Remediation::new("The stored layout is invalid; forget it and open the project again.")
                    .command("Forget the stored layout", "sk forget <name>"),
            ),
        }
    }
}

/// What a replay did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub windows_launched: usize,
    pub tabs_created: usize,
    pub layouts_applied: Vec<String>,
    /// Layouts the controller did not recognize.
    pub skipped_layouts: Vec<String>,
    /// Stored index of the tab focused at the end.
    pub focused_tab: Option<usize>,
    pub origin_closed: bool,
    /// Id of the first window launched (the new OS window's root).
    pub root_window_id: Option<u64>,
}

/// Creation type for a window at a position in the model.
#[must_use]
pub fn creation_type(tab_index: usize, window_index: usize) -> LaunchType {
    match (tab_index, window_index) {
        (0, 0) => LaunchType::NewOsWindow,
        (_, 0) => LaunchType::NewTab,
        _ => LaunchType::NewWindowInTab,
    }
}

pub struct ReplayEngine {
    controller: ControllerHandle,
    config: ReplayConfig,
}

impl ReplayEngine {
    #[must_use]
    pub fn new(controller: ControllerHandle, config: ReplayConfig) -> Self {
        Self { controller, config }
    }

    async fn bounded<T>(&self, fut: ControllerFuture<'_, T>) -> Result<T, ControllerError> {
        bounded(self.config.call_timeout_ms, fut).await
    }

    fn failure(operation: &'static str, launched: usize, err: ControllerError) -> ReplayError {
        match err {
            ControllerError::Timeout(timeout_ms) => ReplayError::Timeout {
                operation,
                timeout_ms,
                launched,
            },
            source => ReplayError::Controller {
                operation,
                launched,
                source,
            },
        }
    }

    /// Replay `model`. `origin` is the window that asked for the replay; it
    /// is closed at the end of a multi-tab replay when configured to.
    pub async fn replay(
        &self,
        model: &TopologyModel,
        origin: Option<u64>,
    ) -> Result<ReplayReport, ReplayError> {
        model.validate()?;
        let session = model.session_name.as_str();
        let focused = model.focused_tab_index();
        let mut report = ReplayReport::default();
        let mut focus_window: Option<u64> = None;

        for (tab_index, tab) in model.tabs.iter().enumerate() {
            let span = info_span!("replay_tab", session, tab_index);
            async {
                for (window_index, window) in tab.windows.iter().enumerate() {
                    let request = LaunchRequest {
                        launch_type: creation_type(tab_index, window_index),
                        cwd: window.cwd.clone(),
                        env: window.env.clone(),
                        tags: window.tags.clone(),
                        cmdline: window.cmdline.clone(),
                        hold: self.config.hold,
                    };
                    let launch_type = request.launch_type;
                    let window_id = self
                        .bounded(self.controller.launch(request))
                        .await
                        .map_err(|err| match err {
                            ControllerError::Timeout(timeout_ms) => ReplayError::Timeout {
                                operation: "launch",
                                timeout_ms,
                                launched: report.windows_launched,
                            },
                            source => ReplayError::LaunchFailed {
                                tab_index,
                                window_index,
                                launched: report.windows_launched,
                                source,
                            },
                        })?;
                    debug!(window_index, window_id, ?launch_type, "launched window");

                    report.windows_launched += 1;
                    if report.root_window_id.is_none() {
                        report.root_window_id = Some(window_id);
                    }
                    if window_index == 0 {
                        report.tabs_created += 1;
                        if focused == Some(tab_index) {
                            focus_window = Some(window_id);
                        }
                    }
                }

                if tab.windows.len() > 1 {
                    match self.bounded(self.controller.apply_layout(&tab.layout)).await {
                        Ok(()) => report.layouts_applied.push(tab.layout.clone()),
                        Err(ControllerError::UnknownLayout(layout)) => {
                            warn!(layout = %layout, "unknown layout; keeping the default arrangement");
                            report.skipped_layouts.push(layout);
                        }
                        Err(err) => {
                            return Err(Self::failure("apply_layout", report.windows_launched, err));
                        }
                    }
                }
                Ok::<(), ReplayError>(())
            }
            .instrument(span)
            .await?;
        }

        if model.tabs.len() > 1 {
            if let Some(window_id) = focus_window {
                self.bounded(self.controller.focus_tab(TabRef::ContainingWindow(window_id)))
                    .await
                    .map_err(|e| Self::failure("focus_tab", report.windows_launched, e))?;
                report.focused_tab = focused;
            }
            if let Some(origin) = origin.filter(|_| self.config.close_origin) {
                self.bounded(self.controller.close_window(origin))
                    .await
                    .map_err(|e| Self::failure("close_window", report.windows_launched, e))?;
                report.origin_closed = true;
            }
        }

        info!(
            session,
            windows = report.windows_launched,
            tabs = report.tabs_created,
            skipped_layouts = report.skipped_layouts.len(),
            "replay complete"
        );
        Ok(report)
    }
}
