//! Workspace controller boundary.
//!
//! [`WorkspaceController`] is the only way the core touches the terminal:
//! create windows and tabs, apply layouts, move focus, close windows, read
//! the live topology, and write window tags. [`crate::kitty::KittyRemote`]
//! drives a real kitty instance; [`MockController`] records calls for tests.
//!
//! Calls are issued one at a time by callers. A later launch may depend on
//! the tab or OS window an earlier one created.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use crate::error::ControllerError;

/// Boxed future returned by controller operations.
pub type ControllerFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, ControllerError>> + Send + 'a>>;

/// Shared controller handle.
pub type ControllerHandle = Arc<dyn WorkspaceController>;

/// Where a launched window goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchType {
    /// New top-level container.
    NewOsWindow,
    /// New tab in the current container.
    NewTab,
    /// Split inside the current tab.
    NewWindowInTab,
}

/// One launch call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub launch_type: LaunchType,
    pub cwd: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmdline: Option<Vec<String>>,
    /// Keep the window open after its program exits.
    #[serde(default)]
    pub hold: bool,
}

/// Focus target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabRef {
    /// A live tab id.
    Id(u64),
    /// Whichever tab currently holds this window.
    ContainingWindow(u64),
}

/// Await a controller call, failing with `Timeout` after `timeout_ms`.
/// Zero waits indefinitely.
pub async fn bounded<T>(timeout_ms: u64, fut: ControllerFuture<'_, T>) -> Result<T, ControllerError> {
    if timeout_ms == 0 {
        return fut.await;
    }
    tokio::time::timeout(Duration::from_millis(timeout_ms), fut)
        .await
        .unwrap_or(Err(ControllerError::Timeout(timeout_ms)))
}

pub trait WorkspaceController: Send + Sync {
    /// Create a window; resolves to the new window's id.
    fn launch(&self, request: LaunchRequest) -> ControllerFuture<'_, u64>;

    /// Apply a layout to the active tab.
    fn apply_layout<'a>(&'a self, layout: &'a str) -> ControllerFuture<'a, ()>;

    fn focus_tab(&self, tab: TabRef) -> ControllerFuture<'_, ()>;

    fn close_window(&self, window_id: u64) -> ControllerFuture<'_, ()>;

    /// Raw topology payload, optionally narrowed by a match expression
    /// such as `id:42`.
    fn introspect<'a>(&'a self, filter: Option<&'a str>) -> ControllerFuture<'a, String>;

    fn set_tag<'a>(&'a self, window_id: u64, key: &'a str, value: &'a str)
    -> ControllerFuture<'a, ()>;
}

// =============================================================================
// Recording mock
// =============================================================================

/// A controller call as seen by [`MockController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerOp {
    Launch(LaunchRequest),
    ApplyLayout(String),
    FocusTab(TabRef),
    CloseWindow(u64),
    Introspect(Option<String>),
    SetTag {
        window_id: u64,
        key: String,
        value: String,
    },
}

impl ControllerOp {
    /// Launch type, for launch ops.
    #[must_use]
    pub fn launch_type(&self) -> Option<LaunchType> {
        match self {
            Self::Launch(req) => Some(req.launch_type),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    ops: Vec<ControllerOp>,
    launches: usize,
    introspect_payload: String,
    introspect_error: Option<ControllerError>,
    close_error: Option<ControllerError>,
    fail_launch_at: Option<usize>,
    unknown_layouts: HashSet<String>,
    launch_delay: Option<Duration>,
}

/// Controller double that records every call in order.
///
/// Launches return sequential ids starting at `first_id` (default 1000).
#[derive(Debug)]
pub struct MockController {
    next_id: AtomicU64,
    state: Mutex<MockState>,
}

impl Default for MockController {
    fn default() -> Self {
        Self::new()
    }
}

impl MockController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1000),
            state: Mutex::new(MockState {
                introspect_payload: "[]".to_string(),
                ..MockState::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[must_use]
    pub fn with_first_id(self, id: u64) -> Self {
        self.next_id.store(id, Ordering::SeqCst);
        self
    }

    /// Payload returned by every `introspect` call.
    #[must_use]
    pub fn with_introspect_payload(self, payload: impl Into<String>) -> Self {
        self.set_introspect_payload(payload);
        self
    }

    pub fn set_introspect_payload(&self, payload: impl Into<String>) {
        self.state().introspect_payload = payload.into();
    }

    /// Make `introspect` fail with `error`.
    #[must_use]
    pub fn with_introspect_error(self, error: ControllerError) -> Self {
        self.state().introspect_error = Some(error);
        self
    }

    /// Fail every `close_window` call with `error` (still recorded).
    #[must_use]
    pub fn with_close_error(self, error: ControllerError) -> Self {
        self.state().close_error = Some(error);
        self
    }

    /// Fail the launch with this zero-based index.
    #[must_use]
    pub fn with_failing_launch(self, index: usize) -> Self {
        self.state().fail_launch_at = Some(index);
        self
    }

    #[must_use]
    pub fn with_unknown_layout(self, layout: impl Into<String>) -> Self {
        self.state().unknown_layouts.insert(layout.into());
        self
    }

    /// Delay every launch by `delay`.
    #[must_use]
    pub fn with_launch_delay(self, delay: Duration) -> Self {
        self.state().launch_delay = Some(delay);
        self
    }

    /// Calls recorded so far.
    #[must_use]
    pub fn ops(&self) -> Vec<ControllerOp> {
        self.state().ops.clone()
    }

    #[must_use]
    pub fn introspect_count(&self) -> usize {
        self.state()
            .ops
            .iter()
            .filter(|op| matches!(op, ControllerOp::Introspect(_)))
            .count()
    }

    pub fn clear(&self) {
        self.state().ops.clear();
    }

    fn record(&self, op: ControllerOp) {
        self.state().ops.push(op);
    }
}

impl WorkspaceController for MockController {
    fn launch(&self, request: LaunchRequest) -> ControllerFuture<'_, u64> {
        Box::pin(async move {
            let (index, fail_at, delay) = {
                let mut state = self.state();
                state.ops.push(ControllerOp::Launch(request.clone()));
                let index = state.launches;
                state.launches += 1;
                (index, state.fail_launch_at, state.launch_delay)
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if fail_at == Some(index) {
                return Err(ControllerError::LaunchFailed(format!(
                    "mock rejected launch in {}",
                    request.cwd
                )));
            }
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
        })
    }

    fn apply_layout<'a>(&'a self, layout: &'a str) -> ControllerFuture<'a, ()> {
        Box::pin(async move {
            let unknown = {
                let mut state = self.state();
                state.ops.push(ControllerOp::ApplyLayout(layout.to_string()));
                state.unknown_layouts.contains(layout)
            };
            if unknown {
                return Err(ControllerError::UnknownLayout(layout.to_string()));
            }
            Ok(())
        })
    }

    fn focus_tab(&self, tab: TabRef) -> ControllerFuture<'_, ()> {
        Box::pin(async move {
            self.record(ControllerOp::FocusTab(tab));
            Ok(())
        })
    }

    fn close_window(&self, window_id: u64) -> ControllerFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state();
            state.ops.push(ControllerOp::CloseWindow(window_id));
            state.close_error.clone().map_or(Ok(()), Err)
        })
    }

    fn introspect<'a>(&'a self, filter: Option<&'a str>) -> ControllerFuture<'a, String> {
        Box::pin(async move {
            let mut state = self.state();
            state.ops.push(ControllerOp::Introspect(filter.map(String::from)));
            match &state.introspect_error {
                Some(err) => Err(err.clone()),
                None => Ok(state.introspect_payload.clone()),
            }
        })
    }

    fn set_tag<'a>(
        &'a self,
        window_id: u64,
        key: &'a str,
        value: &'a str,
    ) -> ControllerFuture<'a, ()> {
        Box::pin(async move {
            self.record(ControllerOp::SetTag {
                window_id,
                key: key.to_string(),
                value: value.to_string(),
            });
            Ok(())
        })
    }
}
