//! Shared builders for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;

use sessionkeep_core::error::StoreError;
use sessionkeep_core::store::{MemorySessionStore, SessionStore};
use sessionkeep_core::topology::{SessionName, Tab, TopologyModel, Window};

pub fn name(s: &str) -> SessionName {
    SessionName::new(s).unwrap()
}

pub fn tab(cwds: &[&str], layout: &str, is_focused: bool) -> Tab {
    Tab {
        id: None,
        layout: layout.to_string(),
        is_focused,
        windows: cwds.iter().map(|c| Window::shell(*c)).collect(),
    }
}

/// Two tabs: `[/p, /p/src]` (tall, unfocused) and `[/p/docs]` (fat, focused).
pub fn two_tab_model(session: &str) -> TopologyModel {
    TopologyModel::new(
        name(session),
        vec![
            tab(&["/p", "/p/src"], "tall", false),
            tab(&["/p/docs"], "fat", true),
        ],
    )
    .unwrap()
}

/// A kitty `ls` payload with one OS window and one tagged window per cwd.
pub fn ls_payload(session: &str, cwds: &[&str]) -> String {
    let windows: Vec<_> = cwds
        .iter()
        .enumerate()
        .map(|(i, cwd)| {
            json!({
                "id": i + 1,
                "cwd": cwd,
                "env": {"TERM": "xterm-kitty"},
                "user_vars": {"session_name": session},
                "foreground_processes": [],
                "last_reported_cmdline": ""
            })
        })
        .collect();
    json!([{
        "id": 1,
        "is_focused": true,
        "tabs": [{"id": 1, "is_focused": true, "layout": "tall", "windows": windows}]
    }])
    .to_string()
}

/// Memory store that counts upserts.
#[derive(Default)]
pub struct CountingStore {
    inner: MemorySessionStore,
    upserts: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

impl SessionStore for CountingStore {
    fn upsert(&self, model: &TopologyModel) -> Result<(), StoreError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(model)
    }

    fn lookup(&self, name: &SessionName) -> Result<TopologyModel, StoreError> {
        self.inner.lookup(name)
    }

    fn delete(&self, name: &SessionName) -> Result<bool, StoreError> {
        self.inner.delete(name)
    }

    fn list(&self) -> Result<Vec<SessionName>, StoreError> {
        self.inner.list()
    }
}
