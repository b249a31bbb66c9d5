//! Session persistence.
//!
//! One record per session name holding that session's ordered tabs. Two
//! on-disk backends share the [`SessionStore`] contract:
//!
//! - [`SqliteSessionStore`]: one row per session, single-statement upsert,
//!   WAL journal so readers never see a half-written row.
//! - [`JsonSessionStore`]: one JSON document holding every session,
//!   rewritten wholesale under an exclusive file lock.
//!
//! [`MemorySessionStore`] backs tests and dry runs.
//!
//! A record that fails to decode is reported as absent by `lookup` (with a
//! warning) so a damaged entry degrades to "fresh session" instead of an
//! error.

mod json;
mod sqlite;

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::warn;

pub use json::JsonSessionStore;
pub use sqlite::SqliteSessionStore;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreError;
use crate::topology::{SessionName, TopologyModel};

/// Keyed persistence of topology models.
///
/// Implementations serialize writes to the same key (last write wins) and
/// never let a write to one key disturb another key's record.
pub trait SessionStore: Send + Sync {
    /// Insert or replace the record for `model.session_name`.
    fn upsert(&self, model: &TopologyModel) -> Result<(), StoreError>;

    /// Fetch a session. Misses and undecodable records are `NotFound`.
    fn lookup(&self, name: &SessionName) -> Result<TopologyModel, StoreError>;

    /// Remove a session. Returns whether a record existed.
    fn delete(&self, name: &SessionName) -> Result<bool, StoreError>;

    /// All stored session names, sorted.
    fn list(&self) -> Result<Vec<SessionName>, StoreError>;
}

/// Shared store handle injected into every component that persists.
pub type StoreHandle = Arc<dyn SessionStore>;

/// Open the backend selected by configuration.
pub fn open_store(config: &StoreConfig) -> Result<StoreHandle, StoreError> {
    let path = config.resolved_path();
    tracing::debug!(backend = %config.backend, path = %path.display(), "opening session store");
    let store: StoreHandle = match config.backend {
        StoreBackend::Sqlite => Arc::new(SqliteSessionStore::open(&path, config.busy_timeout_ms)?),
        StoreBackend::Json => Arc::new(JsonSessionStore::open(&path)?),
    };
    Ok(store)
}

/// Decode a stored tabs document, mapping every failure to `NotFound`.
pub(crate) fn decode_record(name: &SessionName, tabs_json: &str) -> Result<TopologyModel, StoreError> {
    match TopologyModel::from_tabs_json(name.clone(), tabs_json) {
        Ok(Some(model)) => Ok(model),
        Ok(None) => {
            warn!(session = %name, "stored session violates topology invariants; treating as absent");
            Err(StoreError::NotFound(name.to_string()))
        }
        Err(e) => {
            warn!(session = %name, error = %e, "stored session is corrupt; treating as absent");
            Err(StoreError::NotFound(name.to_string()))
        }
    }
}

// =============================================================================
// In-memory backend
// =============================================================================

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: RwLock<BTreeMap<SessionName, TopologyModel>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn upsert(&self, model: &TopologyModel) -> Result<(), StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::Lock("memory store lock poisoned".to_string()))?;
        records.insert(model.session_name.clone(), model.clone());
        Ok(())
    }

    fn lookup(&self, name: &SessionName) -> Result<TopologyModel, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::Lock("memory store lock poisoned".to_string()))?;
        records
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn delete(&self, name: &SessionName) -> Result<bool, StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::Lock("memory store lock poisoned".to_string()))?;
        Ok(records.remove(name).is_some())
    }

    fn list(&self) -> Result<Vec<SessionName>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::Lock("memory store lock poisoned".to_string()))?;
        Ok(records.keys().cloned().collect())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::topology::{SessionName, Tab, TopologyModel, Window};

    /// Small valid model; `marker` ends up in the root window's cwd.
    pub fn model(name: &str, marker: &str) -> TopologyModel {
        TopologyModel::new(
            SessionName::new(name).unwrap(),
            vec![
                Tab {
                    id: Some(1),
                    layout: "tall".to_string(),
                    is_focused: false,
                    windows: vec![
                        Window::shell(format!("/home/u/{marker}")),
                        Window::shell("/tmp"),
                    ],
                },
                Tab {
                    id: Some(2),
                    layout: "fat".to_string(),
                    is_focused: true,
                    windows: vec![Window::shell("/var")],
                },
            ],
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::model;
    use super::*;

    #[test]
    fn memory_store_roundtrip_and_last_write_wins() {
        let store = MemorySessionStore::new();
        let name = SessionName::new("a").unwrap();

        assert!(matches!(store.lookup(&name), Err(StoreError::NotFound(_))));

        store.upsert(&model("a", "one")).unwrap();
        store.upsert(&model("b", "other")).unwrap();
        store.upsert(&model("a", "two")).unwrap();

        assert_eq!(store.lookup(&name).unwrap(), model("a", "two"));
        assert_eq!(
            store.lookup(&SessionName::new("b").unwrap()).unwrap(),
            model("b", "other")
        );
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn memory_store_delete() {
        let store = MemorySessionStore::new();
        let name = SessionName::new("a").unwrap();
        store.upsert(&model("a", "x")).unwrap();
        assert!(store.delete(&name).unwrap());
        assert!(!store.delete(&name).unwrap());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn decode_record_maps_failures_to_not_found() {
        let name = SessionName::new("a").unwrap();
        assert!(matches!(
            decode_record(&name, "{garbage"),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            decode_record(&name, "[]"),
            Err(StoreError::NotFound(_))
        ));
        let good = model("a", "x");
        assert_eq!(
            decode_record(&name, &good.tabs_json().unwrap()).unwrap(),
            good
        );
    }

    #[test]
    fn open_store_selects_backend() {
        let dir = tempfile::tempdir().unwrap();
        for backend in [StoreBackend::Sqlite, StoreBackend::Json] {
            let config = StoreConfig {
                backend,
                path: Some(
                    dir.path()
                        .join(format!("state-{backend}"))
                        .to_string_lossy()
                        .into_owned(),
                ),
                ..StoreConfig::default()
            };
            let store = open_store(&config).unwrap();
            store.upsert(&model("p", "x")).unwrap();
            assert_eq!(
                store.lookup(&SessionName::new("p").unwrap()).unwrap(),
                model("p", "x")
            );
        }
    }
}
