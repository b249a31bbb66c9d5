//! SQLite backend: `sessions(session_name PRIMARY KEY, tabs, updated_at)`.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use super::{SessionStore, decode_record};
use crate::error::StoreError;
use crate::topology::{SessionName, TopologyModel};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    session_name TEXT PRIMARY KEY NOT NULL,
    tabs         TEXT NOT NULL,
    updated_at   INTEGER NOT NULL
);
";

/// Keyed-table store. Each operation opens its own connection, so the store
/// is shareable across threads and processes; WAL plus a busy timeout
/// serialize writers without blocking readers.
#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    path: PathBuf,
    busy_timeout_ms: u64,
}

impl SqliteSessionStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path, busy_timeout_ms: u64) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Self {
            path: path.to_path_buf(),
            busy_timeout_ms,
        };
        let conn = store.open_conn()?;
        conn.execute_batch(SCHEMA)?;
        debug!(path = %path.display(), "sqlite session store ready");
        Ok(store)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_conn(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        // Busy timeout first so the journal-mode switch also waits on writers.
        conn.busy_timeout(Duration::from_millis(self.busy_timeout_ms))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(conn)
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

impl SessionStore for SqliteSessionStore {
    fn upsert(&self, model: &TopologyModel) -> Result<(), StoreError> {
        let tabs = model
            .tabs_json()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let conn = self.open_conn()?;
        conn.execute(
            "INSERT INTO sessions (session_name, tabs, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(session_name) DO UPDATE SET
                tabs = excluded.tabs,
                updated_at = excluded.updated_at",
            params![model.session_name.as_str(), tabs, now_secs()],
        )?;
        debug!(
            session = %model.session_name,
            tabs = model.tabs.len(),
            windows = model.window_count(),
            "upserted session"
        );
        Ok(())
    }

    fn lookup(&self, name: &SessionName) -> Result<TopologyModel, StoreError> {
        let conn = self.open_conn()?;
        let tabs: Option<String> = conn
            .query_row(
                "SELECT tabs FROM sessions WHERE session_name = ?1",
                [name.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        match tabs {
            Some(tabs) => decode_record(name, &tabs),
            None => Err(StoreError::NotFound(name.to_string())),
        }
    }

    fn delete(&self, name: &SessionName) -> Result<bool, StoreError> {
        let conn = self.open_conn()?;
        let removed = conn.execute(
            "DELETE FROM sessions WHERE session_name = ?1",
            [name.as_str()],
        )?;
        Ok(removed > 0)
    }

    fn list(&self) -> Result<Vec<SessionName>, StoreError> {
        let conn = self.open_conn()?;
        let mut stmt = conn.prepare("SELECT session_name FROM sessions ORDER BY session_name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        // Rows with blank keys can only come from outside writers; skip them.
        Ok(names
            .into_iter()
            .filter_map(|n| SessionName::new(n).ok())
            .collect())
    }
}
