//! JSON document backend.
//!
//! The file holds an ordered array of `{session_name, tabs}` records. Every
//! write rewrites the document through a temp file and a rename, under an
//! exclusive lock on a `.lock` sidecar; reads take a shared lock. Record
//! order is insertion order and an update keeps the record's position.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{SessionStore, decode_record};
use crate::error::StoreError;
use crate::topology::{SessionName, TopologyModel};

#[derive(Debug, Serialize, Deserialize)]
struct Record {
    session_name: String,
    tabs: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct JsonSessionStore {
    path: PathBuf,
    lock_path: PathBuf,
}

/// Held for the duration of one operation; the OS lock drops with the file.
struct LockGuard(File);

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.0);
    }
}

impl JsonSessionStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut lock_name = path.as_os_str().to_os_string();
        lock_name.push(".lock");
        Ok(Self {
            path: path.to_path_buf(),
            lock_path: PathBuf::from(lock_name),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self, exclusive: bool) -> Result<LockGuard, StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        let locked = if exclusive {
            file.lock_exclusive()
        } else {
            FileExt::lock_shared(&file)
        };
        locked.map_err(|e| StoreError::Lock(format!("{}: {e}", self.lock_path.display())))?;
        Ok(LockGuard(file))
    }

    /// Read the whole document. A missing or empty file is an empty store.
    fn read_records(&self) -> Result<Vec<Record>, StoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&text).map_err(|e| StoreError::Corrupt {
            details: format!("{}: {e}", self.path.display()),
        })
    }

    fn write_records(&self, records: &[Record]) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(records)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut tmp_name = self.path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStore for JsonSessionStore {
    fn upsert(&self, model: &TopologyModel) -> Result<(), StoreError> {
        let tabs = serde_json::to_value(&model.tabs)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let _guard = self.lock(true)?;
        // A corrupt document is left untouched rather than overwritten.
        let mut records = self.read_records()?;
        match records
            .iter_mut()
            .find(|r| r.session_name == model.session_name.as_str())
        {
            Some(existing) => existing.tabs = tabs,
            None => records.push(Record {
                session_name: model.session_name.to_string(),
                tabs,
            }),
        }
        self.write_records(&records)?;
        debug!(
            session = %model.session_name,
            tabs = model.tabs.len(),
            records = records.len(),
            "upserted session"
        );
        Ok(())
    }

    fn lookup(&self, name: &SessionName) -> Result<TopologyModel, StoreError> {
        let records = {
            let _guard = self.lock(false)?;
            match self.read_records() {
                Ok(records) => records,
                Err(StoreError::Corrupt { details }) => {
                    warn!(session = %name, details = %details, "session document is corrupt; treating session as absent");
                    return Err(StoreError::NotFound(name.to_string()));
                }
                Err(e) => return Err(e),
            }
        };
        let record = records
            .into_iter()
            .find(|r| r.session_name == name.as_str())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        decode_record(name, &record.tabs.to_string())
    }

    fn delete(&self, name: &SessionName) -> Result<bool, StoreError> {
        let _guard = self.lock(true)?;
        let mut records = self.read_records()?;
        let before = records.len();
        records.retain(|r| r.session_name != name.as_str());
        if records.len() == before {
            return Ok(false);
        }
        self.write_records(&records)?;
        Ok(true)
    }

    fn list(&self) -> Result<Vec<SessionName>, StoreError> {
        let _guard = self.lock(false)?;
        let mut names: Vec<SessionName> = self
            .read_records()?
            .into_iter()
            .filter_map(|r| SessionName::new(r.session_name).ok())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}
