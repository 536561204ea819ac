//! # In-Memory Record Store
//!
//! Reference [`RecordStore`]: one mutex-guarded record set, copy-on-write
//! units of work, optional JSON snapshot on disk.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::audit::AuditSink;

use super::errors::{StoreError, StoreResult};
use super::tables::Tables;
use super::{RecordStore, Tx};

/// Mutex-serialized record store.
///
/// Units of work run against a private copy of the tables; the copy and
/// its audit events are published together, or not at all.
pub struct MemoryStore {
    tables: Mutex<Tables>,
    audit: Arc<dyn AuditSink>,
}

impl MemoryStore {
    /// Create an empty store writing its audit trail to `audit`.
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self::with_tables(Tables::default(), audit)
    }

    /// Create a store over existing records.
    pub fn with_tables(tables: Tables, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            tables: Mutex::new(tables),
            audit,
        }
    }

    /// Load a JSON snapshot, or start empty if the file does not exist.
    pub fn open(path: impl AsRef<Path>, audit: Arc<dyn AuditSink>) -> StoreResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new(audit));
        }

        let content = fs::read_to_string(path).map_err(|e| StoreError::Io(e.to_string()))?;
        let tables: Tables =
            serde_json::from_str(&content).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(Self::with_tables(tables, audit))
    }

    /// Write a JSON snapshot atomically (temp file + rename).
    pub fn save(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let path = path.as_ref();
        let json = {
            let tables = self.tables.lock().map_err(|_| StoreError::LockPoisoned)?;
            serde_json::to_string_pretty(&*tables).map_err(|e| StoreError::Corrupt(e.to_string()))?
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| StoreError::Io(e.to_string()))?;
        fs::rename(&tmp, path).map_err(|e| StoreError::Io(e.to_string()))
    }
}

impl RecordStore for MemoryStore {
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Tx<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut guard = self.tables.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut working = guard.clone();

        let mut tx = Tx::new(&mut working);
        let value = f(&mut tx)?;
        let events = tx.into_events();

        self.audit
            .append_all(&events)
            .map_err(|e| StoreError::AuditUnavailable(e.to_string()))?;
        *guard = working;

        Ok(value)
    }

    fn read<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Tables) -> T,
    {
        let guard = self.tables.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&guard))
    }
}
