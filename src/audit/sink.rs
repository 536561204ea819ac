//! Audit sinks
//!
//! The audit trail is append-only: records are never rewritten or purged
//! by this crate.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::event::{AuditAction, AuditEvent, EntityRef};

/// Append-only audit sink.
pub trait AuditSink: Send + Sync {
    /// Append a record. The record MUST be visible after this returns.
    fn append(&self, event: &AuditEvent) -> io::Result<()>;

    /// Append several records in order.
    fn append_all(&self, events: &[AuditEvent]) -> io::Result<()> {
        for event in events {
            self.append(event)?;
        }
        Ok(())
    }
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "audit sink lock poisoned")
}

/// File-backed sink: one JSON record per line, fsynced per append.
pub struct FileAuditSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileAuditSink {
    /// Open or create an audit log file.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Get the audit log path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for FileAuditSink {
    fn append(&self, event: &AuditEvent) -> io::Result<()> {
        let line = event
            .to_json()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut writer = self.writer.lock().map_err(|_| poisoned())?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        writer.get_ref().sync_data()
    }
}

/// In-memory audit sink for tests and the default wiring.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    /// Create a new in-memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<AuditEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// All recorded events, in append order.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.guard().clone()
    }

    /// Events with the given action.
    pub fn with_action(&self, action: AuditAction) -> Vec<AuditEvent> {
        self.guard()
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }

    /// Events about the given entity.
    pub fn for_entity(&self, entity: EntityRef) -> Vec<AuditEvent> {
        self.guard()
            .iter()
            .filter(|e| e.entity == entity)
            .cloned()
            .collect()
    }

    /// Get the number of records.
    pub fn len(&self) -> usize {
        self.guard().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, event: &AuditEvent) -> io::Result<()> {
        self.events.lock().map_err(|_| poisoned())?.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::fs;
    use tempfile::tempdir;
    use uuid::Uuid;

    #[test]
    fn test_memory_sink_preserves_order() {
        let sink = MemoryAuditSink::new();
        let switch_id = Uuid::new_v4();

        sink.append(&AuditEvent::new(EntityRef::Switch(switch_id), AuditAction::SwitchCreated, Utc::now()))
            .unwrap();
        sink.append(&AuditEvent::new(EntityRef::Switch(switch_id), AuditAction::CheckIn, Utc::now()))
            .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, AuditAction::SwitchCreated);
        assert_eq!(events[1].action, AuditAction::CheckIn);
        assert_eq!(sink.for_entity(EntityRef::Switch(switch_id)).len(), 2);
        assert_eq!(sink.with_action(AuditAction::CheckIn).len(), 1);
    }

    #[test]
    fn test_file_sink_appends_json_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("audit.log");

        let sink = FileAuditSink::open(&path).unwrap();
        let events = vec![
            AuditEvent::new(EntityRef::Message(Uuid::new_v4()), AuditAction::MessageDelivered, Utc::now()),
            AuditEvent::new(EntityRef::Message(Uuid::new_v4()), AuditAction::DeliveryFailed, Utc::now()),
        ];
        sink.append_all(&events).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("MESSAGE_DELIVERED"));
        assert!(lines[1].contains("DELIVERY_FAILED"));
    }

    #[test]
    fn test_file_sink_reopen_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");

        for _ in 0..2 {
            let sink = FileAuditSink::open(&path).unwrap();
            sink.append(&AuditEvent::new(EntityRef::User(Uuid::new_v4()), AuditAction::SwitchCreated, Utc::now()))
                .unwrap();
        }

        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
    }
}
