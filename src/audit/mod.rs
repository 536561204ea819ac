//! # Audit Trail
//!
//! Append-only record of every state-changing action. The sink is an
//! external collaborator; this module defines its interface and two
//! implementations.

mod event;
mod sink;

pub use event::{AuditAction, AuditEvent, EntityRef};
pub use sink::{AuditSink, FileAuditSink, MemoryAuditSink};
