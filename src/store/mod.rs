//! # Record Store
//!
//! The persistent store is an external collaborator. This module fixes its
//! contract: every state-changing operation runs as one unit of work that
//! reads, validates, writes records and stages audit events, then commits
//! or aborts as a whole.

mod errors;
mod memory;
pub mod model;
mod tables;

use std::ops::{Deref, DerefMut};

use crate::audit::AuditEvent;

pub use errors::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use model::*;
pub use tables::Tables;

/// Transactional record store.
pub trait RecordStore: Send + Sync {
    /// Run `f` as one atomic unit of work.
    ///
    /// Records written through the [`Tx`] and the audit events staged on it
    /// become visible together when `f` returns `Ok`. On `Err` nothing is
    /// published.
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Tx<'_>) -> Result<T, E>,
        E: From<StoreError>;

    /// Consistent read-only view.
    fn read<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Tables) -> T;
}

/// An open unit of work.
pub struct Tx<'a> {
    tables: &'a mut Tables,
    events: Vec<AuditEvent>,
}

impl<'a> Tx<'a> {
    pub fn new(tables: &'a mut Tables) -> Self {
        Self {
            tables,
            events: Vec::new(),
        }
    }

    /// Stage an audit event for commit.
    pub fn audit(&mut self, event: AuditEvent) {
        self.events.push(event);
    }

    pub fn into_events(self) -> Vec<AuditEvent> {
        self.events
    }
}

impl Deref for Tx<'_> {
    type Target = Tables;

    fn deref(&self) -> &Tables {
        self.tables
    }
}

impl DerefMut for Tx<'_> {
    fn deref_mut(&mut self) -> &mut Tables {
        self.tables
    }
}
