//! Shared route state

use std::sync::Arc;

use axum::http::{header::AUTHORIZATION, HeaderMap};

use crate::app::DeadSwitch;
use crate::crypto::constant_time_str_eq;
use crate::scheduler::CycleReport;
use crate::store::RecordStore;

/// Hook run after every HTTP-triggered cycle (e.g. snapshot the store).
pub type CycleHook = Arc<dyn Fn(&CycleReport) + Send + Sync>;

pub struct ApiState<S: RecordStore> {
    pub app: DeadSwitch<S>,
    scheduler_secret: String,
    after_cycle: Option<CycleHook>,
}

impl<S: RecordStore> ApiState<S> {
    pub fn new(app: DeadSwitch<S>, scheduler_secret: impl Into<String>) -> Self {
        Self {
            app,
            scheduler_secret: scheduler_secret.into(),
            after_cycle: None,
        }
    }

    pub fn with_cycle_hook(mut self, hook: CycleHook) -> Self {
        self.after_cycle = Some(hook);
        self
    }

    /// Whether `headers` carry `Authorization: Bearer <scheduler secret>`.
    pub fn authorize_scheduler(&self, headers: &HeaderMap) -> bool {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map_or(false, |token| {
                constant_time_str_eq(token.trim(), &self.scheduler_secret)
            })
    }

    pub(crate) fn cycle_finished(&self, report: &CycleReport) {
        if let Some(hook) = &self.after_cycle {
            hook(report);
        }
    }
}
