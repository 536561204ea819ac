//! Scheduler trigger route
//!
//! `POST /scheduler/run` with the shared bearer secret runs one sweep.
//! Repeated or overlapping calls are safe; the sweep is idempotent.

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};

use super::errors::ApiError;
use super::state::ApiState;
use crate::scheduler::CycleReport;
use crate::store::RecordStore;

pub fn scheduler_routes<S: RecordStore + 'static>() -> Router<Arc<ApiState<S>>> {
    Router::new().route("/scheduler/run", post(run_handler::<S>))
}

async fn run_handler<S: RecordStore + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    headers: HeaderMap,
) -> Result<Json<CycleReport>, ApiError> {
    if !state.authorize_scheduler(&headers) {
        tracing::warn!("scheduler trigger rejected");
        return Err(ApiError::unauthorized());
    }

    let worker = state.clone();
    let report = tokio::task::spawn_blocking(move || {
        let report = worker.app.scheduler.run_cycle();
        worker.cycle_finished(&report);
        report
    })
    .await?;
    Ok(Json(report))
}
