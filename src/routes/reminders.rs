//! Externally-triggered binding for environments where the in-process
//! scheduler loop is disabled (`SCHEDULER_ENABLED=false`) in favor of an
//! outside cron invoking this endpoint directly.

use std::sync::Arc;

use axum::{routing::post, Json, Router};
use axum::extract::State;
use serde::Serialize;

use crate::error::AppResult;
use crate::routes::auth::InternalAuth;
use crate::services::scheduler;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/binding", post(trigger_tick))
}

#[derive(Debug, Serialize)]
pub struct BindingResponse {
    pub status: &'static str,
    pub tasks_scanned: usize,
    pub reminders_published: usize,
}

async fn trigger_tick(
    State(state): State<Arc<AppState>>,
    _auth: InternalAuth,
) -> AppResult<Json<BindingResponse>> {
    let summary = scheduler::run_tick(&state).await?;
    Ok(Json(BindingResponse {
        status: "ok",
        tasks_scanned: summary.tasks_scanned,
        reminders_published: summary.reminders_published,
    }))
}
