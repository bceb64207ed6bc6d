//! Completion and reminder-acknowledgement endpoints. Task CRUD (create,
//! list, update, soft-delete, restore) lives one layer down in
//! `db::repository::TaskRepository`; this module only covers the two
//! operations the reminder engine itself needs to expose over HTTP.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::patch,
    Json, Router,
};
use serde::Serialize;

use crate::db::models::{Task, TaskEvent, TaskEventType};
use crate::db::repository::TaskRepository;
use crate::error::AppResult;
use crate::event_bus::{EventBus, SqliteEventBus};
use crate::routes::auth::{ServiceAuth, UserAuth};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:id/complete", patch(complete_task))
        .route("/:id/reminder-sent", patch(mark_reminder_sent))
}

#[derive(Debug, Serialize)]
pub struct CompleteTaskResponse {
    pub task: Task,
    pub next_occurrence: Option<Task>,
}

/// Toggle a task's completion. On a recurring task's false->true transition
/// this also materializes the next occurrence (I4) and publishes a
/// `completed` event for the new state.
async fn complete_task(
    State(state): State<Arc<AppState>>,
    UserAuth(user_id): UserAuth,
    Path(id): Path<i64>,
) -> AppResult<Json<CompleteTaskResponse>> {
    let (task, next_occurrence) = TaskRepository::toggle_complete(&state.db, &user_id, id).await?;

    if task.completed {
        let event = TaskEvent {
            event_type: TaskEventType::Completed,
            task_id: task.id,
            user_id: task.user_id.clone(),
            task_data: serde_json::to_value(&task).unwrap_or(serde_json::Value::Null),
            is_recurring: task.is_recurring,
            recurrence_rule: task.recurrence_rule.clone(),
        };
        let bus = SqliteEventBus::new(state.db.clone());
        if let Err(e) = bus.publish_task_event(event).await {
            tracing::warn!(task_id = task.id, "failed to append task completed event: {e:?}");
        }
    }

    Ok(Json(CompleteTaskResponse {
        task,
        next_occurrence,
    }))
}

/// Called by the notification worker, via the service credential, once a
/// reminder has been dispatched. Not user-scoped.
async fn mark_reminder_sent(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(id): Path<i64>,
) -> AppResult<Json<Task>> {
    let task = TaskRepository::mark_reminder_sent(&state.db, id).await?;
    Ok(Json(task))
}
