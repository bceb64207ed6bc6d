use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::TaskEvent;
use crate::error::{AppError, AppResult};

/// Append-only log backing the `task-events` bus topic. This core only
/// produces events (see SPEC_FULL.md §4.5); there is no in-process consumer.
pub struct TaskEventRepository;

impl TaskEventRepository {
    pub async fn append(pool: &SqlitePool, event: TaskEvent) -> AppResult<()> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();
        let task_data_json = serde_json::to_string(&event.task_data)
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

        sqlx::query(
            r#"
            INSERT INTO task_events (
                id, event_type, task_id, user_id, task_data_json,
                is_recurring, recurrence_rule, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(event.event_type.as_str())
        .bind(event.task_id)
        .bind(event.user_id)
        .bind(task_data_json)
        .bind(event.is_recurring)
        .bind(event.recurrence_rule)
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }
}
