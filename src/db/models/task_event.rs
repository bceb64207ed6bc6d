use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Append-only publish log backing the `task-events` bus topic.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TaskEventRow {
    pub id: String,
    pub event_type: String,
    pub task_id: i64,
    pub user_id: String,
    pub task_data_json: String,
    pub is_recurring: bool,
    pub recurrence_rule: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub event_type: TaskEventType,
    pub task_id: i64,
    pub user_id: String,
    pub task_data: serde_json::Value,
    pub is_recurring: bool,
    pub recurrence_rule: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventType {
    Created,
    Updated,
    Completed,
    Deleted,
}

impl TaskEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskEventType::Created => "created",
            TaskEventType::Updated => "updated",
            TaskEventType::Completed => "completed",
            TaskEventType::Deleted => "deleted",
        }
    }
}
