use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub color: String,
    pub pinned: bool,
    pub completed: bool,
    pub deleted_at: Option<NaiveDateTime>,
    pub reminder_at: Option<NaiveDateTime>,
    pub reminder_sent: bool,
    pub due_at: Option<NaiveDateTime>,
    pub is_recurring: bool,
    pub recurrence_rule: Option<String>,
    pub recurrence_end: Option<NaiveDateTime>,
    pub parent_task_id: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Lifecycle view derived from `deleted_at`, so call sites cannot forget to check it.
pub enum TaskLifecycle {
    Active,
    Trashed(NaiveDateTime),
}

impl Task {
    pub fn lifecycle(&self) -> TaskLifecycle {
        match self.deleted_at {
            Some(at) => TaskLifecycle::Trashed(at),
            None => TaskLifecycle::Active,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTask {
    pub title: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub pinned: Option<bool>,
    pub reminder_at: Option<NaiveDateTime>,
    pub due_at: Option<NaiveDateTime>,
    pub is_recurring: Option<bool>,
    pub recurrence_rule: Option<String>,
    pub recurrence_end: Option<NaiveDateTime>,
}

/// Partial update. `None` fields are left untouched; `reminder_at: Some(None)` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub color: Option<String>,
    pub pinned: Option<bool>,
    pub reminder_at: Option<Option<NaiveDateTime>>,
    pub due_at: Option<Option<NaiveDateTime>>,
    pub is_recurring: Option<bool>,
    pub recurrence_rule: Option<Option<String>>,
    pub recurrence_end: Option<Option<NaiveDateTime>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskView {
    Active,
    Trash,
}
