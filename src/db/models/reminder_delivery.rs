use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row per (task, subscription) pair queued for push dispatch.
/// Backs the `reminders` bus topic (see SPEC_FULL.md §4.5).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ReminderDelivery {
    pub id: String,
    pub task_id: i64,
    pub subscription_id: String,
    pub user_id: String,
    pub payload_json: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_attempt_at: NaiveDateTime,
    pub last_error: Option<String>,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

pub struct CreateReminderDelivery {
    pub task_id: i64,
    pub subscription_id: String,
    pub user_id: String,
    pub payload_json: String,
    pub max_attempts: i32,
}

/// The wire shape published on the `reminders` topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderEvent {
    pub task_id: i64,
    pub user_id: String,
    pub title: String,
    pub reminder_at: NaiveDateTime,
    pub due_at: Option<NaiveDateTime>,
    pub push_subscription: ReminderEventSubscription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderEventSubscription {
    pub endpoint: String,
    pub p256dh_key: String,
    pub auth_key: String,
}
