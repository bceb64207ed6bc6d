//! The publish/subscribe seam named in SPEC_FULL.md §4.5. `SqliteEventBus`
//! is the only adapter this core ships, backed by the durable-outbox
//! repositories; a future Kafka/SQS adapter would implement the same
//! trait without touching `services::scheduler`/`services::worker`.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{CreateReminderDelivery, ReminderDelivery, ReminderEvent, TaskEvent};
use crate::db::repository::{ReminderDeliveryRepository, TaskEventRepository};
use crate::error::{AppError, AppResult};

/// Mirrors the notification worker's state machine (§4.4).
pub enum DeliveryOutcome {
    Succeeded,
    Terminal,
    Transient {
        next_attempt_at: NaiveDateTime,
        error: String,
    },
    Drop {
        error: String,
    },
}

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish one (task, subscription) reminder. Returns the delivery id.
    async fn publish_reminder(
        &self,
        task_id: i64,
        subscription_id: &str,
        user_id: &str,
        max_attempts: i32,
        event: &ReminderEvent,
    ) -> AppResult<Uuid>;

    /// Claim up to `limit` due deliveries for processing.
    async fn claim_due_reminders(&self, limit: i64) -> AppResult<Vec<ReminderDelivery>>;

    /// Acknowledge a claimed delivery with its terminal or retry outcome.
    async fn ack_reminder(&self, id: &str, outcome: DeliveryOutcome) -> AppResult<()>;

    async fn publish_task_event(&self, event: TaskEvent) -> AppResult<()>;
}

pub struct SqliteEventBus {
    pool: SqlitePool,
}

impl SqliteEventBus {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteEventBus { pool }
    }
}

#[async_trait]
impl EventBus for SqliteEventBus {
    async fn publish_reminder(
        &self,
        task_id: i64,
        subscription_id: &str,
        user_id: &str,
        max_attempts: i32,
        event: &ReminderEvent,
    ) -> AppResult<Uuid> {
        let payload_json =
            serde_json::to_string(event).map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

        let delivery = ReminderDeliveryRepository::enqueue(
            &self.pool,
            CreateReminderDelivery {
                task_id,
                subscription_id: subscription_id.to_string(),
                user_id: user_id.to_string(),
                payload_json,
                max_attempts,
            },
        )
        .await?;

        Uuid::parse_str(&delivery.id).map_err(|e| AppError::Internal(anyhow::anyhow!(e)))
    }

    async fn claim_due_reminders(&self, limit: i64) -> AppResult<Vec<ReminderDelivery>> {
        ReminderDeliveryRepository::claim_due(&self.pool, limit).await
    }

    async fn ack_reminder(&self, id: &str, outcome: DeliveryOutcome) -> AppResult<()> {
        match outcome {
            DeliveryOutcome::Succeeded => {
                ReminderDeliveryRepository::mark_succeeded(&self.pool, id).await?;
            }
            DeliveryOutcome::Transient {
                next_attempt_at,
                error,
            } => {
                ReminderDeliveryRepository::register_attempt_and_schedule(
                    &self.pool,
                    id,
                    next_attempt_at,
                    Some(error),
                )
                .await?;
            }
            // Terminal: the subscription is gone, so there's nothing left to retry
            // against, but nothing was actually delivered either — `dead`, not `succeeded`.
            DeliveryOutcome::Terminal => {
                ReminderDeliveryRepository::mark_dead(
                    &self.pool,
                    id,
                    Some("subscription rejected permanently".to_string()),
                )
                .await?;
            }
            DeliveryOutcome::Drop { error } => {
                ReminderDeliveryRepository::mark_dead(&self.pool, id, Some(error)).await?;
            }
        }
        Ok(())
    }

    async fn publish_task_event(&self, event: TaskEvent) -> AppResult<()> {
        TaskEventRepository::append(&self.pool, event).await
    }
}
