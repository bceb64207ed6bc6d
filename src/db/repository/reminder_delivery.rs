use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{CreateReminderDelivery, ReminderDelivery};
use crate::error::{AppError, AppResult};

const COLUMNS: &str = "id, task_id, subscription_id, user_id, payload_json, attempts, \
     max_attempts, next_attempt_at, last_error, status, created_at, updated_at";

/// Durable queue backing the `reminders` bus topic.
///
/// Claiming uses an atomic single-statement UPDATE with a subselect:
/// `UPDATE ... WHERE id = (SELECT id FROM ... LIMIT 1) RETURNING ...`.
/// This avoids a long-lived transaction and reduces contention on SQLite,
/// mirroring the notification retry queue this crate grew out of.
pub struct ReminderDeliveryRepository;

impl ReminderDeliveryRepository {
    pub async fn enqueue(
        pool: &SqlitePool,
        delivery: CreateReminderDelivery,
    ) -> AppResult<ReminderDelivery> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        let row = sqlx::query_as::<_, ReminderDelivery>(&format!(
            r#"
            INSERT INTO reminder_deliveries (
                id, task_id, subscription_id, user_id, payload_json,
                attempts, max_attempts, next_attempt_at, last_error, status,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, 0, ?, ?, NULL, 'pending', ?, ?)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(delivery.task_id)
        .bind(delivery.subscription_id)
        .bind(delivery.user_id)
        .bind(delivery.payload_json)
        .bind(delivery.max_attempts)
        .bind(now)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Claim up to `limit` due deliveries, one atomic UPDATE per row.
    pub async fn claim_due(pool: &SqlitePool, limit: i64) -> AppResult<Vec<ReminderDelivery>> {
        let mut claimed = Vec::new();
        if limit <= 0 {
            return Ok(claimed);
        }

        for _ in 0..(limit as usize) {
            let now = Utc::now().naive_utc();

            let opt = sqlx::query_as::<_, ReminderDelivery>(&format!(
                r#"
                UPDATE reminder_deliveries
                SET status = 'processing', updated_at = ?
                WHERE id = (
                    SELECT id FROM reminder_deliveries
                    WHERE status = 'pending' AND next_attempt_at <= CURRENT_TIMESTAMP
                    ORDER BY next_attempt_at ASC
                    LIMIT 1
                )
                RETURNING {COLUMNS}
                "#
            ))
            .bind(now)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)?;

            match opt {
                Some(delivery) => claimed.push(delivery),
                None => break,
            }
        }

        Ok(claimed)
    }

    pub async fn mark_succeeded(pool: &SqlitePool, id: &str) -> AppResult<ReminderDelivery> {
        let now = Utc::now().naive_utc();
        let row = sqlx::query_as::<_, ReminderDelivery>(&format!(
            "UPDATE reminder_deliveries SET status = 'succeeded', updated_at = ? WHERE id = ? RETURNING {COLUMNS}"
        ))
        .bind(now)
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(row)
    }

    /// Increment attempts, reschedule with the caller-computed backoff, and move
    /// to `dead` once `attempts + 1 >= max_attempts`.
    pub async fn register_attempt_and_schedule(
        pool: &SqlitePool,
        id: &str,
        next_attempt_at: chrono::NaiveDateTime,
        last_error: Option<String>,
    ) -> AppResult<ReminderDelivery> {
        let now = Utc::now().naive_utc();
        let row = sqlx::query_as::<_, ReminderDelivery>(&format!(
            r#"
            UPDATE reminder_deliveries
            SET
                attempts = attempts + 1,
                next_attempt_at = ?,
                last_error = ?,
                status = CASE WHEN attempts + 1 >= max_attempts THEN 'dead' ELSE 'pending' END,
                updated_at = ?
            WHERE id = ?
            RETURNING {COLUMNS}
            "#
        ))
        .bind(next_attempt_at)
        .bind(last_error)
        .bind(now)
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(row)
    }

    pub async fn mark_dead(
        pool: &SqlitePool,
        id: &str,
        last_error: Option<String>,
    ) -> AppResult<ReminderDelivery> {
        let now = Utc::now().naive_utc();
        let row = sqlx::query_as::<_, ReminderDelivery>(&format!(
            "UPDATE reminder_deliveries SET status = 'dead', last_error = ?, updated_at = ? WHERE id = ? RETURNING {COLUMNS}"
        ))
        .bind(last_error)
        .bind(now)
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        let now = Utc::now().naive_utc();
        sqlx::query(
            "INSERT INTO tasks (id, user_id, title, created_at, updated_at) \
             VALUES (1, 'user-1', 'sample task', ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query(
            "INSERT INTO push_subscriptions \
             (id, user_id, endpoint, p256dh_key, auth_key, created_at, updated_at) \
             VALUES ('sub-1', 'user-1', 'https://example.com/push', 'p256dh', 'auth', ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();

        pool
    }

    fn sample_delivery() -> CreateReminderDelivery {
        CreateReminderDelivery {
            task_id: 1,
            subscription_id: "sub-1".to_string(),
            user_id: "user-1".to_string(),
            payload_json: "{}".to_string(),
            max_attempts: 3,
        }
    }

    #[tokio::test]
    async fn claim_due_hides_a_row_already_claimed() {
        let pool = test_pool().await;
        ReminderDeliveryRepository::enqueue(&pool, sample_delivery())
            .await
            .unwrap();

        let first_claim = ReminderDeliveryRepository::claim_due(&pool, 5).await.unwrap();
        assert_eq!(first_claim.len(), 1);
        assert_eq!(first_claim[0].status, "processing");

        let second_claim = ReminderDeliveryRepository::claim_due(&pool, 5).await.unwrap();
        assert!(second_claim.is_empty());
    }

    #[tokio::test]
    async fn register_attempt_moves_to_dead_at_max_attempts() {
        let pool = test_pool().await;
        let delivery = ReminderDeliveryRepository::enqueue(
            &pool,
            CreateReminderDelivery {
                max_attempts: 1,
                ..sample_delivery()
            },
        )
        .await
        .unwrap();

        let next_attempt_at = Utc::now().naive_utc();
        let updated = ReminderDeliveryRepository::register_attempt_and_schedule(
            &pool,
            &delivery.id,
            next_attempt_at,
            Some("gateway timeout".to_string()),
        )
        .await
        .unwrap();

        assert_eq!(updated.attempts, 1);
        assert_eq!(updated.status, "dead");
    }
}
