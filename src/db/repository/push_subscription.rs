use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db::models::PushSubscription;
use crate::error::{AppError, AppResult};

pub struct PushSubscriptionRepository;

const COLUMNS: &str =
    "id, user_id, endpoint, p256dh_key, auth_key, user_agent, created_at, updated_at";

fn row_to_subscription(r: sqlx::sqlite::SqliteRow) -> PushSubscription {
    PushSubscription {
        id: r.get("id"),
        user_id: r.get("user_id"),
        endpoint: r.get("endpoint"),
        p256dh_key: r.get("p256dh_key"),
        auth_key: r.get("auth_key"),
        user_agent: r.get("user_agent"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

impl PushSubscriptionRepository {
    /// Upsert by `(user_id, endpoint)`: a repeat registration replaces the keys (P8).
    pub async fn upsert(
        pool: &SqlitePool,
        user_id: &str,
        endpoint: &str,
        p256dh_key: &str,
        auth_key: &str,
        user_agent: Option<&str>,
    ) -> AppResult<PushSubscription> {
        let now = Utc::now().naive_utc();

        let updated = sqlx::query(
            r#"
            UPDATE push_subscriptions
            SET p256dh_key = ?, auth_key = ?, user_agent = ?, updated_at = ?
            WHERE user_id = ? AND endpoint = ?
            "#,
        )
        .bind(p256dh_key)
        .bind(auth_key)
        .bind(user_agent)
        .bind(now)
        .bind(user_id)
        .bind(endpoint)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        if updated.rows_affected() > 0 {
            let query = format!("SELECT {COLUMNS} FROM push_subscriptions WHERE user_id = ? AND endpoint = ?");
            let row = sqlx::query(&query)
                .bind(user_id)
                .bind(endpoint)
                .fetch_one(pool)
                .await
                .map_err(AppError::Database)?;
            return Ok(row_to_subscription(row));
        }

        let id = Uuid::new_v4().to_string();
        let query = format!(
            "INSERT INTO push_subscriptions (id, user_id, endpoint, p256dh_key, auth_key, user_agent, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(&id)
            .bind(user_id)
            .bind(endpoint)
            .bind(p256dh_key)
            .bind(auth_key)
            .bind(user_agent)
            .bind(now)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(row_to_subscription(row))
    }

    pub async fn list_by_user(pool: &SqlitePool, user_id: &str) -> AppResult<Vec<PushSubscription>> {
        let query = format!("SELECT {COLUMNS} FROM push_subscriptions WHERE user_id = ?");
        let rows = sqlx::query(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(rows.into_iter().map(row_to_subscription).collect())
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<PushSubscription>> {
        let query = format!("SELECT {COLUMNS} FROM push_subscriptions WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(row.map(row_to_subscription))
    }

    pub async fn delete_by_endpoint(pool: &SqlitePool, user_id: &str, endpoint: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM push_subscriptions WHERE user_id = ? AND endpoint = ?")
            .bind(user_id)
            .bind(endpoint)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn delete_all(pool: &SqlitePool, user_id: &str) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE user_id = ?")
            .bind(user_id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected())
    }

    /// Worker-facing, unscoped: a terminal push failure deletes the subscription
    /// regardless of caller identity (P9).
    pub async fn delete_by_id(pool: &SqlitePool, id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM push_subscriptions WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn upsert_is_idempotent_on_user_and_endpoint() {
        let pool = test_pool().await;

        let first = PushSubscriptionRepository::upsert(
            &pool,
            "user-1",
            "https://push.example/abc",
            "p256dh-1",
            "auth-1",
            Some("curl/8.0"),
        )
        .await
        .unwrap();

        let second = PushSubscriptionRepository::upsert(
            &pool,
            "user-1",
            "https://push.example/abc",
            "p256dh-2",
            "auth-2",
            None,
        )
        .await
        .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.p256dh_key, "p256dh-2");

        let subs = PushSubscriptionRepository::list_by_user(&pool, "user-1")
            .await
            .unwrap();
        assert_eq!(subs.len(), 1);
    }

    #[tokio::test]
    async fn delete_by_id_is_unscoped() {
        let pool = test_pool().await;

        let sub = PushSubscriptionRepository::upsert(
            &pool,
            "user-2",
            "https://push.example/xyz",
            "p256dh",
            "auth",
            None,
        )
        .await
        .unwrap();

        PushSubscriptionRepository::delete_by_id(&pool, &sub.id)
            .await
            .unwrap();

        assert!(PushSubscriptionRepository::find_by_id(&pool, &sub.id)
            .await
            .unwrap()
            .is_none());
    }
}
