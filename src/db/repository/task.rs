use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::db::models::{CreateTask, Task, TaskLifecycle, TaskView, UpdateTask};
use crate::domain::recurrence;
use crate::error::{AppError, AppResult};

pub struct TaskRepository;

const TASK_COLUMNS: &str = "id, user_id, title, description, color, pinned, completed, \
     deleted_at, reminder_at, reminder_sent, due_at, is_recurring, recurrence_rule, \
     recurrence_end, parent_task_id, created_at, updated_at";

fn row_to_task(r: sqlx::sqlite::SqliteRow) -> Task {
    Task {
        id: r.get("id"),
        user_id: r.get("user_id"),
        title: r.get("title"),
        description: r.get("description"),
        color: r.get("color"),
        pinned: r.get("pinned"),
        completed: r.get("completed"),
        deleted_at: r.get("deleted_at"),
        reminder_at: r.get("reminder_at"),
        reminder_sent: r.get("reminder_sent"),
        due_at: r.get("due_at"),
        is_recurring: r.get("is_recurring"),
        recurrence_rule: r.get("recurrence_rule"),
        recurrence_end: r.get("recurrence_end"),
        parent_task_id: r.get("parent_task_id"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

impl TaskRepository {
    pub async fn create(pool: &SqlitePool, user_id: &str, input: CreateTask) -> AppResult<Task> {
        if input.title.trim().is_empty() || input.title.len() > 200 {
            return Err(AppError::Validation(
                "title must be between 1 and 200 characters".to_string(),
            ));
        }
        if let Some(desc) = &input.description {
            if desc.len() > 1000 {
                return Err(AppError::Validation(
                    "description must be at most 1000 characters".to_string(),
                ));
            }
        }
        let is_recurring = input.is_recurring.unwrap_or(false);
        if is_recurring {
            let rule = input.recurrence_rule.as_deref().ok_or_else(|| {
                AppError::Validation("recurrence_rule is required when is_recurring".to_string())
            })?;
            recurrence::validate_rule(rule).map_err(|e| AppError::Validation(e.to_string()))?;
        }

        let now = Utc::now().naive_utc();
        let query = format!(
            r#"
            INSERT INTO tasks (
                user_id, title, description, color, pinned, completed,
                deleted_at, reminder_at, reminder_sent, due_at, is_recurring,
                recurrence_rule, recurrence_end, parent_task_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, 0, NULL, ?, 0, ?, ?, ?, ?, NULL, ?, ?)
            RETURNING {TASK_COLUMNS}
            "#
        );

        let row = sqlx::query(&query)
            .bind(user_id)
            .bind(&input.title)
            .bind(&input.description)
            .bind(input.color.unwrap_or_else(|| "default".to_string()))
            .bind(input.pinned.unwrap_or(false))
            .bind(input.reminder_at)
            .bind(input.due_at)
            .bind(is_recurring)
            .bind(&input.recurrence_rule)
            .bind(input.recurrence_end)
            .bind(now)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(row_to_task(row))
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> AppResult<Option<Task>> {
        let query = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(row.map(row_to_task))
    }

    async fn find_owned(pool: &SqlitePool, user_id: &str, id: i64) -> AppResult<Task> {
        let task = Self::find_by_id(pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("task {id} not found")))?;
        if task.user_id != user_id {
            return Err(AppError::Forbidden);
        }
        Ok(task)
    }

    pub async fn list(pool: &SqlitePool, user_id: &str, view: TaskView) -> AppResult<Vec<Task>> {
        let deleted_clause = match view {
            TaskView::Active => "deleted_at IS NULL",
            TaskView::Trash => "deleted_at IS NOT NULL",
        };
        let query = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ? AND {deleted_clause} \
             ORDER BY pinned DESC, created_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(rows.into_iter().map(row_to_task).collect())
    }

    /// Tasks due for a reminder right now: not deleted, reminder set and in the past, not yet sent.
    pub async fn find_due_reminders(pool: &SqlitePool) -> AppResult<Vec<Task>> {
        let query = format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE reminder_at IS NOT NULL AND reminder_at <= ? \
               AND reminder_sent = 0 AND deleted_at IS NULL \
             ORDER BY reminder_at ASC"
        );
        let now = Utc::now().naive_utc();
        let rows = sqlx::query(&query)
            .bind(now)
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(rows.into_iter().map(row_to_task).collect())
    }

    pub async fn update(
        pool: &SqlitePool,
        user_id: &str,
        id: i64,
        patch: UpdateTask,
    ) -> AppResult<Task> {
        let existing = Self::find_owned(pool, user_id, id).await?;

        if let Some(title) = &patch.title {
            if title.trim().is_empty() || title.len() > 200 {
                return Err(AppError::Validation(
                    "title must be between 1 and 200 characters".to_string(),
                ));
            }
        }
        if let Some(Some(desc)) = &patch.description {
            if desc.len() > 1000 {
                return Err(AppError::Validation(
                    "description must be at most 1000 characters".to_string(),
                ));
            }
        }
        let next_rule = match &patch.recurrence_rule {
            Some(Some(rule)) => Some(rule.clone()),
            Some(None) => None,
            None => existing.recurrence_rule.clone(),
        };
        let next_is_recurring = patch.is_recurring.unwrap_or(existing.is_recurring);
        if next_is_recurring {
            let rule = next_rule.as_deref().ok_or_else(|| {
                AppError::Validation("recurrence_rule is required when is_recurring".to_string())
            })?;
            recurrence::validate_rule(rule).map_err(|e| AppError::Validation(e.to_string()))?;
        }

        let title = patch.title.unwrap_or(existing.title);
        let description = patch.description.unwrap_or(existing.description);
        let color = patch.color.unwrap_or(existing.color);
        let pinned = patch.pinned.unwrap_or(existing.pinned);
        let due_at = patch.due_at.unwrap_or(existing.due_at);
        let recurrence_end = patch.recurrence_end.unwrap_or(existing.recurrence_end);

        // Reset reminder_sent whenever the caller touches reminder_at (I2/P2).
        let (reminder_at, reminder_sent) = match patch.reminder_at {
            Some(new_reminder_at) => (new_reminder_at, false),
            None => (existing.reminder_at, existing.reminder_sent),
        };

        let now = Utc::now().naive_utc();
        let query = format!(
            r#"
            UPDATE tasks SET
                title = ?, description = ?, color = ?, pinned = ?,
                reminder_at = ?, reminder_sent = ?, due_at = ?,
                is_recurring = ?, recurrence_rule = ?, recurrence_end = ?,
                updated_at = ?
            WHERE id = ?
            RETURNING {TASK_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(title)
            .bind(description)
            .bind(color)
            .bind(pinned)
            .bind(reminder_at)
            .bind(reminder_sent)
            .bind(due_at)
            .bind(next_is_recurring)
            .bind(next_rule)
            .bind(recurrence_end)
            .bind(now)
            .bind(id)
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(row_to_task(row))
    }

    /// Toggle `completed`. If the task transitions false -> true and is recurring,
    /// materialize the next occurrence inside the same transaction (I4).
    ///
    /// Returns the updated (just-completed-or-reopened) task and, if one was
    /// materialized, the newly created next-occurrence task.
    pub async fn toggle_complete(
        pool: &SqlitePool,
        user_id: &str,
        id: i64,
    ) -> AppResult<(Task, Option<Task>)> {
        let existing = Self::find_owned(pool, user_id, id).await?;
        let now = Utc::now().naive_utc();
        let becoming_complete = !existing.completed;

        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        let mut next_task: Option<Task> = None;
        let mut is_recurring_after = existing.is_recurring;

        if becoming_complete && existing.is_recurring {
            if let Some(rule) = &existing.recurrence_rule {
                let base = existing
                    .reminder_at
                    .or(existing.due_at)
                    .unwrap_or(now);
                let next_date = recurrence::next_occurrence(base, rule, existing.recurrence_end)
                    .map_err(|e| AppError::Validation(e.to_string()))?;

                if let Some(next_date) = next_date {
                    let parent_id = existing.parent_task_id.unwrap_or(existing.id);
                    let next_reminder_at = existing.reminder_at.map(|_| next_date);
                    let next_due_at = if existing.due_at.is_some() && existing.reminder_at.is_none()
                    {
                        Some(next_date)
                    } else {
                        None
                    };

                    let insert_query = format!(
                        r#"
                        INSERT INTO tasks (
                            user_id, title, description, color, pinned, completed,
                            deleted_at, reminder_at, reminder_sent, due_at, is_recurring,
                            recurrence_rule, recurrence_end, parent_task_id, created_at, updated_at
                        ) VALUES (?, ?, ?, ?, ?, 0, NULL, ?, 0, ?, 1, ?, ?, ?, ?, ?)
                        RETURNING {TASK_COLUMNS}
                        "#
                    );
                    let row = sqlx::query(&insert_query)
                        .bind(&existing.user_id)
                        .bind(&existing.title)
                        .bind(&existing.description)
                        .bind(&existing.color)
                        .bind(existing.pinned)
                        .bind(next_reminder_at)
                        .bind(next_due_at)
                        .bind(rule)
                        .bind(existing.recurrence_end)
                        .bind(parent_id)
                        .bind(now)
                        .bind(now)
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(AppError::Database)?;
                    next_task = Some(row_to_task(row));
                }
            }
            is_recurring_after = false;
        }

        let update_query = format!(
            r#"
            UPDATE tasks SET completed = ?, is_recurring = ?, updated_at = ?
            WHERE id = ?
            RETURNING {TASK_COLUMNS}
            "#
        );
        let row = sqlx::query(&update_query)
            .bind(becoming_complete)
            .bind(is_recurring_after)
            .bind(now)
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(AppError::Database)?;
        let updated = row_to_task(row);

        tx.commit().await.map_err(AppError::Database)?;

        Ok((updated, next_task))
    }

    pub async fn soft_delete(pool: &SqlitePool, user_id: &str, id: i64) -> AppResult<Task> {
        let existing = Self::find_owned(pool, user_id, id).await?;
        if let TaskLifecycle::Trashed(_) = existing.lifecycle() {
            return Err(AppError::Conflict(format!("task {id} is already trashed")));
        }
        let now = Utc::now().naive_utc();
        let query = format!(
            "UPDATE tasks SET deleted_at = ?, updated_at = ? WHERE id = ? RETURNING {TASK_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(now)
            .bind(now)
            .bind(id)
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(row_to_task(row))
    }

    pub async fn restore(pool: &SqlitePool, user_id: &str, id: i64) -> AppResult<Task> {
        let existing = Self::find_owned(pool, user_id, id).await?;
        if let TaskLifecycle::Active = existing.lifecycle() {
            return Err(AppError::Conflict(format!("task {id} is not trashed")));
        }
        let now = Utc::now().naive_utc();
        let query = format!(
            "UPDATE tasks SET deleted_at = NULL, updated_at = ? WHERE id = ? RETURNING {TASK_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(now)
            .bind(id)
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(row_to_task(row))
    }

    pub async fn permanent_delete(pool: &SqlitePool, user_id: &str, id: i64) -> AppResult<()> {
        Self::find_owned(pool, user_id, id).await?;
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn empty_trash(pool: &SqlitePool, user_id: &str) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM tasks WHERE user_id = ? AND deleted_at IS NOT NULL")
            .bind(user_id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected())
    }

    /// Not user-scoped: invoked by the notification worker via the service auth tier.
    /// Idempotent.
    pub async fn mark_reminder_sent(pool: &SqlitePool, id: i64) -> AppResult<Task> {
        let now = Utc::now().naive_utc();
        let query =
            format!("UPDATE tasks SET reminder_sent = 1, updated_at = ? WHERE id = ? RETURNING {TASK_COLUMNS}");
        let row = sqlx::query(&query)
            .bind(now)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| AppError::NotFound(format!("task {id} not found")))?;
        Ok(row_to_task(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::CreateTask;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn new_task(title: &str) -> CreateTask {
        CreateTask {
            title: title.to_string(),
            description: None,
            color: None,
            pinned: None,
            reminder_at: None,
            due_at: None,
            is_recurring: None,
            recurrence_rule: None,
            recurrence_end: None,
        }
    }

    #[tokio::test]
    async fn create_rejects_empty_title() {
        let pool = test_pool().await;
        let err = TaskRepository::create(&pool, "user-1", new_task("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn create_rejects_recurring_without_rule() {
        let pool = test_pool().await;
        let mut input = new_task("Water the plants");
        input.is_recurring = Some(true);
        let err = TaskRepository::create(&pool, "user-1", input).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn updating_reminder_at_resets_reminder_sent() {
        let pool = test_pool().await;
        let task = TaskRepository::create(&pool, "user-1", new_task("Pay rent"))
            .await
            .unwrap();
        TaskRepository::mark_reminder_sent(&pool, task.id).await.unwrap();

        let patched = TaskRepository::update(
            &pool,
            "user-1",
            task.id,
            UpdateTask {
                reminder_at: Some(Some(Utc::now().naive_utc())),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(!patched.reminder_sent);
    }

    #[tokio::test]
    async fn completing_a_recurring_task_materializes_the_next_occurrence() {
        let pool = test_pool().await;
        let mut input = new_task("Take out the trash");
        input.is_recurring = Some(true);
        input.recurrence_rule = Some("daily".to_string());
        input.due_at = Some(Utc::now().naive_utc());
        let task = TaskRepository::create(&pool, "user-1", input).await.unwrap();

        let (completed, next) = TaskRepository::toggle_complete(&pool, "user-1", task.id)
            .await
            .unwrap();

        assert!(completed.completed);
        assert!(!completed.is_recurring);
        let next = next.expect("recurring completion should materialize a successor");
        assert!(next.is_recurring);
        assert_eq!(next.parent_task_id, Some(task.id));
        assert!(next.due_at.unwrap() > task.due_at.unwrap());
    }

    #[tokio::test]
    async fn soft_delete_twice_is_a_conflict() {
        let pool = test_pool().await;
        let task = TaskRepository::create(&pool, "user-1", new_task("Renew passport"))
            .await
            .unwrap();
        TaskRepository::soft_delete(&pool, "user-1", task.id).await.unwrap();

        let err = TaskRepository::soft_delete(&pool, "user-1", task.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn restoring_an_active_task_is_a_conflict() {
        let pool = test_pool().await;
        let task = TaskRepository::create(&pool, "user-1", new_task("Book dentist"))
            .await
            .unwrap();

        let err = TaskRepository::restore(&pool, "user-1", task.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn other_users_tasks_are_forbidden() {
        let pool = test_pool().await;
        let task = TaskRepository::create(&pool, "user-1", new_task("Private"))
            .await
            .unwrap();

        let err = TaskRepository::soft_delete(&pool, "user-2", task.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }
}
