//! The reminder scheduler: a periodic scan-and-publish tick.
//! Loop shape grounded on `services/init.rs`'s EventSub sync worker
//! (`tokio::select!` between shutdown and a sleep); query shape grounded on
//! the original `/reminder-cron` handler.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::db::models::{ReminderEvent, ReminderEventSubscription};
use crate::db::repository::{PushSubscriptionRepository, TaskRepository};
use crate::error::AppResult;
use crate::event_bus::{EventBus, SqliteEventBus};
use crate::AppState;

pub struct TickSummary {
    pub tasks_scanned: usize,
    pub reminders_published: usize,
}

/// One scan-and-publish pass. Does NOT mark `reminder_sent` — the worker
/// does that only after a successful push (§4.2).
pub async fn run_tick(state: &AppState) -> AppResult<TickSummary> {
    let bus = SqliteEventBus::new(state.db.clone());
    let due_tasks = TaskRepository::find_due_reminders(&state.db).await?;
    let tasks_scanned = due_tasks.len();
    let mut reminders_published = 0usize;

    for task in due_tasks {
        let subscriptions = PushSubscriptionRepository::list_by_user(&state.db, &task.user_id).await?;
        if subscriptions.is_empty() {
            tracing::debug!(task_id = task.id, "due task has no push subscriptions, skipping tick");
            continue;
        }

        for subscription in subscriptions {
            let event = ReminderEvent {
                task_id: task.id,
                user_id: task.user_id.clone(),
                title: task.title.clone(),
                reminder_at: task.reminder_at.unwrap_or_else(|| Utc::now().naive_utc()),
                due_at: task.due_at,
                push_subscription: ReminderEventSubscription {
                    endpoint: subscription.endpoint.clone(),
                    p256dh_key: subscription.p256dh_key.clone(),
                    auth_key: subscription.auth_key.clone(),
                },
            };

            let published = bus
                .publish_reminder(
                    task.id,
                    &subscription.id,
                    &task.user_id,
                    state.config.worker.max_attempts as i32,
                    &event,
                )
                .await;

            match published {
                Ok(_) => reminders_published += 1,
                Err(e) => {
                    // Publish failure: log and continue. reminder_sent stays false,
                    // so the next tick retries this (task, subscription) pair.
                    tracing::warn!(
                        task_id = task.id,
                        subscription_id = subscription.id,
                        "failed to publish reminder event: {e}"
                    );
                }
            }
        }
    }

    tracing::info!(tasks_scanned, reminders_published, "scheduler tick complete");
    Ok(TickSummary {
        tasks_scanned,
        reminders_published,
    })
}

pub fn spawn_scheduler_loop(
    state: Arc<AppState>,
    shutdown: tokio::sync::broadcast::Sender<()>,
) -> tokio::task::JoinHandle<()> {
    let mut shutdown_rx = shutdown.subscribe();

    tokio::spawn(async move {
        if !state.config.scheduler.enabled {
            tracing::info!("reminder scheduler disabled, loop exiting");
            return;
        }

        loop {
            if let Err(e) = run_tick(&state).await {
                tracing::warn!("scheduler tick failed: {e:?}");
            }

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("reminder scheduler shutting down");
                    break;
                }
                _ = tokio::time::sleep(Duration::from_secs(state.config.scheduler.tick_interval_seconds)) => {}
            }
        }
    })
}
