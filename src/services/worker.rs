//! The notification worker: claims due reminder deliveries and dispatches
//! them via Web Push. State machine and loop shape grounded on
//! `services/notifications.rs::process_queued_task` and
//! `services/init.rs`'s notification retry worker loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::db::models::ReminderDelivery;
use crate::db::repository::{PushSubscriptionRepository, TaskRepository};
use crate::error::AppResult;
use crate::event_bus::{DeliveryOutcome, EventBus, SqliteEventBus};
use crate::services::push::{self, PushOutcome};
use crate::AppState;

/// Process a single claimed delivery end to end. Never propagates an error
/// that would poison the claim loop — failures are logged and the delivery
/// is left in whatever state the repository call already set.
pub async fn process_claimed_delivery(state: &AppState, delivery: ReminderDelivery) {
    if let Err(e) = process_inner(state, &delivery).await {
        tracing::warn!(delivery_id = delivery.id, "failed to process reminder delivery: {e:?}");
    }
}

async fn process_inner(state: &AppState, delivery: &ReminderDelivery) -> AppResult<()> {
    let bus = SqliteEventBus::new(state.db.clone());

    let event: crate::db::models::ReminderEvent = match serde_json::from_str(&delivery.payload_json)
    {
        Ok(e) => e,
        Err(e) => {
            // Malformed event: ack with DROP so the queue doesn't spin on it forever.
            tracing::error!(delivery_id = delivery.id, "dropping malformed reminder event: {e}");
            bus.ack_reminder(&delivery.id, DeliveryOutcome::Drop { error: e.to_string() })
                .await?;
            return Ok(());
        }
    };

    // Dedup probe: if the task's reminder already latched sent, another
    // delivery for the same (task, reminder_at) beat us to it.
    if let Some(task) = TaskRepository::find_by_id(&state.db, delivery.task_id).await? {
        if task.reminder_sent {
            tracing::debug!(delivery_id = delivery.id, task_id = task.id, "reminder already sent, acking without dispatch");
            bus.ack_reminder(&delivery.id, DeliveryOutcome::Succeeded).await?;
            return Ok(());
        }
    } else {
        tracing::warn!(delivery_id = delivery.id, task_id = delivery.task_id, "task no longer exists, dropping delivery");
        bus.ack_reminder(
            &delivery.id,
            DeliveryOutcome::Drop {
                error: "task not found".to_string(),
            },
        )
        .await?;
        return Ok(());
    }

    let timeout = Duration::from_secs(state.config.worker.push_gateway_timeout_seconds);
    let outcome = push::send_reminder_push(&state.config.vapid, &event, timeout).await;

    match outcome {
        PushOutcome::Delivered => {
            TaskRepository::mark_reminder_sent(&state.db, delivery.task_id).await?;
            bus.ack_reminder(&delivery.id, DeliveryOutcome::Succeeded).await?;
        }
        PushOutcome::Terminal(err) => {
            tracing::info!(
                delivery_id = delivery.id,
                subscription_id = delivery.subscription_id,
                "subscription rejected permanently, removing: {err}"
            );
            PushSubscriptionRepository::delete_by_id(&state.db, &delivery.subscription_id).await?;
            bus.ack_reminder(&delivery.id, DeliveryOutcome::Terminal).await?;
        }
        PushOutcome::Transient(err) => {
            let backoff = next_backoff(state, delivery.attempts as u32);
            let next_attempt_at = Utc::now().naive_utc() + chrono::Duration::seconds(backoff as i64);
            tracing::warn!(
                delivery_id = delivery.id,
                attempts = delivery.attempts,
                "transient push failure, rescheduling in {backoff}s: {err}"
            );
            bus.ack_reminder(
                &delivery.id,
                DeliveryOutcome::Transient {
                    next_attempt_at,
                    error: err,
                },
            )
            .await?;
        }
    }

    Ok(())
}

fn next_backoff(state: &AppState, attempts: u32) -> u64 {
    let base = state.config.worker.initial_backoff_seconds;
    let max = state.config.worker.max_backoff_seconds;
    base.saturating_mul(1u64 << attempts.min(16)).min(max)
}

pub fn spawn_worker_loop(
    state: Arc<AppState>,
    shutdown: tokio::sync::broadcast::Sender<()>,
) -> tokio::task::JoinHandle<()> {
    let mut shutdown_rx = shutdown.subscribe();

    tokio::spawn(async move {
        if !state.config.worker.enabled {
            tracing::info!("notification worker disabled, loop exiting");
            return;
        }

        let bus = SqliteEventBus::new(state.db.clone());

        loop {
            if shutdown_rx.try_recv().is_ok() {
                tracing::info!("notification worker received shutdown signal");
                break;
            }

            let limit = state.config.worker.concurrency as i64;
            match bus.claim_due_reminders(limit).await {
                Ok(claimed) => {
                    for delivery in claimed {
                        let state = state.clone();
                        tokio::spawn(async move {
                            process_claimed_delivery(&state, delivery).await;
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!("failed to claim due reminder deliveries: {e:?}");
                }
            }

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("notification worker shutting down");
                    break;
                }
                _ = tokio::time::sleep(Duration::from_secs(state.config.worker.poll_interval_seconds)) => {}
            }
        }
    })
}
