//! Web Push dispatch. Grounded on the `web_push` crate call sequence used
//! elsewhere in the corpus for VAPID-signed delivery.

use serde::Serialize;
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, VapidSignatureBuilder,
    WebPushClient, WebPushMessageBuilder, URL_SAFE_NO_PAD,
};

use crate::config::VapidConfig;
use crate::db::models::ReminderEvent;

#[derive(Debug, Serialize)]
struct PushPayload {
    title: &'static str,
    body: String,
    icon: &'static str,
    badge: &'static str,
    tag: String,
    #[serde(rename = "requireInteraction")]
    require_interaction: bool,
    data: PushPayloadData,
}

#[derive(Debug, Serialize)]
struct PushPayloadData {
    url: String,
}

/// The outcome classification the notification worker's state machine (§4.4) acts on.
pub enum PushOutcome {
    Delivered,
    /// The gateway reports the subscription will never succeed again (400/410/Gone/NotFound).
    Terminal(String),
    /// Network error, 5xx, 429, or timeout — the caller should reschedule.
    Transient(String),
}

fn build_payload(event: &ReminderEvent) -> PushPayload {
    let mut body = format!("Reminder: {}", event.title);
    if let Some(due_at) = event.due_at {
        body.push_str(&format!("\nDue: {}", due_at));
    }

    PushPayload {
        title: "Task Reminder",
        body,
        icon: "/icon-192x192.png",
        badge: "/badge-72x72.png",
        tag: format!("reminder-{}", event.task_id),
        require_interaction: true,
        data: PushPayloadData {
            url: format!("/tasks?highlight={}", event.task_id),
        },
    }
}

/// Sign and send a single reminder push. Bounded by `timeout` (§5 mandates <= 30s).
pub async fn send_reminder_push(
    vapid: &VapidConfig,
    event: &ReminderEvent,
    timeout: std::time::Duration,
) -> PushOutcome {
    let payload = build_payload(event);
    let body = match serde_json::to_vec(&payload) {
        Ok(b) => b,
        Err(e) => return PushOutcome::Transient(format!("failed to serialize payload: {e}")),
    };

    let subscription = &event.push_subscription;
    let info = SubscriptionInfo::new(
        &subscription.endpoint,
        &subscription.p256dh_key,
        &subscription.auth_key,
    );

    let mut builder = WebPushMessageBuilder::new(&info);
    builder.set_payload(ContentEncoding::Aes128Gcm, &body);

    let mut sig_builder = match VapidSignatureBuilder::from_base64(
        &vapid.private_key,
        URL_SAFE_NO_PAD,
        &info,
    ) {
        Ok(b) => b,
        Err(e) => return PushOutcome::Transient(format!("failed to build VAPID signature: {e}")),
    };
    sig_builder.add_claim("sub", vapid.subject.as_str());
    let signature = match sig_builder.build() {
        Ok(s) => s,
        Err(e) => return PushOutcome::Transient(format!("failed to sign VAPID claim: {e}")),
    };
    builder.set_vapid_signature(signature);

    let message = match builder.build() {
        Ok(m) => m,
        Err(e) => return PushOutcome::Transient(format!("failed to build push message: {e}")),
    };

    let client = match IsahcWebPushClient::new() {
        Ok(c) => c,
        Err(e) => return PushOutcome::Transient(format!("failed to build push client: {e}")),
    };

    match tokio::time::timeout(timeout, client.send(message)).await {
        Ok(Ok(())) => PushOutcome::Delivered,
        Ok(Err(err)) => classify_push_error(&err.to_string()),
        Err(_) => PushOutcome::Transient("push gateway timed out".to_string()),
    }
}

fn classify_push_error(err: &str) -> PushOutcome {
    if err.contains("400")
        || err.contains("404")
        || err.contains("410")
        || err.contains("NotFound")
        || err.contains("Gone")
    {
        PushOutcome::Terminal(err.to_string())
    } else {
        PushOutcome::Transient(err.to_string())
    }
}
