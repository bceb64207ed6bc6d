use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::models::PushSubscription;
use crate::db::repository::PushSubscriptionRepository;
use crate::error::AppResult;
use crate::routes::auth::UserAuth;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(register_subscription))
        .route("/", delete(delete_subscription))
        .route("/all", delete(delete_all_subscriptions))
}

#[derive(Debug, Deserialize)]
pub struct RegisterSubscriptionRequest {
    pub endpoint: String,
    pub p256dh_key: String,
    pub auth_key: String,
    pub user_agent: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteSubscriptionRequest {
    pub endpoint: String,
}

#[derive(Debug, Serialize)]
pub struct PushSubscriptionResponse {
    pub id: String,
    pub endpoint: String,
}

impl From<PushSubscription> for PushSubscriptionResponse {
    fn from(s: PushSubscription) -> Self {
        PushSubscriptionResponse {
            id: s.id,
            endpoint: s.endpoint,
        }
    }
}

async fn register_subscription(
    State(state): State<Arc<AppState>>,
    UserAuth(user_id): UserAuth,
    Json(req): Json<RegisterSubscriptionRequest>,
) -> AppResult<(StatusCode, Json<PushSubscriptionResponse>)> {
    let subscription = PushSubscriptionRepository::upsert(
        &state.db,
        &user_id,
        &req.endpoint,
        &req.p256dh_key,
        &req.auth_key,
        req.user_agent.as_deref(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(subscription.into())))
}

async fn delete_subscription(
    State(state): State<Arc<AppState>>,
    UserAuth(user_id): UserAuth,
    Json(req): Json<DeleteSubscriptionRequest>,
) -> AppResult<StatusCode> {
    PushSubscriptionRepository::delete_by_endpoint(&state.db, &user_id, &req.endpoint).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_all_subscriptions(
    State(state): State<Arc<AppState>>,
    UserAuth(user_id): UserAuth,
) -> AppResult<StatusCode> {
    PushSubscriptionRepository::delete_all(&state.db, &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
