//! Auth extractors for the three tiers named in SPEC_FULL.md §4.6.
//! Shape grounded on the teacher's `AuthUser` (`FromRequestParts`,
//! `AppError::Unauthorized` on a missing/malformed credential) but without
//! the JWT verification call — that collaborator is explicitly out of
//! scope (SPEC_FULL.md §1), so `UserAuth` trusts a header an upstream
//! gateway is assumed to have already verified.

use std::sync::Arc;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::AppState;

/// The authenticated user's opaque id, trusted from `X-User-Id`.
pub struct UserAuth(pub String);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for UserAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                tracing::debug!("Missing or empty X-User-Id header");
                AppError::Unauthorized
            })?;

        Ok(UserAuth(user_id.to_string()))
    }
}

/// The notification worker's credential, used to call `/tasks/{id}/reminder-sent`.
pub struct ServiceAuth;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for ServiceAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        verify_bearer(parts, &state.config.service_auth.service_token)?;
        Ok(ServiceAuth)
    }
}

/// The trusted/internal credential, used by an external cron binding to call `/reminders/binding`.
pub struct InternalAuth;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for InternalAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        verify_bearer(parts, &state.config.service_auth.internal_token)?;
        Ok(InternalAuth)
    }
}

fn verify_bearer(parts: &Parts, expected: &str) -> Result<(), AppError> {
    let auth_header = parts
        .headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!("Missing or invalid Authorization header");
            AppError::Unauthorized
        })?;

    if !auth_header.to_ascii_lowercase().starts_with("bearer ") {
        return Err(AppError::Unauthorized);
    }

    let token = auth_header[7..].trim();
    if token.is_empty() || token != expected {
        return Err(AppError::Unauthorized);
    }

    Ok(())
}
