//! Password reset API handlers.
//!
//! Issuing a token returns its value to the caller, which is expected to be
//! a trusted backend that delivers it to the user out of band.

use axum::{Json, extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use fingerprint::{IdentityError, UpdatePasswordRequest};
use serde::{Deserialize, Serialize};

use super::{AppState, error::ApiError, request_context::RequestContext};
use crate::logging::log_security_event;

#[derive(Debug, Deserialize)]
pub struct CreateResetTokenPayload {
    pub email: String,
    pub expiration: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetTokenResponse {
    pub reset_token: String,
    pub expiration: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ConsumeResetTokenPayload {
    pub email: String,
    pub reset_token: String,
    pub password: String,
    pub password_confirmation: String,
}

/// Issue a reset token, replacing any the user already had.
///
/// # Errors
///
/// - `404 Not Found`: No user with that email
pub async fn create_reset_token(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<CreateResetTokenPayload>,
) -> Result<(StatusCode, Json<ResetTokenResponse>), ApiError> {
    let token = state
        .identity
        .create_password_reset_token(&payload.email, payload.expiration, ctx.deadline)
        .await?;

    log_security_event(
        "password_reset_requested",
        Some(&payload.email),
        "Reset token issued",
    );

    Ok((
        StatusCode::CREATED,
        Json(ResetTokenResponse {
            reset_token: token.token,
            expiration: token.expiration,
        }),
    ))
}

/// Redeem a reset token and set a new password.
///
/// The token is spent once it matches, even when the new password and its
/// confirmation differ.
///
/// # Errors
///
/// - `400 Bad Request`: Password and confirmation differ
/// - `404 Not Found`: Token unknown, expired, superseded or not issued for
///   that email
pub async fn consume_reset_token(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<ConsumeResetTokenPayload>,
) -> Result<StatusCode, ApiError> {
    let email = payload.email.clone();
    let request = UpdatePasswordRequest {
        email: payload.email,
        reset_token: payload.reset_token,
        password: payload.password,
        password_confirmation: payload.password_confirmation,
    };

    match state.identity.update_user_password(request, ctx.deadline).await {
        Ok(()) => {
            log_security_event("password_reset", Some(&email), "Password changed");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(e) => {
            if matches!(
                e,
                IdentityError::ResetTokenNotFound | IdentityError::ResetTokenMismatch
            ) {
                log_security_event(
                    "reset_token_rejected",
                    Some(&email),
                    "Reset token rejected",
                );
            }
            Err(e.into())
        }
    }
}
