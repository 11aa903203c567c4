//! User API handlers.
//!
//! Signup returns the new user together with its first session, so a client
//! can start making authorized calls right away.
//!
//! ```bash
//! curl -X POST http://localhost:8080/api/users \
//!   -H "Content-Type: application/json" \
//!   -d '{"email": "a@b.com", "password": "pw1", "password_confirmation": "pw1",
//!        "scope_groupings": [{"scopes": ["read"], "expiration": "2030-01-01T00:00:00Z"}]}'
//! ```

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use fingerprint::{CreateGuestUserRequest, CreateUserRequest, User, UserLookup};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    AppState, DeletedResponse, ScopeGroupingPayload, error::ApiError, into_grants,
    request_context::RequestContext, sessions::SessionResponse,
};
use crate::logging::log_security_event;

#[derive(Debug, Deserialize)]
pub struct CreateUserPayload {
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
    pub scope_groupings: Vec<ScopeGroupingPayload>,
}

#[derive(Debug, Deserialize)]
pub struct CreateGuestUserPayload {
    pub email_seed: String,
    pub scope_groupings: Vec<ScopeGroupingPayload>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteUserPayload {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub email: String,
}

/// Public view of a user; the password hash never leaves the service
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub uuid: Uuid,
    pub email: String,
    pub is_guest: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            uuid: user.id,
            email: user.email,
            is_guest: user.is_guest,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignupResponse {
    pub user: UserResponse,
    pub session: SessionResponse,
}

/// Create a user and its first session.
///
/// # Errors
///
/// - `400 Bad Request`: Password and confirmation differ, or no scope groupings
/// - `409 Conflict`: Email already registered
pub async fn create_user(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<CreateUserPayload>,
) -> Result<(StatusCode, Json<SignupResponse>), ApiError> {
    let request = CreateUserRequest {
        email: payload.email,
        password: payload.password,
        password_confirmation: payload.password_confirmation,
        scope_groupings: into_grants(payload.scope_groupings),
    };

    let (user, issued) = state.identity.create_user(request, ctx.deadline).await?;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            user: user.into(),
            session: issued.into(),
        }),
    ))
}

/// Create a guest user with a generated email and password, plus a session.
pub async fn create_guest_user(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<CreateGuestUserPayload>,
) -> Result<(StatusCode, Json<SignupResponse>), ApiError> {
    let request = CreateGuestUserRequest {
        email_seed: payload.email_seed,
        scope_groupings: into_grants(payload.scope_groupings),
    };

    let (user, issued) = state
        .identity
        .create_guest_user(request, ctx.deadline)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            user: user.into(),
            session: issued.into(),
        }),
    ))
}

/// Look up a user by `?email=`.
pub async fn find_user(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<UserQuery>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .identity
        .get_user(UserLookup::ByEmail(query.email), ctx.deadline)
        .await?;
    Ok(Json(user.into()))
}

/// Look up a user by id.
pub async fn get_user(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .identity
        .get_user(UserLookup::ByUuid(user_id), ctx.deadline)
        .await?;
    Ok(Json(user.into()))
}

/// Delete a user after checking its password.
///
/// Sessions, scope groupings and reset tokens go with it.
///
/// # Errors
///
/// - `401 Unauthorized`: Wrong password
/// - `404 Not Found`: No user with that email
pub async fn delete_user(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<DeleteUserPayload>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let result = state
        .identity
        .delete_user(&payload.email, payload.password, ctx.deadline)
        .await;

    match result {
        Ok(deleted) => {
            if deleted {
                log_security_event("user_deleted", Some(&payload.email), "Account deleted");
            }
            Ok(Json(DeletedResponse { deleted }))
        }
        Err(e) => {
            if matches!(e, fingerprint::IdentityError::InvalidCredentials) {
                log_security_event(
                    "failed_delete",
                    Some(&payload.email),
                    "Invalid password on account deletion",
                );
            }
            Err(e.into())
        }
    }
}
