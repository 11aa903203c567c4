//! Session API handlers.
//!
//! A session response carries both the opaque token and a plaintext JSON
//! rendering of what was sealed into it.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use fingerprint::{
    CreateSessionRequest, IdentityError, IssuedSession, SessionLookup, SessionView,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    AppState, DeletedResponse, ScopeGroupingPayload, error::ApiError, into_grants,
    request_context::RequestContext,
};
use crate::logging::log_security_event;

#[derive(Debug, Deserialize)]
pub struct CreateSessionPayload {
    pub email: String,
    pub password: String,
    pub scope_groupings: Vec<ScopeGroupingPayload>,
}

#[derive(Debug, Deserialize)]
pub struct TokenPayload {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub uuid: Uuid,
    pub user_uuid: Uuid,
    pub token: String,
    /// Plaintext rendering of the sealed representation
    pub json: String,
    pub scope_groupings: Vec<ScopeGroupingPayload>,
    pub created_at: DateTime<Utc>,
}

impl From<IssuedSession> for SessionResponse {
    fn from(issued: IssuedSession) -> Self {
        Self {
            uuid: issued.session.id,
            user_uuid: issued.session.user_id,
            token: issued.session.token,
            json: issued.json,
            scope_groupings: issued
                .representation
                .scope_groupings
                .into_iter()
                .map(ScopeGroupingPayload::from)
                .collect(),
            created_at: issued.session.created_at,
        }
    }
}

impl From<SessionView> for SessionResponse {
    fn from(view: SessionView) -> Self {
        Self {
            uuid: view.session.id,
            user_uuid: view.session.user_id,
            token: view.session.token,
            json: view.json,
            scope_groupings: view
                .representation
                .scope_groupings
                .into_iter()
                .map(ScopeGroupingPayload::from)
                .collect(),
            created_at: view.session.created_at,
        }
    }
}

/// Log in and open a new session.
///
/// # Errors
///
/// - `400 Bad Request`: No scope groupings
/// - `401 Unauthorized`: Wrong password
/// - `404 Not Found`: No user with that email
pub async fn create_session(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<CreateSessionPayload>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let email = payload.email.clone();
    let request = CreateSessionRequest {
        email: payload.email,
        password: payload.password,
        scope_groupings: into_grants(payload.scope_groupings),
    };

    match state.identity.create_session(request, ctx.deadline).await {
        Ok(issued) => Ok((StatusCode::CREATED, Json(issued.into()))),
        Err(e) => {
            if matches!(e, IdentityError::InvalidCredentials) {
                log_security_event("failed_login", Some(&email), "Invalid login attempt");
            }
            Err(e.into())
        }
    }
}

/// Find the session holding a token and open it.
///
/// # Errors
///
/// - `401 Unauthorized`: The stored token does not open
/// - `404 Not Found`: No session holds that token
pub async fn lookup_session(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<TokenPayload>,
) -> Result<Json<SessionResponse>, ApiError> {
    match state.identity.get_session(&payload.token, ctx.deadline).await {
        Ok(view) => Ok(Json(view.into())),
        Err(e) => {
            if e.kind() == fingerprint::ErrorKind::Crypto {
                log_security_event("token_rejected", None, "Session token failed to open");
            }
            Err(ApiError::from_session_lookup(e))
        }
    }
}

/// Revoke the session holding a token.
pub async fn revoke_session(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<TokenPayload>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let deleted = state
        .identity
        .delete_session(SessionLookup::ByToken(payload.token), ctx.deadline)
        .await?;
    Ok(Json(DeletedResponse { deleted }))
}

/// Revoke a session by id.
pub async fn delete_session(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(session_id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let deleted = state
        .identity
        .delete_session(SessionLookup::ByUuid(session_id), ctx.deadline)
        .await?;
    Ok(Json(DeletedResponse { deleted }))
}
