//! HTTP API for the identity service.
//!
//! One route per identity operation, JSON in and out, timestamps in RFC 3339.
//!
//! # Modules
//!
//! - [`users`]: signup, guest signup, lookup and account deletion
//! - [`sessions`]: login, token lookup and revocation
//! - [`passwords`]: reset token issuance and redemption
//! - [`error`]: identity error to HTTP status mapping
//! - [`request_context`]: request ids and per-request deadlines
//!
//! # Endpoints Overview
//!
//! ```text
//! GET    /health                          - Store health check
//! POST   /api/users                       - Create user and first session
//! GET    /api/users?email=<email>         - Get user by email
//! GET    /api/users/{user_id}             - Get user by id
//! POST   /api/users/guest                 - Create guest user and session
//! POST   /api/users/delete                - Delete user (password required)
//! POST   /api/sessions                    - Login
//! POST   /api/sessions/lookup             - Open a session token
//! POST   /api/sessions/revoke             - Revoke session by token
//! DELETE /api/sessions/{session_id}       - Revoke session by id
//! POST   /api/password_resets             - Issue reset token
//! POST   /api/password_resets/consume     - Redeem reset token
//! ```
//!
//! # CORS
//!
//! CORS is configured permissively. Put the service behind a gateway that
//! restricts origins in production.

pub mod error;
pub mod passwords;
pub mod request_context;
pub mod sessions;
pub mod users;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use fingerprint::{IdentityManager, ScopeGrant};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tower_http::cors::CorsLayer;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; the manager sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<IdentityManager>,
    /// Budget applied to each request's deadline
    pub request_deadline: Duration,
}

/// Scope grouping as sent and returned over the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeGroupingPayload {
    pub scopes: Vec<String>,
    pub expiration: DateTime<Utc>,
}

impl From<ScopeGroupingPayload> for ScopeGrant {
    fn from(payload: ScopeGroupingPayload) -> Self {
        ScopeGrant::new(payload.scopes, payload.expiration)
    }
}

impl From<ScopeGrant> for ScopeGroupingPayload {
    fn from(grant: ScopeGrant) -> Self {
        Self {
            scopes: grant.scopes,
            expiration: grant.expiration,
        }
    }
}

pub(crate) fn into_grants(payloads: Vec<ScopeGroupingPayload>) -> Vec<ScopeGrant> {
    payloads.into_iter().map(ScopeGrant::from).collect()
}

/// `{"deleted": bool}` body for revocation and account deletion
#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}

/// Create the API router with all endpoints and middleware.
///
/// # Example
///
/// ```rust,no_run
/// # use fp_server::api::{create_router, AppState};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let state: AppState = unimplemented!();
/// let app = create_router(state);
/// let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/users", post(users::create_user).get(users::find_user))
        .route("/users/guest", post(users::create_guest_user))
        .route("/users/delete", post(users::delete_user))
        .route("/users/{user_id}", get(users::get_user))
        .route("/sessions", post(sessions::create_session))
        .route("/sessions/lookup", post(sessions::lookup_session))
        .route("/sessions/revoke", post(sessions::revoke_session))
        .route("/sessions/{session_id}", delete(sessions::delete_session))
        .route("/password_resets", post(passwords::create_reset_token))
        .route("/password_resets/consume", post(passwords::consume_reset_token));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            request_context::request_context_middleware,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the store answers, `503 Service Unavailable`
/// otherwise.
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"healthy","store":true,"version":"0.1.0","timestamp":"2026-01-01T10:30:00Z"}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_healthy = match state.identity.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            false
        }
    };

    let status_code = if store_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if store_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "store": store_healthy,
        "timestamp": Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
