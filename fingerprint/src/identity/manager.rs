//! Identity manager: the single entry point for transports.

use super::{
    errors::{IdentityError, IdentityResult},
    issuer::SessionIssuer,
    models::{
        CreateGuestUserRequest, CreateSessionRequest, CreateUserRequest, IssuedSession,
        PasswordResetToken, PurgeReport, SessionLookup, SessionView, UpdatePasswordRequest, User,
        UserLookup,
    },
    reset::PasswordResetManager,
};
use crate::{
    credentials::CredentialManager,
    db::{IdentityStore, IdentityTransaction, store::finish},
    deadline::Deadline,
    token::TokenSealer,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Identity manager
#[derive(Clone)]
pub struct IdentityManager {
    store: Arc<dyn IdentityStore>,
    sealer: Arc<TokenSealer>,
    credentials: CredentialManager,
    issuer: SessionIssuer,
    resets: PasswordResetManager,
}

impl IdentityManager {
    /// Create a new identity manager
    ///
    /// # Arguments
    ///
    /// * `store` - Transactional identity store
    /// * `sealer` - Token sealing service
    /// * `credentials` - Password hashing and verification
    pub fn new(
        store: Arc<dyn IdentityStore>,
        sealer: Arc<TokenSealer>,
        credentials: CredentialManager,
    ) -> Self {
        let issuer = SessionIssuer::new(store.clone(), sealer.clone(), credentials.clone());
        let resets = PasswordResetManager::new(store.clone(), credentials.clone());
        Self {
            store,
            sealer,
            credentials,
            issuer,
            resets,
        }
    }

    pub fn sealer(&self) -> &TokenSealer {
        &self.sealer
    }

    /// See [`SessionIssuer::create_user`]
    pub async fn create_user(
        &self,
        request: CreateUserRequest,
        deadline: Deadline,
    ) -> IdentityResult<(User, IssuedSession)> {
        self.issuer.create_user(request, deadline).await
    }

    /// See [`SessionIssuer::create_guest_user`]
    pub async fn create_guest_user(
        &self,
        request: CreateGuestUserRequest,
        deadline: Deadline,
    ) -> IdentityResult<(User, IssuedSession)> {
        self.issuer.create_guest_user(request, deadline).await
    }

    /// See [`SessionIssuer::create_session`]
    ///
    /// Failed logins are left to the transport to report.
    pub async fn create_session(
        &self,
        request: CreateSessionRequest,
        deadline: Deadline,
    ) -> IdentityResult<IssuedSession> {
        self.issuer.create_session(request, deadline).await
    }

    /// Look up a user by email or id
    ///
    /// # Errors
    ///
    /// * `IdentityError::UserNotFound` - No such user
    pub async fn get_user(&self, lookup: UserLookup, deadline: Deadline) -> IdentityResult<User> {
        deadline.check()?;
        let mut tx = self.store.begin().await?;
        let result = find_user(tx.as_mut(), &lookup).await;
        finish(tx, result, deadline)
            .await?
            .ok_or(IdentityError::UserNotFound)
    }

    /// Look up a session by its token and open the token
    ///
    /// # Errors
    ///
    /// * `IdentityError::SessionNotFound` - No session holds that token
    /// * `IdentityError::Crypto` - The stored token does not open
    pub async fn get_session(&self, token: &str, deadline: Deadline) -> IdentityResult<SessionView> {
        deadline.check()?;
        let mut tx = self.store.begin().await?;
        let result = tx.get_session_by_token(token).await;
        let session = finish(tx, result, deadline)
            .await?
            .ok_or(IdentityError::SessionNotFound)?;

        let representation = self.sealer.open(&session.token).inspect_err(|e| {
            log::warn!("Stored token for session {} did not open: {}", session.id, e);
        })?;
        let json = representation.to_json()?;

        Ok(SessionView {
            session,
            representation,
            json,
        })
    }

    /// Revoke a session; `false` when nothing matched
    pub async fn delete_session(
        &self,
        lookup: SessionLookup,
        deadline: Deadline,
    ) -> IdentityResult<bool> {
        deadline.check()?;
        let mut tx = self.store.begin().await?;
        let result = match &lookup {
            SessionLookup::ByUuid(id) => tx.delete_session_by_uuid(*id).await,
            SessionLookup::ByToken(token) => tx.delete_session_by_token(token).await,
        };
        let deleted = finish(tx, result, deadline).await?;

        if deleted {
            log::info!("Revoked session {:?}", redact(&lookup));
        }
        Ok(deleted)
    }

    /// See [`PasswordResetManager::issue`]
    pub async fn create_password_reset_token(
        &self,
        email: &str,
        expiration: DateTime<Utc>,
        deadline: Deadline,
    ) -> IdentityResult<PasswordResetToken> {
        self.resets.issue(email, expiration, deadline).await
    }

    /// See [`PasswordResetManager::consume`]
    pub async fn update_user_password(
        &self,
        request: UpdatePasswordRequest,
        deadline: Deadline,
    ) -> IdentityResult<()> {
        self.resets.consume(request, deadline).await
    }

    /// Delete a user after re-verifying its password
    ///
    /// # Errors
    ///
    /// * `IdentityError::UserNotFound` - No user with that email
    /// * `IdentityError::InvalidCredentials` - Wrong password
    pub async fn delete_user(
        &self,
        email: &str,
        password: String,
        deadline: Deadline,
    ) -> IdentityResult<bool> {
        deadline.check()?;
        let mut tx = self.store.begin().await?;
        let result = self
            .verify_and_delete(tx.as_mut(), email, password, deadline)
            .await;
        let deleted = finish(tx, result, deadline).await?;

        if deleted {
            log::info!("Deleted user {}", email);
        }
        Ok(deleted)
    }

    async fn verify_and_delete(
        &self,
        tx: &mut dyn IdentityTransaction,
        email: &str,
        password: String,
        deadline: Deadline,
    ) -> IdentityResult<bool> {
        let user = tx
            .get_user_by_email(email)
            .await?
            .ok_or(IdentityError::UserNotFound)?;

        self.credentials
            .verify_blocking(password, user.password_hash.clone())
            .await?;

        deadline.check()?;
        tx.delete_user(user.id).await
    }

    /// Remove expired reset tokens, expired scope groupings and sessions
    /// left without any grouping
    pub async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        deadline: Deadline,
    ) -> IdentityResult<PurgeReport> {
        deadline.check()?;
        let mut tx = self.store.begin().await?;
        let result = tx.purge_expired(now).await;
        let report = finish(tx, result, deadline).await?;

        log::info!(
            "Purged {} reset token(s), {} scope grouping(s), {} session(s)",
            report.reset_tokens,
            report.scope_groupings,
            report.sessions
        );
        Ok(report)
    }

    /// Check the store is reachable
    pub async fn health_check(&self) -> IdentityResult<()> {
        self.store.health_check().await
    }
}

async fn find_user(
    tx: &mut dyn IdentityTransaction,
    lookup: &UserLookup,
) -> IdentityResult<Option<User>> {
    match lookup {
        UserLookup::ByEmail(email) => tx.get_user_by_email(email).await,
        UserLookup::ByUuid(id) => tx.get_user_by_uuid(*id).await,
    }
}

/// Session lookup safe to log
fn redact(lookup: &SessionLookup) -> String {
    match lookup {
        SessionLookup::ByUuid(id) => id.to_string(),
        SessionLookup::ByToken(_) => "by token".to_string(),
    }
}
