//! Transactional store contract.
//!
//! Every read and write happens on an [`IdentityTransaction`] obtained from
//! [`IdentityStore::begin`]. A transaction that is dropped without
//! [`commit`](IdentityTransaction::commit) is rolled back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::deadline::Deadline;
use crate::identity::{
    IdentityResult, PasswordResetToken, PurgeReport, ScopeGrouping, Session, User,
};

/// Source of transactions
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Begin a new transaction
    async fn begin(&self) -> IdentityResult<Box<dyn IdentityTransaction>>;

    /// Check the store is reachable
    async fn health_check(&self) -> IdentityResult<()>;
}

/// Unit of work against the store.
///
/// Point lookups return `None` when no row matches; deletes report whether a
/// row was removed.
#[async_trait]
pub trait IdentityTransaction: Send {
    /// Insert a user; a taken email fails with `EmailTaken`
    async fn create_user(&mut self, user: &User) -> IdentityResult<()>;

    async fn get_user_by_email(&mut self, email: &str) -> IdentityResult<Option<User>>;

    async fn get_user_by_uuid(&mut self, id: Uuid) -> IdentityResult<Option<User>>;

    async fn update_user_password(
        &mut self,
        id: Uuid,
        password_hash: &str,
        updated_at: DateTime<Utc>,
    ) -> IdentityResult<bool>;

    /// Delete a user and everything it owns
    async fn delete_user(&mut self, id: Uuid) -> IdentityResult<bool>;

    async fn create_session(&mut self, session: &Session) -> IdentityResult<()>;

    async fn get_session_by_uuid(&mut self, id: Uuid) -> IdentityResult<Option<Session>>;

    async fn get_session_by_token(&mut self, token: &str) -> IdentityResult<Option<Session>>;

    /// Delete a session and its scope groupings
    async fn delete_session_by_uuid(&mut self, id: Uuid) -> IdentityResult<bool>;

    /// Delete a session and its scope groupings
    async fn delete_session_by_token(&mut self, token: &str) -> IdentityResult<bool>;

    async fn create_scope_grouping(&mut self, grouping: &ScopeGrouping) -> IdentityResult<()>;

    async fn get_scope_grouping_by_uuid(&mut self, id: Uuid)
    -> IdentityResult<Option<ScopeGrouping>>;

    /// Groupings of a session in creation order
    async fn list_scope_groupings_for_session(
        &mut self,
        session_id: Uuid,
    ) -> IdentityResult<Vec<ScopeGrouping>>;

    async fn create_password_reset_token(
        &mut self,
        token: &PasswordResetToken,
    ) -> IdentityResult<()>;

    /// Reset token row holding `token`, if any
    async fn get_password_reset_token(
        &mut self,
        token: &str,
    ) -> IdentityResult<Option<PasswordResetToken>>;

    /// Returns the number of tokens removed
    async fn delete_all_reset_tokens_for_user(&mut self, user_id: Uuid) -> IdentityResult<u64>;

    async fn delete_password_reset_token(&mut self, id: Uuid) -> IdentityResult<bool>;

    /// Remove expired reset tokens, expired scope groupings and sessions left
    /// without any grouping
    async fn purge_expired(&mut self, now: DateTime<Utc>) -> IdentityResult<PurgeReport>;

    async fn commit(self: Box<Self>) -> IdentityResult<()>;

    async fn rollback(self: Box<Self>) -> IdentityResult<()>;
}

/// Commit `tx` if `result` is `Ok` and the deadline has not passed,
/// otherwise roll it back and return the original error.
pub async fn finish<T>(
    tx: Box<dyn IdentityTransaction>,
    result: IdentityResult<T>,
    deadline: Deadline,
) -> IdentityResult<T> {
    match result.and_then(|value| deadline.check().map(|()| value)) {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            rollback_quietly(tx, &e).await;
            Err(e)
        }
    }
}

/// Roll back after `cause`; a failing rollback is logged, never returned
async fn rollback_quietly(
    tx: Box<dyn IdentityTransaction>,
    cause: &(dyn std::fmt::Display + Sync),
) {
    log::warn!("Rolling back transaction: {}", cause);
    if let Err(e) = tx.rollback().await {
        log::warn!("Rollback failed: {}", e);
    }
}
