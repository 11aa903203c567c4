//! Single-use password reset tokens.

use super::{
    errors::{IdentityError, IdentityResult},
    models::{PasswordResetToken, UpdatePasswordRequest, User},
};
use crate::{
    credentials::{CredentialManager, random_alphanumeric},
    db::{IdentityStore, IdentityTransaction, store::finish},
    deadline::Deadline,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Length of generated reset token values
pub const RESET_TOKEN_LEN: usize = 16;

/// Password reset manager
#[derive(Clone)]
pub struct PasswordResetManager {
    store: Arc<dyn IdentityStore>,
    credentials: CredentialManager,
}

impl PasswordResetManager {
    pub fn new(store: Arc<dyn IdentityStore>, credentials: CredentialManager) -> Self {
        Self { store, credentials }
    }

    /// Issue a reset token for `email`, replacing any earlier one
    ///
    /// # Errors
    ///
    /// * `IdentityError::UserNotFound` - No user with that email
    pub async fn issue(
        &self,
        email: &str,
        expiration: DateTime<Utc>,
        deadline: Deadline,
    ) -> IdentityResult<PasswordResetToken> {
        deadline.check()?;
        let mut tx = self.store.begin().await?;
        let result = issue_in(tx.as_mut(), email, expiration, deadline).await;
        let token = finish(tx, result, deadline).await?;

        log::info!("Issued password reset token for user {}", token.user_id);
        Ok(token)
    }

    /// Consume a reset token and set a new password
    ///
    /// The stored token is deleted as soon as it matches, before the new
    /// password is checked against its confirmation, so a token can be used
    /// at most once whatever happens afterwards.
    ///
    /// # Errors
    ///
    /// * `IdentityError::ResetTokenNotFound` - Token unknown, expired,
    ///   superseded or issued to another user
    /// * `IdentityError::ResetTokenMismatch` - Stored value differs from the
    ///   supplied one
    /// * `IdentityError::PasswordMismatch` - Password and confirmation differ
    pub async fn consume(
        &self,
        request: UpdatePasswordRequest,
        deadline: Deadline,
    ) -> IdentityResult<()> {
        deadline.check()?;
        let mut tx = self.store.begin().await?;
        let now = Utc::now();
        let result = redeem(tx.as_mut(), &request.email, &request.reset_token, now, deadline).await;

        // An expired token is removed even though the request fails.
        let user = match result {
            Err(IdentityError::ResetTokenNotFound) => {
                tx.commit().await?;
                return Err(IdentityError::ResetTokenNotFound);
            }
            other => finish(tx, other, deadline).await?,
        };

        let password_hash = self
            .credentials
            .confirm_and_hash_blocking(request.password, &request.password_confirmation)
            .await?;

        deadline.check()?;
        let mut tx = self.store.begin().await?;
        let result = update_password(tx.as_mut(), user.id, &password_hash, deadline).await;
        finish(tx, result, deadline).await?;

        log::info!("Password reset completed for user {}", user.id);
        Ok(())
    }
}

async fn issue_in(
    tx: &mut dyn IdentityTransaction,
    email: &str,
    expiration: DateTime<Utc>,
    deadline: Deadline,
) -> IdentityResult<PasswordResetToken> {
    let user = tx
        .get_user_by_email(email)
        .await?
        .ok_or(IdentityError::UserNotFound)?;

    deadline.check()?;
    let superseded = tx.delete_all_reset_tokens_for_user(user.id).await?;
    if superseded > 0 {
        log::debug!("Superseded {} reset token(s) for user {}", superseded, user.id);
    }

    let token = PasswordResetToken {
        id: Uuid::new_v4(),
        user_id: user.id,
        token: random_alphanumeric(RESET_TOKEN_LEN),
        expiration,
        created_at: Utc::now(),
    };
    deadline.check()?;
    tx.create_password_reset_token(&token).await?;
    Ok(token)
}

/// Validate and delete the token `supplied` for `email`, returning the user
///
/// Tokens are looked up by value, so a superseded or foreign token is simply
/// not found.
async fn redeem(
    tx: &mut dyn IdentityTransaction,
    email: &str,
    supplied: &str,
    now: DateTime<Utc>,
    deadline: Deadline,
) -> IdentityResult<User> {
    let user = tx
        .get_user_by_email(email)
        .await?
        .ok_or(IdentityError::ResetTokenNotFound)?;

    deadline.check()?;
    let stored = tx
        .get_password_reset_token(supplied)
        .await?
        .filter(|t| t.user_id == user.id)
        .ok_or(IdentityError::ResetTokenNotFound)?;

    if stored.is_expired(now) {
        deadline.check()?;
        tx.delete_password_reset_token(stored.id).await?;
        return Err(IdentityError::ResetTokenNotFound);
    }

    if !bool::from(stored.token.as_bytes().ct_eq(supplied.as_bytes())) {
        return Err(IdentityError::ResetTokenMismatch);
    }

    deadline.check()?;
    tx.delete_password_reset_token(stored.id).await?;
    Ok(user)
}

async fn update_password(
    tx: &mut dyn IdentityTransaction,
    user_id: Uuid,
    password_hash: &str,
    deadline: Deadline,
) -> IdentityResult<()> {
    deadline.check()?;
    if tx
        .update_user_password(user_id, password_hash, Utc::now())
        .await?
    {
        Ok(())
    } else {
        Err(IdentityError::UserNotFound)
    }
}
