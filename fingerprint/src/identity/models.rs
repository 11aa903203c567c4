//! Identity data models.

use crate::token::{Representation, ScopeGrant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// User model
#[derive(Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub is_guest: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field("is_guest", &self.is_guest)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Session model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

/// Persisted scope grouping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeGrouping {
    pub id: Uuid,
    pub session_id: Uuid,
    pub scopes: Vec<String>,
    pub expiration: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ScopeGrouping {
    /// The grant this row was persisted from
    pub fn grant(&self) -> ScopeGrant {
        ScopeGrant {
            scopes: self.scopes.clone(),
            expiration: self.expiration,
        }
    }
}

/// Single-use password reset token
#[derive(Clone, Serialize, Deserialize)]
pub struct PasswordResetToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub expiration: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PasswordResetToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration <= now
    }
}

impl fmt::Debug for PasswordResetToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordResetToken")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// User signup request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
    pub scope_groupings: Vec<ScopeGrant>,
}

/// Guest signup request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGuestUserRequest {
    pub email_seed: String,
    pub scope_groupings: Vec<ScopeGrant>,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub email: String,
    pub password: String,
    pub scope_groupings: Vec<ScopeGrant>,
}

/// Password change authorized by a reset token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePasswordRequest {
    pub email: String,
    pub reset_token: String,
    pub password: String,
    pub password_confirmation: String,
}

/// A freshly created session together with what was sealed into it
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session: Session,
    pub scope_groupings: Vec<ScopeGrouping>,
    pub representation: Representation,
    /// Plaintext rendering of `representation`
    pub json: String,
}

/// A stored session and its opened token
#[derive(Debug, Clone)]
pub struct SessionView {
    pub session: Session,
    pub representation: Representation,
    pub json: String,
}

/// User lookup key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLookup {
    ByEmail(String),
    ByUuid(Uuid),
}

/// Session lookup key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLookup {
    ByUuid(Uuid),
    ByToken(String),
}

/// Rows removed by a purge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub reset_tokens: u64,
    pub scope_groupings: u64,
    pub sessions: u64,
}

impl PurgeReport {
    pub fn total(&self) -> u64 {
        self.reset_tokens + self.scope_groupings + self.sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_serialization_hides_hash() {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: "a@b.com".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            is_guest: false,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(!format!("{user:?}").contains("argon2id"));
    }

    #[test]
    fn test_reset_token_debug_redacted() {
        let token = PasswordResetToken {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token: "abcdefgh12345678".to_string(),
            expiration: Utc::now(),
            created_at: Utc::now(),
        };
        assert!(!format!("{token:?}").contains("abcdefgh"));
    }
}
