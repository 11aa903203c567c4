//! Identity error types.

use thiserror::Error;

/// Coarse classification of an [`IdentityError`], stable across transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    InvalidCredentials,
    Crypto,
    Store,
    DeadlineExceeded,
}

impl ErrorKind {
    /// Snake-case name used in wire error bodies.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InvalidCredentials => "invalid_credentials",
            ErrorKind::Crypto => "crypto",
            ErrorKind::Store => "store",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

/// Identity errors
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Password and confirmation differ
    #[error("Password and confirmation don't match")]
    PasswordMismatch,

    /// A session must carry at least one scope grouping
    #[error("Must have at least one scope grouping")]
    EmptyScopes,

    /// Reset token supplied by the caller does not match the stored one
    #[error("Reset token does not match")]
    ResetTokenMismatch,

    /// User not found
    #[error("User not found")]
    UserNotFound,

    /// Session not found
    #[error("Session not found")]
    SessionNotFound,

    /// Reset token missing, expired or superseded
    #[error("Invalid or expired reset token")]
    ResetTokenNotFound,

    /// Email already exists
    #[error("Email already exists")]
    EmailTaken,

    /// Password verification failed
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Password hashing failed
    #[error("Password hashing failed")]
    HashingFailed,

    /// Token could not be sealed or opened
    #[error("Token error: {0}")]
    Crypto(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Non-driver store failure (transaction state, injected faults)
    #[error("Store error: {0}")]
    Store(String),

    /// The caller's deadline passed between store calls
    #[error("Request deadline exceeded")]
    DeadlineExceeded,
}

impl IdentityError {
    /// Error classification
    pub fn kind(&self) -> ErrorKind {
        match self {
            IdentityError::PasswordMismatch
            | IdentityError::EmptyScopes
            | IdentityError::ResetTokenMismatch => ErrorKind::Validation,
            IdentityError::UserNotFound
            | IdentityError::SessionNotFound
            | IdentityError::ResetTokenNotFound => ErrorKind::NotFound,
            IdentityError::EmailTaken => ErrorKind::Conflict,
            IdentityError::InvalidCredentials => ErrorKind::InvalidCredentials,
            IdentityError::HashingFailed | IdentityError::Crypto(_) => ErrorKind::Crypto,
            IdentityError::Database(_) | IdentityError::Store(_) => ErrorKind::Store,
            IdentityError::DeadlineExceeded => ErrorKind::DeadlineExceeded,
        }
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Store and crypto errors are sanitized so that SQL details and token
    /// internals never reach a client.
    pub fn client_message(&self) -> String {
        match self {
            IdentityError::Database(_) | IdentityError::Store(_) => {
                "Internal server error".to_string()
            }
            IdentityError::Crypto(_) => "Invalid session token".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for identity operations
pub type IdentityResult<T> = Result<T, IdentityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(IdentityError::PasswordMismatch.kind(), ErrorKind::Validation);
        assert_eq!(IdentityError::EmptyScopes.kind(), ErrorKind::Validation);
        assert_eq!(IdentityError::ResetTokenNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(IdentityError::EmailTaken.kind(), ErrorKind::Conflict);
        assert_eq!(
            IdentityError::Crypto("bad tag".to_string()).kind(),
            ErrorKind::Crypto
        );
        assert_eq!(
            IdentityError::Store("boom".to_string()).kind(),
            ErrorKind::Store
        );
    }

    #[test]
    fn test_client_message_sanitized() {
        let err = IdentityError::Store("relation \"users\" does not exist".to_string());
        assert_eq!(err.client_message(), "Internal server error");

        let err = IdentityError::Crypto("poly1305 tag mismatch".to_string());
        assert!(!err.client_message().contains("poly1305"));

        let err = IdentityError::EmailTaken;
        assert_eq!(err.client_message(), "Email already exists");
    }
}
