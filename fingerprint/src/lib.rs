//! # Fingerprint
//!
//! Session issuance for an identity service: user accounts, credential
//! checks, sealed session tokens carrying independently expiring scope
//! groupings, and single-use password reset tokens.
//!
//! ## Architecture
//!
//! - [`credentials`]: Argon2id password hashing and verification
//! - [`token`]: builds, seals (PASETO `v2.local`) and opens session
//!   representations
//! - [`identity`]: the issuance orchestrator, the password reset manager and
//!   the [`IdentityManager`] facade
//! - [`db`]: the transactional store contract plus PostgreSQL and in-memory
//!   implementations
//! - [`deadline`]: cooperative per-request deadlines
//!
//! ## Example
//!
//! ```
//! use chrono::{Duration, Utc};
//! use fingerprint::{
//!     CreateUserRequest, CredentialManager, Deadline, HashingConfig, IdentityManager,
//!     ScopeGrant, SealingKey, TokenSealer, db::MemoryIdentityStore,
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryIdentityStore::new());
//! let sealer = Arc::new(TokenSealer::new(SealingKey::new([7u8; 32])));
//! let hashing = HashingConfig { memory_kib: 1024, iterations: 1, parallelism: 1 };
//! let credentials = CredentialManager::new("pepper".to_string(), hashing)?;
//! let identity = IdentityManager::new(store, sealer, credentials);
//!
//! let (user, issued) = identity
//!     .create_user(
//!         CreateUserRequest {
//!             email: "a@b.com".to_string(),
//!             password: "pw1".to_string(),
//!             password_confirmation: "pw1".to_string(),
//!             scope_groupings: vec![ScopeGrant::new(["read"], Utc::now() + Duration::hours(1))],
//!         },
//!         Deadline::none(),
//!     )
//!     .await?;
//!
//! assert_eq!(user.email, "a@b.com");
//! assert_eq!(issued.representation.session_id, issued.session.id);
//! # Ok(())
//! # }
//! ```

/// Password hashing and verification.
pub mod credentials;
pub use credentials::{CredentialManager, HashingConfig};

/// Store contract and implementations.
pub mod db;

/// Cooperative request deadlines.
pub mod deadline;
pub use deadline::Deadline;

/// Orchestration, reset tokens and the public facade.
pub mod identity;
pub use identity::{
    CreateGuestUserRequest, CreateSessionRequest, CreateUserRequest, ErrorKind, IdentityError,
    IdentityManager, IdentityResult, IssuedSession, PasswordResetManager, PasswordResetToken,
    PurgeReport, ScopeGrouping, Session, SessionIssuer, SessionLookup, SessionView,
    UpdatePasswordRequest, User, UserLookup,
};

/// Session representation and token sealing.
pub mod token;
pub use token::{Representation, ScopeGrant, SealingKey, TokenSealer};
