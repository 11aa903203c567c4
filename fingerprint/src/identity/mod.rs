//! Identity module: session issuance, password resets and the public facade.
//!
//! This module implements:
//! - Atomic creation of users, guests and sessions with their scope groupings
//! - Single-use password reset tokens
//! - Session lookup, revocation and account deletion
//!
//! Every operation takes a [`Deadline`](crate::Deadline) that is checked
//! between store calls.

pub mod errors;
pub mod issuer;
pub mod manager;
pub mod models;
pub mod reset;

pub use errors::{ErrorKind, IdentityError, IdentityResult};
pub use issuer::{IssuanceStage, SessionIssuer};
pub use manager::IdentityManager;
pub use models::{
    CreateGuestUserRequest, CreateSessionRequest, CreateUserRequest, IssuedSession,
    PasswordResetToken, PurgeReport, ScopeGrouping, Session, SessionLookup, SessionView,
    UpdatePasswordRequest, User, UserLookup,
};
pub use reset::PasswordResetManager;
