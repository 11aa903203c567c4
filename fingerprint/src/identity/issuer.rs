//! Session issuance.
//!
//! Creating a user (or guest) and creating a session for an existing user
//! share one sequence, all inside a single store transaction:
//!
//! ```text
//! Begin -> UserCreated -> Sealed -> Persisted -> Committed
//!   \__________\___________\__________\______> RolledBack
//! ```
//!
//! The session id is generated before the session row exists so it can be
//! sealed into the token that row stores.

use super::{
    errors::{IdentityError, IdentityResult},
    models::{
        CreateGuestUserRequest, CreateSessionRequest, CreateUserRequest, IssuedSession,
        ScopeGrouping, Session, User,
    },
};
use crate::{
    credentials::{CredentialManager, random_alphanumeric},
    db::{IdentityStore, IdentityTransaction, store::finish},
    deadline::Deadline,
    token::{ScopeGrant, TokenSealer},
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Length of the random suffix in generated guest emails
pub const GUEST_SUFFIX_LEN: usize = 6;

/// Length of generated guest passwords
pub const GUEST_PASSWORD_LEN: usize = 16;

/// Issuance progress, logged at each transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceStage {
    Begin,
    UserCreated,
    Sealed,
    Persisted,
    Committed,
    RolledBack,
}

/// Session issuance orchestrator
#[derive(Clone)]
pub struct SessionIssuer {
    store: Arc<dyn IdentityStore>,
    sealer: Arc<TokenSealer>,
    credentials: CredentialManager,
}

impl SessionIssuer {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        sealer: Arc<TokenSealer>,
        credentials: CredentialManager,
    ) -> Self {
        Self {
            store,
            sealer,
            credentials,
        }
    }

    /// Create a user together with its first session
    ///
    /// # Errors
    ///
    /// * `IdentityError::EmptyScopes` - No scope groupings requested
    /// * `IdentityError::PasswordMismatch` - Password and confirmation differ
    /// * `IdentityError::EmailTaken` - Email already registered
    ///
    /// Nothing is persisted when any step fails.
    pub async fn create_user(
        &self,
        request: CreateUserRequest,
        deadline: Deadline,
    ) -> IdentityResult<(User, IssuedSession)> {
        require_scopes(&request.scope_groupings)?;

        let password_hash = self
            .credentials
            .confirm_and_hash_blocking(request.password, &request.password_confirmation)
            .await?;

        let user = new_user(request.email, password_hash, false);
        self.create_with_user(user, request.scope_groupings, deadline)
            .await
    }

    /// Create a guest user with a generated email and password
    ///
    /// The email is `<seed>.<6 random alphanumerics>.guest`; the password is
    /// never returned.
    pub async fn create_guest_user(
        &self,
        request: CreateGuestUserRequest,
        deadline: Deadline,
    ) -> IdentityResult<(User, IssuedSession)> {
        require_scopes(&request.scope_groupings)?;

        let email = format!(
            "{}.{}.guest",
            request.email_seed,
            random_alphanumeric(GUEST_SUFFIX_LEN)
        );
        let password_hash = self
            .credentials
            .hash_blocking(random_alphanumeric(GUEST_PASSWORD_LEN))
            .await?;

        let user = new_user(email, password_hash, true);
        self.create_with_user(user, request.scope_groupings, deadline)
            .await
    }

    /// Log in: verify credentials and issue a new session
    ///
    /// # Errors
    ///
    /// * `IdentityError::UserNotFound` - No user with that email
    /// * `IdentityError::InvalidCredentials` - Wrong password
    pub async fn create_session(
        &self,
        request: CreateSessionRequest,
        deadline: Deadline,
    ) -> IdentityResult<IssuedSession> {
        require_scopes(&request.scope_groupings)?;
        deadline.check()?;

        let mut tx = self.store.begin().await?;
        log::debug!("Issuance {:?}: login", IssuanceStage::Begin);

        let result = self.login(tx.as_mut(), request, deadline).await;
        conclude(finish(tx, result, deadline).await)
    }

    async fn login(
        &self,
        tx: &mut dyn IdentityTransaction,
        request: CreateSessionRequest,
        deadline: Deadline,
    ) -> IdentityResult<IssuedSession> {
        let user = tx
            .get_user_by_email(&request.email)
            .await?
            .ok_or(IdentityError::UserNotFound)?;

        self.credentials
            .verify_blocking(request.password, user.password_hash.clone())
            .await?;

        self.issue(tx, user.id, request.scope_groupings, deadline)
            .await
    }

    async fn create_with_user(
        &self,
        user: User,
        grants: Vec<ScopeGrant>,
        deadline: Deadline,
    ) -> IdentityResult<(User, IssuedSession)> {
        deadline.check()?;

        let mut tx = self.store.begin().await?;
        log::debug!("Issuance {:?}: user {}", IssuanceStage::Begin, user.id);

        let result = self
            .persist_user_and_issue(tx.as_mut(), &user, grants, deadline)
            .await;
        let issued = conclude(finish(tx, result, deadline).await)?;
        Ok((user, issued))
    }

    async fn persist_user_and_issue(
        &self,
        tx: &mut dyn IdentityTransaction,
        user: &User,
        grants: Vec<ScopeGrant>,
        deadline: Deadline,
    ) -> IdentityResult<IssuedSession> {
        deadline.check()?;
        tx.create_user(user).await?;
        log::debug!("Issuance {:?}: user {}", IssuanceStage::UserCreated, user.id);

        self.issue(tx, user.id, grants, deadline).await
    }

    /// Seal a new session for `user_id` and persist it with its groupings
    async fn issue(
        &self,
        tx: &mut dyn IdentityTransaction,
        user_id: Uuid,
        grants: Vec<ScopeGrant>,
        deadline: Deadline,
    ) -> IdentityResult<IssuedSession> {
        let session_id = Uuid::new_v4();
        let representation = self.sealer.build(user_id, session_id, grants)?;
        let token = self.sealer.seal(&representation)?;
        log::debug!("Issuance {:?}: session {}", IssuanceStage::Sealed, session_id);

        let now = Utc::now();
        let session = Session {
            id: session_id,
            user_id,
            token,
            created_at: now,
        };
        deadline.check()?;
        tx.create_session(&session).await?;

        let mut scope_groupings = Vec::with_capacity(representation.scope_groupings.len());
        for grant in &representation.scope_groupings {
            let grouping = ScopeGrouping {
                id: Uuid::new_v4(),
                session_id,
                scopes: grant.scopes.clone(),
                expiration: grant.expiration,
                created_at: now,
            };
            deadline.check()?;
            tx.create_scope_grouping(&grouping).await?;
            scope_groupings.push(grouping);
        }
        log::debug!(
            "Issuance {:?}: session {} with {} scope groupings",
            IssuanceStage::Persisted,
            session_id,
            scope_groupings.len()
        );

        let json = representation.to_json()?;
        Ok(IssuedSession {
            session,
            scope_groupings,
            representation,
            json,
        })
    }
}

fn require_scopes(grants: &[ScopeGrant]) -> IdentityResult<()> {
    if grants.is_empty() {
        Err(IdentityError::EmptyScopes)
    } else {
        Ok(())
    }
}

fn new_user(email: String, password_hash: String, is_guest: bool) -> User {
    let now = Utc::now();
    User {
        id: Uuid::new_v4(),
        email,
        password_hash,
        is_guest,
        created_at: now,
        updated_at: now,
    }
}

fn conclude(result: IdentityResult<IssuedSession>) -> IdentityResult<IssuedSession> {
    match &result {
        Ok(issued) => log::debug!(
            "Issuance {:?}: session {}",
            IssuanceStage::Committed,
            issued.session.id
        ),
        Err(e) => log::debug!("Issuance {:?}: {}", IssuanceStage::RolledBack, e),
    }
    result
}
