//! In-memory identity store.
//!
//! Transactions are serializable: [`begin`](IdentityStore::begin) waits for
//! the state lock and holds it until the transaction ends. Writes go to a
//! working copy that replaces the shared state on commit and is discarded on
//! rollback or drop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::store::{IdentityStore, IdentityTransaction};
use crate::identity::{
    IdentityError, IdentityResult, PasswordResetToken, PurgeReport, ScopeGrouping, Session, User,
};

/// Store call that can be made to fail on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Begin,
    CreateUser,
    CreateSession,
    CreateScopeGrouping,
    CreatePasswordResetToken,
    UpdateUserPassword,
    DeleteResetToken,
    Commit,
    Rollback,
}

/// Row counts, for assertions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub users: usize,
    pub sessions: usize,
    pub scope_groupings: usize,
    pub reset_tokens: usize,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    sessions: HashMap<Uuid, Session>,
    scope_groupings: Vec<ScopeGrouping>,
    reset_tokens: Vec<PasswordResetToken>,
}

impl Tables {
    fn remove_session(&mut self, id: Uuid) -> bool {
        let removed = self.sessions.remove(&id).is_some();
        if removed {
            self.scope_groupings.retain(|g| g.session_id != id);
        }
        removed
    }
}

#[derive(Debug, Default)]
struct Inner {
    tables: Tables,
    fail_points: HashSet<FailPoint>,
}

/// Serializable in-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryIdentityStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call at `point` fail with a store error
    pub async fn fail_on(&self, point: FailPoint) {
        self.inner.lock().await.fail_points.insert(point);
    }

    pub async fn clear_fail_points(&self) {
        self.inner.lock().await.fail_points.clear();
    }

    /// Committed row counts
    pub async fn counts(&self) -> StoreCounts {
        let inner = self.inner.lock().await;
        StoreCounts {
            users: inner.tables.users.len(),
            sessions: inner.tables.sessions.len(),
            scope_groupings: inner.tables.scope_groupings.len(),
            reset_tokens: inner.tables.reset_tokens.len(),
        }
    }
}

fn injected(point: FailPoint) -> IdentityError {
    IdentityError::Store(format!("injected failure at {point:?}"))
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn begin(&self) -> IdentityResult<Box<dyn IdentityTransaction>> {
        let guard = Arc::clone(&self.inner).lock_owned().await;
        if guard.fail_points.contains(&FailPoint::Begin) {
            return Err(injected(FailPoint::Begin));
        }

        let working = guard.tables.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }

    async fn health_check(&self) -> IdentityResult<()> {
        Ok(())
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<Inner>,
    working: Tables,
}

impl MemoryTransaction {
    fn trip(&self, point: FailPoint) -> IdentityResult<()> {
        if self.guard.fail_points.contains(&point) {
            Err(injected(point))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl IdentityTransaction for MemoryTransaction {
    async fn create_user(&mut self, user: &User) -> IdentityResult<()> {
        self.trip(FailPoint::CreateUser)?;

        if self.working.users.values().any(|u| u.email == user.email) {
            return Err(IdentityError::EmailTaken);
        }
        if self.working.users.contains_key(&user.id) {
            return Err(IdentityError::Store(format!("duplicate user id {}", user.id)));
        }

        self.working.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user_by_email(&mut self, email: &str) -> IdentityResult<Option<User>> {
        Ok(self
            .working
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn get_user_by_uuid(&mut self, id: Uuid) -> IdentityResult<Option<User>> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn update_user_password(
        &mut self,
        id: Uuid,
        password_hash: &str,
        updated_at: DateTime<Utc>,
    ) -> IdentityResult<bool> {
        self.trip(FailPoint::UpdateUserPassword)?;

        Ok(match self.working.users.get_mut(&id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                user.updated_at = updated_at;
                true
            }
            None => false,
        })
    }

    async fn delete_user(&mut self, id: Uuid) -> IdentityResult<bool> {
        if self.working.users.remove(&id).is_none() {
            return Ok(false);
        }

        let owned: Vec<Uuid> = self
            .working
            .sessions
            .values()
            .filter(|s| s.user_id == id)
            .map(|s| s.id)
            .collect();
        for session_id in owned {
            self.working.remove_session(session_id);
        }
        self.working.reset_tokens.retain(|t| t.user_id != id);
        Ok(true)
    }

    async fn create_session(&mut self, session: &Session) -> IdentityResult<()> {
        self.trip(FailPoint::CreateSession)?;

        if !self.working.users.contains_key(&session.user_id) {
            return Err(IdentityError::Store(format!(
                "session references missing user {}",
                session.user_id
            )));
        }
        if self.working.sessions.contains_key(&session.id)
            || self.working.sessions.values().any(|s| s.token == session.token)
        {
            return Err(IdentityError::Store("duplicate session".to_string()));
        }

        self.working.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_session_by_uuid(&mut self, id: Uuid) -> IdentityResult<Option<Session>> {
        Ok(self.working.sessions.get(&id).cloned())
    }

    async fn get_session_by_token(&mut self, token: &str) -> IdentityResult<Option<Session>> {
        Ok(self
            .working
            .sessions
            .values()
            .find(|s| s.token == token)
            .cloned())
    }

    async fn delete_session_by_uuid(&mut self, id: Uuid) -> IdentityResult<bool> {
        Ok(self.working.remove_session(id))
    }

    async fn delete_session_by_token(&mut self, token: &str) -> IdentityResult<bool> {
        let id = self
            .working
            .sessions
            .values()
            .find(|s| s.token == token)
            .map(|s| s.id);

        Ok(id.is_some_and(|id| self.working.remove_session(id)))
    }

    async fn create_scope_grouping(&mut self, grouping: &ScopeGrouping) -> IdentityResult<()> {
        self.trip(FailPoint::CreateScopeGrouping)?;

        if !self.working.sessions.contains_key(&grouping.session_id) {
            return Err(IdentityError::Store(format!(
                "scope grouping references missing session {}",
                grouping.session_id
            )));
        }
        if self.working.scope_groupings.iter().any(|g| g.id == grouping.id) {
            return Err(IdentityError::Store("duplicate scope grouping".to_string()));
        }

        self.working.scope_groupings.push(grouping.clone());
        Ok(())
    }

    async fn get_scope_grouping_by_uuid(
        &mut self,
        id: Uuid,
    ) -> IdentityResult<Option<ScopeGrouping>> {
        Ok(self
            .working
            .scope_groupings
            .iter()
            .find(|g| g.id == id)
            .cloned())
    }

    async fn list_scope_groupings_for_session(
        &mut self,
        session_id: Uuid,
    ) -> IdentityResult<Vec<ScopeGrouping>> {
        Ok(self
            .working
            .scope_groupings
            .iter()
            .filter(|g| g.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn create_password_reset_token(
        &mut self,
        token: &PasswordResetToken,
    ) -> IdentityResult<()> {
        self.trip(FailPoint::CreatePasswordResetToken)?;

        if !self.working.users.contains_key(&token.user_id) {
            return Err(IdentityError::Store(format!(
                "reset token references missing user {}",
                token.user_id
            )));
        }

        if self.working.reset_tokens.iter().any(|t| t.token == token.token) {
            return Err(IdentityError::Store("duplicate reset token".to_string()));
        }

        self.working.reset_tokens.push(token.clone());
        Ok(())
    }

    async fn get_password_reset_token(
        &mut self,
        token: &str,
    ) -> IdentityResult<Option<PasswordResetToken>> {
        Ok(self
            .working
            .reset_tokens
            .iter()
            .find(|t| t.token == token)
            .cloned())
    }

    async fn delete_all_reset_tokens_for_user(&mut self, user_id: Uuid) -> IdentityResult<u64> {
        let before = self.working.reset_tokens.len();
        self.working.reset_tokens.retain(|t| t.user_id != user_id);
        Ok((before - self.working.reset_tokens.len()) as u64)
    }

    async fn delete_password_reset_token(&mut self, id: Uuid) -> IdentityResult<bool> {
        self.trip(FailPoint::DeleteResetToken)?;

        let before = self.working.reset_tokens.len();
        self.working.reset_tokens.retain(|t| t.id != id);
        Ok(self.working.reset_tokens.len() < before)
    }

    async fn purge_expired(&mut self, now: DateTime<Utc>) -> IdentityResult<PurgeReport> {
        let tables = &mut self.working;

        let tokens_before = tables.reset_tokens.len();
        tables.reset_tokens.retain(|t| !t.is_expired(now));

        let groupings_before = tables.scope_groupings.len();
        tables.scope_groupings.retain(|g| g.expiration > now);

        let live: HashSet<Uuid> = tables.scope_groupings.iter().map(|g| g.session_id).collect();
        let sessions_before = tables.sessions.len();
        tables.sessions.retain(|id, _| live.contains(id));

        Ok(PurgeReport {
            reset_tokens: (tokens_before - tables.reset_tokens.len()) as u64,
            scope_groupings: (groupings_before - tables.scope_groupings.len()) as u64,
            sessions: (sessions_before - tables.sessions.len()) as u64,
        })
    }

    async fn commit(self: Box<Self>) -> IdentityResult<()> {
        self.trip(FailPoint::Commit)?;

        let MemoryTransaction { mut guard, working } = *self;
        guard.tables = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> IdentityResult<()> {
        self.trip(FailPoint::Rollback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(email: &str) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            is_guest: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn session(user_id: Uuid) -> Session {
        Session {
            id: Uuid::new_v4(),
            user_id,
            token: format!("v2.local.{}", Uuid::new_v4()),
            created_at: Utc::now(),
        }
    }

    fn grouping(session_id: Uuid, expiration: DateTime<Utc>) -> ScopeGrouping {
        ScopeGrouping {
            id: Uuid::new_v4(),
            session_id,
            scopes: vec!["read".to_string()],
            expiration,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryIdentityStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.create_user(&user("a@b.com")).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.counts().await.users, 1);
    }

    #[tokio::test]
    async fn test_rollback_and_drop_discard_writes() {
        let store = MemoryIdentityStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.create_user(&user("a@b.com")).await.unwrap();
        tx.rollback().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.create_user(&user("c@d.com")).await.unwrap();
        drop(tx);

        assert_eq!(store.counts().await, StoreCounts::default());
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let store = MemoryIdentityStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.create_user(&user("a@b.com")).await.unwrap();

        let err = tx.create_user(&user("a@b.com")).await.unwrap_err();
        assert!(matches!(err, IdentityError::EmailTaken));
    }

    #[tokio::test]
    async fn test_session_requires_user() {
        let store = MemoryIdentityStore::new();
        let mut tx = store.begin().await.unwrap();

        let err = tx.create_session(&session(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, IdentityError::Store(_)));
    }

    #[tokio::test]
    async fn test_delete_user_cascades() {
        let store = MemoryIdentityStore::new();
        let owner = user("a@b.com");
        let s = session(owner.id);

        let mut tx = store.begin().await.unwrap();
        tx.create_user(&owner).await.unwrap();
        tx.create_session(&s).await.unwrap();
        tx.create_scope_grouping(&grouping(s.id, Utc::now())).await.unwrap();
        tx.create_password_reset_token(&PasswordResetToken {
            id: Uuid::new_v4(),
            user_id: owner.id,
            token: "t".to_string(),
            expiration: Utc::now(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

        assert!(tx.delete_user(owner.id).await.unwrap());
        assert!(!tx.delete_user(owner.id).await.unwrap());
        tx.commit().await.unwrap();

        assert_eq!(store.counts().await, StoreCounts::default());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryIdentityStore::new();
        let now = Utc::now();
        let owner = user("a@b.com");
        let stale = session(owner.id);
        let mixed = session(owner.id);

        let mut tx = store.begin().await.unwrap();
        tx.create_user(&owner).await.unwrap();
        tx.create_session(&stale).await.unwrap();
        tx.create_session(&mixed).await.unwrap();
        tx.create_scope_grouping(&grouping(stale.id, now - Duration::minutes(1)))
            .await
            .unwrap();
        tx.create_scope_grouping(&grouping(mixed.id, now - Duration::minutes(1)))
            .await
            .unwrap();
        tx.create_scope_grouping(&grouping(mixed.id, now + Duration::hours(1)))
            .await
            .unwrap();

        let report = tx.purge_expired(now).await.unwrap();
        assert_eq!(
            report,
            PurgeReport {
                reset_tokens: 0,
                scope_groupings: 2,
                sessions: 1,
            }
        );
        assert!(tx.get_session_by_uuid(stale.id).await.unwrap().is_none());
        assert_eq!(
            tx.list_scope_groupings_for_session(mixed.id)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_fail_point() {
        let store = MemoryIdentityStore::new();
        store.fail_on(FailPoint::CreateUser).await;

        let mut tx = store.begin().await.unwrap();
        let err = tx.create_user(&user("a@b.com")).await.unwrap_err();
        assert!(matches!(err, IdentityError::Store(_)));
        drop(tx);

        store.clear_fail_points().await;
        let mut tx = store.begin().await.unwrap();
        assert!(tx.create_user(&user("a@b.com")).await.is_ok());
    }
}
