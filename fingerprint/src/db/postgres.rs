//! PostgreSQL identity store.
//!
//! Schema: `migrations/20240101000000_identity.sql`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use super::store::{IdentityStore, IdentityTransaction};
use crate::identity::{
    IdentityError, IdentityResult, PasswordResetToken, PurgeReport, ScopeGrouping, Session, User,
};

const USER_COLUMNS: &str = "id, email, password_hash, is_guest, created_at, updated_at";
const SESSION_COLUMNS: &str = "id, user_id, token, created_at";
const GROUPING_COLUMNS: &str = "id, session_id, scopes, expiration, created_at";
const RESET_COLUMNS: &str = "id, user_id, token, expiration, created_at";

/// Identity store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn begin(&self) -> IdentityResult<Box<dyn IdentityTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgIdentityTransaction { tx }))
    }

    async fn health_check(&self) -> IdentityResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Open PostgreSQL transaction; rolled back by sqlx when dropped
pub struct PgIdentityTransaction {
    tx: Transaction<'static, Postgres>,
}

fn user_from_row(r: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: r.try_get("id")?,
        email: r.try_get("email")?,
        password_hash: r.try_get("password_hash")?,
        is_guest: r.try_get("is_guest")?,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
    })
}

fn session_from_row(r: &PgRow) -> Result<Session, sqlx::Error> {
    Ok(Session {
        id: r.try_get("id")?,
        user_id: r.try_get("user_id")?,
        token: r.try_get("token")?,
        created_at: r.try_get("created_at")?,
    })
}

fn grouping_from_row(r: &PgRow) -> Result<ScopeGrouping, sqlx::Error> {
    Ok(ScopeGrouping {
        id: r.try_get("id")?,
        session_id: r.try_get("session_id")?,
        scopes: r.try_get("scopes")?,
        expiration: r.try_get("expiration")?,
        created_at: r.try_get("created_at")?,
    })
}

fn reset_token_from_row(r: &PgRow) -> Result<PasswordResetToken, sqlx::Error> {
    Ok(PasswordResetToken {
        id: r.try_get("id")?,
        user_id: r.try_get("user_id")?,
        token: r.try_get("token")?,
        expiration: r.try_get("expiration")?,
        created_at: r.try_get("created_at")?,
    })
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

#[async_trait]
impl IdentityTransaction for PgIdentityTransaction {
    async fn create_user(&mut self, user: &User) -> IdentityResult<()> {
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, is_guest, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_guest)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                IdentityError::EmailTaken
            } else {
                IdentityError::Database(e)
            }
        })?;
        Ok(())
    }

    async fn get_user_by_email(&mut self, email: &str) -> IdentityResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn get_user_by_uuid(&mut self, id: Uuid) -> IdentityResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn update_user_password(
        &mut self,
        id: Uuid,
        password_hash: &str,
        updated_at: DateTime<Utc>,
    ) -> IdentityResult<bool> {
        let result = sqlx::query("UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .bind(updated_at)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_user(&mut self, id: Uuid) -> IdentityResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_session(&mut self, session: &Session) -> IdentityResult<()> {
        sqlx::query("INSERT INTO sessions (id, user_id, token, created_at) VALUES ($1, $2, $3, $4)")
            .bind(session.id)
            .bind(session.user_id)
            .bind(&session.token)
            .bind(session.created_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn get_session_by_uuid(&mut self, id: Uuid) -> IdentityResult<Option<Session>> {
        let row = sqlx::query(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.as_ref().map(session_from_row).transpose()?)
    }

    async fn get_session_by_token(&mut self, token: &str) -> IdentityResult<Option<Session>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.as_ref().map(session_from_row).transpose()?)
    }

    async fn delete_session_by_uuid(&mut self, id: Uuid) -> IdentityResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_session_by_token(&mut self, token: &str) -> IdentityResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_scope_grouping(&mut self, grouping: &ScopeGrouping) -> IdentityResult<()> {
        sqlx::query(
            "INSERT INTO scope_groupings (id, session_id, scopes, expiration, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(grouping.id)
        .bind(grouping.session_id)
        .bind(&grouping.scopes)
        .bind(grouping.expiration)
        .bind(grouping.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_scope_grouping_by_uuid(
        &mut self,
        id: Uuid,
    ) -> IdentityResult<Option<ScopeGrouping>> {
        let row = sqlx::query(&format!(
            "SELECT {GROUPING_COLUMNS} FROM scope_groupings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.as_ref().map(grouping_from_row).transpose()?)
    }

    async fn list_scope_groupings_for_session(
        &mut self,
        session_id: Uuid,
    ) -> IdentityResult<Vec<ScopeGrouping>> {
        let rows = sqlx::query(&format!(
            "SELECT {GROUPING_COLUMNS} FROM scope_groupings
             WHERE session_id = $1 ORDER BY seq"
        ))
        .bind(session_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows
            .iter()
            .map(grouping_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn create_password_reset_token(
        &mut self,
        token: &PasswordResetToken,
    ) -> IdentityResult<()> {
        sqlx::query(
            "INSERT INTO password_reset_tokens (id, user_id, token, expiration, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.token)
        .bind(token.expiration)
        .bind(token.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_password_reset_token(
        &mut self,
        token: &str,
    ) -> IdentityResult<Option<PasswordResetToken>> {
        let row = sqlx::query(&format!(
            "SELECT {RESET_COLUMNS} FROM password_reset_tokens WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.as_ref().map(reset_token_from_row).transpose()?)
    }

    async fn delete_all_reset_tokens_for_user(&mut self, user_id: Uuid) -> IdentityResult<u64> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_password_reset_token(&mut self, id: Uuid) -> IdentityResult<bool> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&mut self, now: DateTime<Utc>) -> IdentityResult<PurgeReport> {
        let reset_tokens = sqlx::query("DELETE FROM password_reset_tokens WHERE expiration <= $1")
            .bind(now)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();

        let scope_groupings = sqlx::query("DELETE FROM scope_groupings WHERE expiration <= $1")
            .bind(now)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();

        let sessions = sqlx::query(
            "DELETE FROM sessions s
             WHERE NOT EXISTS (SELECT 1 FROM scope_groupings g WHERE g.session_id = s.id)",
        )
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        Ok(PurgeReport {
            reset_tokens,
            scope_groupings,
            sessions,
        })
    }

    async fn commit(self: Box<Self>) -> IdentityResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> IdentityResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
