// /////////////////////////////////////////////////////////////////////////////
// Mediaflow
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! User and refresh-token persistence. Storage slugs are allocated from the
//! durable `user_slugs` sequence; a slug handed out once is never reused.

use chrono::{DateTime, Utc};
use mediaflow_domain::{FlowError, RefreshToken, Role, User, UserId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{db_err, parse_user_id, unique_or_db};

/// Repository over `users`, `user_slugs`, and `refresh_tokens`.
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Allocates the next storage slug. Monotonic, never reused.
    pub async fn allocate_slug(&self, now: DateTime<Utc>) -> Result<i64, FlowError> {
        let result = sqlx::query("INSERT INTO user_slugs (allocated_at) VALUES (?)")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.last_insert_rowid())
    }

    pub async fn insert(&self, user: &User) -> Result<(), FlowError> {
        sqlx::query(
            "INSERT INTO users (id, user_slug, email, full_name, is_active, is_verified, role, \
             can_transcribe, can_process_video, can_upload, can_create_templates, \
             can_delete_recordings, can_manage_credentials, timezone, created_at, updated_at, last_login_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id.as_string())
        .bind(user.user_slug)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(user.is_active)
        .bind(user.is_verified)
        .bind(user.role.as_str())
        .bind(user.can_transcribe)
        .bind(user.can_process_video)
        .bind(user.can_upload)
        .bind(user.can_create_templates)
        .bind(user.can_delete_recordings)
        .bind(user.can_manage_credentials)
        .bind(&user.timezone)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(user.last_login_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_or_db(e, "user"))?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: UserId) -> Result<Option<User>, FlowError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id.as_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, FlowError> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    pub async fn set_active(&self, id: UserId, is_active: bool, now: DateTime<Utc>) -> Result<(), FlowError> {
        sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(is_active)
            .bind(now)
            .bind(id.as_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn touch_login(&self, id: UserId, now: DateTime<Utc>) -> Result<(), FlowError> {
        sqlx::query("UPDATE users SET last_login_at = ?, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(id.as_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn insert_token(
        &self,
        user_id: UserId,
        token: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<i64, FlowError> {
        let result = sqlx::query(
            "INSERT INTO refresh_tokens (user_id, token, expires_at, is_revoked, created_at) VALUES (?, ?, ?, 0, ?)",
        )
        .bind(user_id.as_string())
        .bind(token)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_or_db(e, "refresh token"))?;
        Ok(result.last_insert_rowid())
    }

    pub async fn find_token(&self, token: &str) -> Result<Option<RefreshToken>, FlowError> {
        let row = sqlx::query("SELECT * FROM refresh_tokens WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| row_to_token(&r)).transpose()
    }

    pub async fn revoke_token(&self, token: &str) -> Result<bool, FlowError> {
        let result = sqlx::query("UPDATE refresh_tokens SET is_revoked = 1 WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    /// Janitor helper: drops tokens past their expiry.
    pub async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, FlowError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}

fn row_to_user(row: &SqliteRow) -> Result<User, FlowError> {
    Ok(User {
        id: parse_user_id(&row.try_get::<String, _>("id").map_err(db_err)?)?,
        user_slug: row.try_get("user_slug").map_err(db_err)?,
        email: row.try_get("email").map_err(db_err)?,
        full_name: row.try_get("full_name").map_err(db_err)?,
        is_active: row.try_get("is_active").map_err(db_err)?,
        is_verified: row.try_get("is_verified").map_err(db_err)?,
        role: Role::parse(&row.try_get::<String, _>("role").map_err(db_err)?)?,
        can_transcribe: row.try_get("can_transcribe").map_err(db_err)?,
        can_process_video: row.try_get("can_process_video").map_err(db_err)?,
        can_upload: row.try_get("can_upload").map_err(db_err)?,
        can_create_templates: row.try_get("can_create_templates").map_err(db_err)?,
        can_delete_recordings: row.try_get("can_delete_recordings").map_err(db_err)?,
        can_manage_credentials: row.try_get("can_manage_credentials").map_err(db_err)?,
        timezone: row.try_get("timezone").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
        last_login_at: row.try_get("last_login_at").map_err(db_err)?,
    })
}

fn row_to_token(row: &SqliteRow) -> Result<RefreshToken, FlowError> {
    Ok(RefreshToken {
        id: row.try_get("id").map_err(db_err)?,
        user_id: parse_user_id(&row.try_get::<String, _>("user_id").map_err(db_err)?)?,
        token: row.try_get("token").map_err(db_err)?,
        expires_at: row.try_get("expires_at").map_err(db_err)?,
        is_revoked: row.try_get("is_revoked").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::schema::memory_pool;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_slugs_are_monotonic() {
        let repo = UserRepository::new(memory_pool().await.unwrap());
        let a = repo.allocate_slug(now()).await.unwrap();
        let b = repo.allocate_slug(now()).await.unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_insert_and_find_round_trip() {
        let repo = UserRepository::new(memory_pool().await.unwrap());
        let slug = repo.allocate_slug(now()).await.unwrap();
        let user = User::register(UserId::generate(), slug, "a@b.example", now());
        repo.insert(&user).await.unwrap();

        let found = repo.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(found, user);
        assert_eq!(repo.find_by_email("a@b.example").await.unwrap().unwrap().id, user.id);
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let repo = UserRepository::new(memory_pool().await.unwrap());
        let a = User::register(UserId::generate(), repo.allocate_slug(now()).await.unwrap(), "a@b.example", now());
        let b = User::register(UserId::generate(), repo.allocate_slug(now()).await.unwrap(), "a@b.example", now());
        repo.insert(&a).await.unwrap();
        let err = repo.insert(&b).await.unwrap_err();
        assert!(matches!(err, FlowError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_token_lifecycle() {
        let repo = UserRepository::new(memory_pool().await.unwrap());
        let user = User::register(UserId::generate(), repo.allocate_slug(now()).await.unwrap(), "a@b.example", now());
        repo.insert(&user).await.unwrap();

        repo.insert_token(user.id, "tok-1", now() + chrono::Duration::days(7), now())
            .await
            .unwrap();
        let token = repo.find_token("tok-1").await.unwrap().unwrap();
        assert!(token.is_valid(now()));

        assert!(repo.revoke_token("tok-1").await.unwrap());
        assert!(!repo.find_token("tok-1").await.unwrap().unwrap().is_valid(now()));

        repo.insert_token(user.id, "tok-2", now() - chrono::Duration::hours(1), now())
            .await
            .unwrap();
        assert_eq!(repo.delete_expired_tokens(now()).await.unwrap(), 1);
        assert!(repo.find_token("tok-2").await.unwrap().is_none());
    }
}
