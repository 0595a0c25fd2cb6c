use async_trait::async_trait;
use sqlx::{PgPool, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use super::user::{NewUser, User, UserUpdate};
use super::UserStore;

/// Postgres-backed user store.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create_user(&self, user: NewUser) -> anyhow::Result<User> {
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (
                id, name, email, password_hash, role,
                email_verification_token, email_verification_sent_at,
                timezone, language, birth_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.email_verification_token)
        .bind(user.email_verification_sent_at)
        .bind(&user.timezone)
        .bind(&user.language)
        .bind(user.birth_date)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_verification_token(&self, token: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE email_verification_token = $1 AND deleted_at IS NULL",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_reset_token(&self, token: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE password_reset_token = $1 AND deleted_at IS NULL",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_session_token(&self, token: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE session_token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update_user(&self, id: Uuid, update: UserUpdate) -> anyhow::Result<Option<User>> {
        if update.is_empty() {
            return self.find_by_id(id).await;
        }

        let mut query: QueryBuilder<sqlx::Postgres> = QueryBuilder::new("UPDATE users SET ");
        let mut separated = query.separated(", ");

        if let Some(ref hash) = update.password_hash {
            separated.push("password_hash = ");
            separated.push_bind_unseparated(hash.clone());
        }
        if let Some(verified) = update.is_email_verified {
            separated.push("is_email_verified = ");
            separated.push_bind_unseparated(verified);
        }
        if let Some(ref token) = update.email_verification_token {
            separated.push("email_verification_token = ");
            separated.push_bind_unseparated(token.clone());
        }
        if let Some(sent_at) = update.email_verification_sent_at {
            separated.push("email_verification_sent_at = ");
            separated.push_bind_unseparated(sent_at);
        }
        if let Some(ref token) = update.password_reset_token {
            separated.push("password_reset_token = ");
            separated.push_bind_unseparated(token.clone());
        }
        if let Some(expires_at) = update.password_reset_expires_at {
            separated.push("password_reset_expires_at = ");
            separated.push_bind_unseparated(expires_at);
        }
        if let Some(ref token) = update.session_token {
            separated.push("session_token = ");
            separated.push_bind_unseparated(token.clone());
        }
        separated.push("updated_at = NOW()");

        query.push(" WHERE id = ");
        query.push_bind(id);
        query.push(" AND deleted_at IS NULL RETURNING *");

        let user = query
            .build_query_as::<User>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn soft_delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = NOW(), updated_at = NOW()
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn restore(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = NULL, updated_at = NOW()
             WHERE id = $1 AND deleted_at IS NOT NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn email_exists(&self, email: &str) -> anyhow::Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1))",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn increment_login_attempts(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET login_attempts = login_attempts + 1, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn reset_login_attempts(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users SET login_attempts = 0, locked_until = NULL, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn lock_account(&self, id: Uuid, until: OffsetDateTime) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users SET locked_until = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(until)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_last_login(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users SET last_login_at = NOW(), updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
