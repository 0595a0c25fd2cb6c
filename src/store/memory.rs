use anyhow::bail;
use async_trait::async_trait;
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::user::{NewUser, User, UserUpdate};
use super::UserStore;

/// In-memory user store with the same visibility rules as the Postgres
/// implementation. Backs `AppState::fake()` and the service tests.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply_update(user: &mut User, update: UserUpdate, now: OffsetDateTime) {
    if let Some(hash) = update.password_hash {
        user.password_hash = hash;
    }
    if let Some(verified) = update.is_email_verified {
        user.is_email_verified = verified;
    }
    if let Some(token) = update.email_verification_token {
        user.email_verification_token = token;
    }
    if let Some(sent_at) = update.email_verification_sent_at {
        user.email_verification_sent_at = sent_at;
    }
    if let Some(token) = update.password_reset_token {
        user.password_reset_token = token;
    }
    if let Some(expires_at) = update.password_reset_expires_at {
        user.password_reset_expires_at = expires_at;
    }
    if let Some(token) = update.session_token {
        user.session_token = token;
    }
    user.updated_at = now;
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create_user(&self, user: NewUser) -> anyhow::Result<User> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            bail!("email already exists: {}", user.email);
        }
        let now = OffsetDateTime::now_utc();
        let record = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            is_email_verified: false,
            email_verification_token: user.email_verification_token,
            email_verification_sent_at: user.email_verification_sent_at,
            password_reset_token: None,
            password_reset_expires_at: None,
            login_attempts: 0,
            locked_until: None,
            session_token: None,
            timezone: user.timezone,
            language: user.language,
            birth_date: user.birth_date,
            avatar_url: None,
            notifications_enabled: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .get(&id)
            .filter(|u| u.deleted_at.is_none())
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_verification_token(&self, token: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| {
                u.deleted_at.is_none()
                    && u.email_verification_token.as_deref() == Some(token)
            })
            .cloned())
    }

    async fn find_by_reset_token(&self, token: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| {
                u.deleted_at.is_none() && u.password_reset_token.as_deref() == Some(token)
            })
            .cloned())
    }

    async fn find_by_session_token(&self, token: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.session_token.as_deref() == Some(token))
            .cloned())
    }

    async fn update_user(&self, id: Uuid, update: UserUpdate) -> anyhow::Result<Option<User>> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id).filter(|u| u.deleted_at.is_none()) else {
            return Ok(None);
        };
        apply_update(user, update, OffsetDateTime::now_utc());
        Ok(Some(user.clone()))
    }

    async fn soft_delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut users = self.users.write().await;
        match users.get_mut(&id).filter(|u| u.deleted_at.is_none()) {
            Some(user) => {
                let now = OffsetDateTime::now_utc();
                user.deleted_at = Some(now);
                user.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn restore(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut users = self.users.write().await;
        match users.get_mut(&id).filter(|u| u.deleted_at.is_some()) {
            Some(user) => {
                user.deleted_at = None;
                user.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn email_exists(&self, email: &str) -> anyhow::Result<bool> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(email)))
    }

    async fn increment_login_attempts(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id).filter(|u| u.deleted_at.is_none()) else {
            return Ok(None);
        };
        user.login_attempts += 1;
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn reset_login_attempts(&self, id: Uuid) -> anyhow::Result<()> {
        let mut users = self.users.write().await;
        if let Some(user) = users.get_mut(&id) {
            user.login_attempts = 0;
            user.locked_until = None;
            user.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn lock_account(&self, id: Uuid, until: OffsetDateTime) -> anyhow::Result<()> {
        let mut users = self.users.write().await;
        if let Some(user) = users.get_mut(&id) {
            user.locked_until = Some(until);
            user.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn update_last_login(&self, id: Uuid) -> anyhow::Result<()> {
        let mut users = self.users.write().await;
        if let Some(user) = users.get_mut(&id) {
            user.last_login_at = Some(OffsetDateTime::now_utc());
            user.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }
}
