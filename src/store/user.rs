use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// User role, stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Standard,
    Admin,
    Moderator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Standard => "standard",
            Role::Admin => "admin",
            Role::Moderator => "moderator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct ParseRoleError(String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(Role::Standard),
            "admin" => Ok(Role::Admin),
            "moderator" => Ok(Role::Moderator),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = ParseRoleError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Account lifecycle state derived from the stored fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    Unverified,
    Active,
    Locked,
    Deactivated,
}

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub is_email_verified: bool,
    pub email_verification_token: Option<String>,
    pub email_verification_sent_at: Option<OffsetDateTime>,
    pub password_reset_token: Option<String>,
    pub password_reset_expires_at: Option<OffsetDateTime>,
    pub login_attempts: i32,
    pub locked_until: Option<OffsetDateTime>,
    pub session_token: Option<String>,
    pub timezone: String,
    pub language: String,
    pub birth_date: Option<Date>,
    pub avatar_url: Option<String>,
    pub notifications_enabled: bool,
    pub last_login_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

impl User {
    pub fn is_deactivated(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_locked(&self, now: OffsetDateTime) -> bool {
        self.locked_until.map_or(false, |until| until > now)
    }

    pub fn is_verified(&self) -> bool {
        self.is_email_verified
    }

    /// Deactivation shadows every other state, matching the login checks.
    pub fn account_state(&self, now: OffsetDateTime) -> AccountState {
        if self.is_deactivated() {
            AccountState::Deactivated
        } else if self.is_locked(now) {
            AccountState::Locked
        } else if !self.is_email_verified {
            AccountState::Unverified
        } else {
            AccountState::Active
        }
    }

    pub fn reset_token_expired(&self, now: OffsetDateTime) -> bool {
        self.password_reset_expires_at.map_or(true, |at| at < now)
    }

    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            is_email_verified: self.is_email_verified,
            timezone: self.timezone.clone(),
            language: self.language.clone(),
            birth_date: self.birth_date,
            avatar_url: self.avatar_url.clone(),
            notifications_enabled: self.notifications_enabled,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
        }
    }
}

/// Projection safe to return in responses: no hash, no tokens, no counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_email_verified: bool,
    pub timezone: String,
    pub language: String,
    pub birth_date: Option<Date>,
    pub avatar_url: Option<String>,
    pub notifications_enabled: bool,
    pub last_login_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

/// Data for creating a user. Email must already be normalized and the
/// password pre-hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub email_verification_token: Option<String>,
    pub email_verification_sent_at: Option<OffsetDateTime>,
    pub timezone: String,
    pub language: String,
    pub birth_date: Option<Date>,
}

impl NewUser {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            role: Role::Standard,
            email_verification_token: None,
            email_verification_sent_at: None,
            timezone: "UTC".to_string(),
            language: "en".to_string(),
            birth_date: None,
        }
    }

    pub fn with_verification_token(
        mut self,
        token: impl Into<String>,
        sent_at: OffsetDateTime,
    ) -> Self {
        self.email_verification_token = Some(token.into());
        self.email_verification_sent_at = Some(sent_at);
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_birth_date(mut self, birth_date: Date) -> Self {
        self.birth_date = Some(birth_date);
        self
    }
}

/// Partial update. Outer `None` leaves the column alone; for nullable
/// columns an inner `None` writes NULL.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub password_hash: Option<String>,
    pub is_email_verified: Option<bool>,
    pub email_verification_token: Option<Option<String>>,
    pub email_verification_sent_at: Option<Option<OffsetDateTime>>,
    pub password_reset_token: Option<Option<String>>,
    pub password_reset_expires_at: Option<Option<OffsetDateTime>>,
    pub session_token: Option<Option<String>>,
}

impl UserUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password_hash = Some(hash.into());
        self
    }

    pub fn is_email_verified(mut self, verified: bool) -> Self {
        self.is_email_verified = Some(verified);
        self
    }

    pub fn email_verification_token(mut self, token: Option<String>) -> Self {
        self.email_verification_token = Some(token);
        self
    }

    pub fn email_verification_sent_at(mut self, sent_at: Option<OffsetDateTime>) -> Self {
        self.email_verification_sent_at = Some(sent_at);
        self
    }

    pub fn password_reset_token(mut self, token: Option<String>) -> Self {
        self.password_reset_token = Some(token);
        self
    }

    pub fn password_reset_expires_at(mut self, at: Option<OffsetDateTime>) -> Self {
        self.password_reset_expires_at = Some(at);
        self
    }

    pub fn session_token(mut self, token: Option<String>) -> Self {
        self.session_token = Some(token);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.password_hash.is_none()
            && self.is_email_verified.is_none()
            && self.email_verification_token.is_none()
            && self.email_verification_sent_at.is_none()
            && self.password_reset_token.is_none()
            && self.password_reset_expires_at.is_none()
            && self.session_token.is_none()
    }
}
