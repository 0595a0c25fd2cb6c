mod memory;
mod postgres;
mod user;

pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;
pub use user::{AccountState, NewUser, PublicUser, Role, User, UserUpdate};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Persistence port for user records.
///
/// Lookups by id, verification token and reset token exclude soft-deleted
/// rows. `find_by_email` and `find_by_session_token` return soft-deleted
/// rows too so callers can distinguish a deactivated account from an
/// unknown one. `find_by_reset_token` returns the row even when the reset
/// window has passed; expiry is the caller's check. Every mutation bumps
/// `updated_at`.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: NewUser) -> anyhow::Result<User>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_verification_token(&self, token: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_reset_token(&self, token: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_session_token(&self, token: &str) -> anyhow::Result<Option<User>>;

    /// Applies the set fields and returns the updated row, or `None` when
    /// the user does not exist or is soft-deleted.
    async fn update_user(&self, id: Uuid, update: UserUpdate) -> anyhow::Result<Option<User>>;

    async fn soft_delete(&self, id: Uuid) -> anyhow::Result<bool>;
    async fn restore(&self, id: Uuid) -> anyhow::Result<bool>;

    /// Case-insensitive, includes soft-deleted rows (the unique index does).
    async fn email_exists(&self, email: &str) -> anyhow::Result<bool>;

    /// Atomic increment; returns the row as updated by this call.
    async fn increment_login_attempts(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn reset_login_attempts(&self, id: Uuid) -> anyhow::Result<()>;
    async fn lock_account(&self, id: Uuid, until: OffsetDateTime) -> anyhow::Result<()>;
    async fn update_last_login(&self, id: Uuid) -> anyhow::Result<()>;
}
