use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AuthError;
use crate::store::{User, UserStore};

pub const DEFAULT_MAX_LOGIN_ATTEMPTS: i32 = 5;
pub const DEFAULT_LOCKOUT_MINUTES: i64 = 30;

/// Lockout policy around the login flow: counts failed attempts, locks the
/// account when the threshold is crossed, resets on success.
pub struct AccountGuard {
    store: Arc<dyn UserStore>,
    max_attempts: i32,
    lockout: Duration,
}

impl AccountGuard {
    pub fn new(store: Arc<dyn UserStore>, max_attempts: i32, lockout: Duration) -> Self {
        Self {
            store,
            max_attempts,
            lockout,
        }
    }

    /// Checked before the password is compared.
    pub fn ensure_not_locked(&self, user: &User, now: OffsetDateTime) -> Result<(), AuthError> {
        match user.locked_until {
            Some(until) if until > now => Err(AuthError::AccountLocked { until }),
            _ => Ok(()),
        }
    }

    /// Records a failed password attempt and returns the error the attempt
    /// should surface: `AccountLocked` when this failure crossed the
    /// threshold, `InvalidCredentials` otherwise. The increment is atomic
    /// at the store, so concurrent failures each see their own count.
    pub async fn record_failure(&self, user_id: Uuid) -> AuthError {
        let updated = match self.store.increment_login_attempts(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return AuthError::InvalidCredentials,
            Err(e) => return AuthError::Internal(e),
        };

        if updated.login_attempts >= self.max_attempts {
            let until = OffsetDateTime::now_utc() + self.lockout;
            if let Err(e) = self.store.lock_account(user_id, until).await {
                return AuthError::Internal(e);
            }
            warn!(
                user_id = %user_id,
                attempts = updated.login_attempts,
                "account locked after repeated failed logins"
            );
            AuthError::AccountLocked { until }
        } else {
            debug!(
                user_id = %user_id,
                attempts = updated.login_attempts,
                "failed login recorded"
            );
            AuthError::InvalidCredentials
        }
    }

    /// Clears the counter and any lock once the password has been validated.
    pub async fn record_success(&self, user: &User) -> Result<(), AuthError> {
        if user.login_attempts > 0 || user.locked_until.is_some() {
            self.store.reset_login_attempts(user.id).await?;
        }
        Ok(())
    }

    /// Stamped only after every login gate has passed.
    pub async fn stamp_last_login(&self, user_id: Uuid) -> Result<(), AuthError> {
        self.store.update_last_login(user_id).await?;
        Ok(())
    }
}
