use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::jwt::JwtKeys;
use crate::error::AuthError;
use crate::store::{UserStore, UserUpdate};

/// A refresh is answered with a rotated refresh token only when the
/// presented one has less than this long left to live.
pub const ROTATION_WINDOW_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    pub access_token: String,
    /// `None` when the presented refresh token stays valid.
    pub refresh_token: Option<String>,
}

/// Issues and revokes token pairs. The stored `session_token` column is the
/// single live refresh token per user; issuing overwrites whatever was
/// there, which invalidates the previous session.
pub struct SessionManager {
    store: Arc<dyn UserStore>,
    keys: JwtKeys,
}

impl SessionManager {
    pub fn new(store: Arc<dyn UserStore>, keys: JwtKeys) -> Self {
        Self { store, keys }
    }

    pub async fn issue(&self, user_id: Uuid) -> Result<TokenPair, AuthError> {
        let access_token = self.keys.sign_access(user_id)?;
        let refresh_token = self.keys.sign_refresh(user_id)?;
        self.store
            .update_user(
                user_id,
                UserUpdate::new().session_token(Some(refresh_token.clone())),
            )
            .await?;
        debug!(user_id = %user_id, "session issued");
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Exchanges a live refresh token for a fresh access token, rotating
    /// the refresh token when it is close to expiry. The token must both
    /// verify and match the stored session exactly; a superseded or
    /// logged-out token is rejected even though its signature is fine.
    pub async fn refresh(&self, token: &str) -> Result<RefreshedTokens, AuthError> {
        let claims = self
            .keys
            .verify_refresh(token)
            .map_err(|_| AuthError::InvalidSession)?;

        let user = self
            .store
            .find_by_session_token(token)
            .await?
            .ok_or(AuthError::InvalidSession)?;
        if user.is_deactivated() {
            return Err(AuthError::AccountDeactivated);
        }
        if user.id != claims.sub {
            return Err(AuthError::InvalidSession);
        }

        let access_token = self.keys.sign_access(user.id)?;
        let remaining = claims.remaining_secs(OffsetDateTime::now_utc());
        let refresh_token = if remaining < ROTATION_WINDOW_SECS {
            let rotated = self.keys.sign_refresh(user.id)?;
            self.store
                .update_user(
                    user.id,
                    UserUpdate::new().session_token(Some(rotated.clone())),
                )
                .await?;
            info!(user_id = %user.id, remaining_secs = remaining, "refresh token rotated");
            Some(rotated)
        } else {
            None
        };

        Ok(RefreshedTokens {
            access_token,
            refresh_token,
        })
    }

    /// Best-effort logout. A token that does not verify or matches no
    /// session is treated as already invalidated.
    pub async fn invalidate(&self, token: &str) {
        if self.keys.verify_refresh(token).is_err() {
            debug!("logout with unverifiable token, nothing to do");
            return;
        }
        match self.store.find_by_session_token(token).await {
            Ok(Some(user)) => {
                let cleared = self
                    .store
                    .update_user(user.id, UserUpdate::new().session_token(None))
                    .await;
                match cleared {
                    Ok(_) => info!(user_id = %user.id, "session invalidated"),
                    Err(e) => warn!(user_id = %user.id, error = %e, "failed to clear session"),
                }
            }
            Ok(None) => debug!("logout token matched no session"),
            Err(e) => warn!(error = %e, "session lookup failed during logout"),
        }
    }

    /// Clears the stored session whether or not one is active.
    pub async fn invalidate_all(&self, user_id: Uuid) -> Result<(), AuthError> {
        self.store
            .update_user(user_id, UserUpdate::new().session_token(None))
            .await?;
        info!(user_id = %user_id, "all sessions invalidated");
        Ok(())
    }
}
