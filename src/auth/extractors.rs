use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use time::OffsetDateTime;

use crate::auth::jwt::{JwtKeys, TokenError, TokenKind};
use crate::error::AuthError;
use crate::state::AppState;
use crate::store::User;

/// Extracts and validates the Bearer access token, returning the user.
/// Refresh tokens are not accepted here.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Read Authorization header
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AuthError::Unauthenticated)?;

        // Expect "Bearer <token>"
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or(AuthError::Unauthenticated)?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token).map_err(|e| match e {
            TokenError::Expired => AuthError::SessionExpired,
            TokenError::Invalid => AuthError::InvalidSession,
        })?;
        if claims.kind != TokenKind::Access {
            return Err(AuthError::InvalidSession);
        }

        // Soft-deleted users are invisible here, so a deactivated account
        // reads as an invalid session.
        let user = state
            .store
            .find_by_id(claims.sub)
            .await?
            .ok_or(AuthError::InvalidSession)?;

        if let Some(until) = user.locked_until {
            if until > OffsetDateTime::now_utc() {
                return Err(AuthError::AccountLocked { until });
            }
        }

        Ok(AuthUser(user))
    }
}
