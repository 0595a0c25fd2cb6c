use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use time::OffsetDateTime;

/// Every failure the auth flows can surface, with a stable machine-readable
/// code and the HTTP status it maps to. `InvalidToken`/`TokenExpired` cover
/// the one-time email tokens (400); `InvalidSession`/`SessionExpired` cover
/// JWT session paths (401, codes INVALID_TOKEN/EXPIRED_TOKEN).
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("email is already registered")]
    EmailInUse,
    #[error("token is invalid")]
    InvalidToken,
    #[error("token has expired")]
    TokenExpired,
    #[error("email is already verified")]
    AlreadyVerified,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("account is locked until {until}")]
    AccountLocked { until: OffsetDateTime },
    #[error("account has been deactivated")]
    AccountDeactivated,
    #[error("email address has not been verified")]
    EmailNotVerified,
    #[error("user not found")]
    UserNotFound,
    #[error("current password is incorrect")]
    InvalidPassword,
    #[error("session token is invalid")]
    InvalidSession,
    #[error("access token has expired")]
    SessionExpired,
    #[error("authentication required")]
    Unauthenticated,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::EmailInUse => "EMAIL_IN_USE",
            AuthError::InvalidToken => "INVALID_TOKEN",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::AlreadyVerified => "ALREADY_VERIFIED",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::AccountLocked { .. } => "ACCOUNT_LOCKED",
            AuthError::AccountDeactivated => "ACCOUNT_DEACTIVATED",
            AuthError::EmailNotVerified => "EMAIL_NOT_VERIFIED",
            AuthError::UserNotFound => "USER_NOT_FOUND",
            AuthError::InvalidPassword => "INVALID_PASSWORD",
            AuthError::InvalidSession => "INVALID_TOKEN",
            AuthError::SessionExpired => "EXPIRED_TOKEN",
            AuthError::Unauthenticated => "UNAUTHORIZED",
            AuthError::Validation(_) => "VALIDATION_ERROR",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::EmailInUse
            | AuthError::InvalidToken
            | AuthError::TokenExpired
            | AuthError::AlreadyVerified
            | AuthError::InvalidPassword
            | AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials
            | AuthError::AccountDeactivated
            | AuthError::InvalidSession
            | AuthError::SessionExpired
            | AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthError::AccountLocked { .. } | AuthError::EmailNotVerified => {
                StatusCode::FORBIDDEN
            }
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match &self {
            AuthError::Internal(err) => {
                tracing::error!(error = ?err, "internal error");
                "something went wrong".to_string()
            }
            other => other.to_string(),
        };
        let body = Json(json!({
            "status": "error",
            "code": self.code(),
            "message": message,
        }));
        (self.status(), body).into_response()
    }
}
