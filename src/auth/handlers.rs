use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{
            ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, LoginResponse,
            LogoutRequest, MessageResponse, RefreshRequest, RefreshResponse, RegisterRequest,
            RegisterResponse, ResendVerificationRequest, ResetPasswordRequest,
        },
        extractors::AuthUser,
        password::validate_password,
        service::Registration,
    },
    error::AuthError,
    state::AppState,
    store::PublicUser,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/verify-email/:token", get(verify_email))
        .route("/auth/resend-verification", post(resend_verification))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/logout-all", post(logout_all))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password/:token", post(reset_password))
        .route("/auth/change-password", post(change_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(get_me).delete(deactivate_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AuthError> {
    payload.email = payload.email.trim().to_lowercase();

    if payload.name.trim().is_empty() {
        warn!("empty name");
        return Err(AuthError::Validation("Name must not be empty".into()));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AuthError::Validation("Invalid email".into()));
    }
    validate_password(&payload.password).map_err(AuthError::Validation)?;

    let user = state
        .auth
        .register(Registration {
            name: payload.name,
            email: payload.email,
            password: payload.password,
            timezone: payload.timezone,
            language: payload.language,
            birth_date: payload.birth_date,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: user.to_public(),
        }),
    ))
}

#[instrument(skip(state, token))]
pub async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>, AuthError> {
    state.auth.verify_email(&token).await?;
    Ok(Json(MessageResponse::new("Email verified successfully")))
}

#[instrument(skip(state, payload))]
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(mut payload): Json<ResendVerificationRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    payload.email = payload.email.trim().to_lowercase();
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AuthError::Validation("Invalid email".into()));
    }

    state.auth.resend_verification(&payload.email).await?;
    Ok(Json(MessageResponse::new("Verification email sent")))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    payload.email = payload.email.trim().to_lowercase();
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AuthError::Validation("Invalid email".into()));
    }

    let (user, tokens) = state.auth.login(&payload.email, &payload.password).await?;
    Ok(Json(LoginResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        user: user.to_public(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, AuthError> {
    let tokens = state.auth.refresh(&payload.refresh_token).await?;
    Ok(Json(RefreshResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    }))
}

#[instrument(skip(state, payload))]
pub async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<LogoutRequest>,
) -> Json<MessageResponse> {
    state.auth.logout(&payload.refresh_token).await;
    Json(MessageResponse::new("Logged out successfully"))
}

#[instrument(skip(state, user))]
pub async fn logout_all(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<MessageResponse>, AuthError> {
    state.auth.logout_all(user.id).await?;
    Ok(Json(MessageResponse::new("Logged out of all sessions")))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(mut payload): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    payload.email = payload.email.trim().to_lowercase();
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AuthError::Validation("Invalid email".into()));
    }

    state.auth.forgot_password(&payload.email).await?;
    Ok(Json(MessageResponse::new(
        "If the email exists, a password reset link has been sent",
    )))
}

#[instrument(skip(state, token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    validate_password(&payload.password).map_err(AuthError::Validation)?;
    state.auth.reset_password(&token, &payload.password).await?;
    Ok(Json(MessageResponse::new("Password reset successfully")))
}

#[instrument(skip(state, user, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    validate_password(&payload.new_password).map_err(AuthError::Validation)?;
    state
        .auth
        .change_password(user.id, &payload.current_password, &payload.new_password)
        .await?;
    Ok(Json(MessageResponse::new("Password changed successfully")))
}

#[instrument(skip(user))]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<PublicUser> {
    Json(user.to_public())
}

#[instrument(skip(state, user))]
pub async fn deactivate_me(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<MessageResponse>, AuthError> {
    state.auth.deactivate_account(user.id).await?;
    Ok(Json(MessageResponse::new("Account deactivated")))
}

#[cfg(test)]
mod handler_tests {
    use super::*;

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("a.b+c@sub.domain.io"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("spaces in@example.com"));
        assert!(!is_valid_email("missing@tld"));
    }

    #[test]
    fn refresh_response_keeps_a_null_rotation_slot() {
        let body = RefreshResponse {
            access_token: "abc".into(),
            refresh_token: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"refresh_token\":null"));
    }

    #[test]
    fn message_response_serialization() {
        let json = serde_json::to_string(&MessageResponse::new("ok")).unwrap();
        assert_eq!(json, r#"{"message":"ok"}"#);
    }
}
