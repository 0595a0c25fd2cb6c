use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::RngCore;
use time::{Date, Duration, OffsetDateTime};
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::guard::AccountGuard;
use crate::auth::jwt::JwtKeys;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::session::{RefreshedTokens, SessionManager, TokenPair};
use crate::config::SecurityConfig;
use crate::error::AuthError;
use crate::mailer::Mailer;
use crate::store::{NewUser, User, UserStore, UserUpdate};

pub const VERIFICATION_TOKEN_TTL_HOURS: i64 = 24;
pub const RESET_TOKEN_TTL_MINUTES: i64 = 60;

/// Input for `register`, already shape-validated by the caller.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub timezone: Option<String>,
    pub language: Option<String>,
    pub birth_date: Option<Date>,
}

/// Orchestrates the account lifecycle over the store, mailer, guard and
/// session manager. All state checks go through the `User` predicates.
pub struct AuthService {
    store: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    guard: AccountGuard,
    sessions: SessionManager,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// 32 random bytes, URL-safe so it can ride in a link.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

impl AuthService {
    pub fn new(
        store: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
        keys: JwtKeys,
        security: &SecurityConfig,
    ) -> Self {
        let guard = AccountGuard::new(
            store.clone(),
            security.max_login_attempts,
            Duration::minutes(security.lockout_minutes),
        );
        let sessions = SessionManager::new(store.clone(), keys);
        Self {
            store,
            mailer,
            guard,
            sessions,
        }
    }

    /// Creates an unverified account and sends the verification email.
    pub async fn register(&self, reg: Registration) -> Result<User, AuthError> {
        let email = normalize_email(&reg.email);
        if self.store.email_exists(&email).await? {
            return Err(AuthError::EmailInUse);
        }

        let hash = hash_password(&reg.password)?;
        let token = generate_token();
        let mut new_user = NewUser::new(reg.name.trim(), email, hash)
            .with_verification_token(token.clone(), OffsetDateTime::now_utc());
        if let Some(timezone) = reg.timezone {
            new_user = new_user.with_timezone(timezone);
        }
        if let Some(language) = reg.language {
            new_user = new_user.with_language(language);
        }
        if let Some(birth_date) = reg.birth_date {
            new_user = new_user.with_birth_date(birth_date);
        }

        let user = self.store.create_user(new_user).await?;
        self.mailer
            .send_verification_email(&user.email, &user.name, &token)
            .await?;
        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    /// Marks the account verified and burns the token, atomically.
    pub async fn verify_email(&self, token: &str) -> Result<User, AuthError> {
        let user = self
            .store
            .find_by_verification_token(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        let sent_at = user
            .email_verification_sent_at
            .ok_or(AuthError::InvalidToken)?;

        let now = OffsetDateTime::now_utc();
        if now - sent_at > Duration::hours(VERIFICATION_TOKEN_TTL_HOURS) {
            return Err(AuthError::TokenExpired);
        }

        let updated = self
            .store
            .update_user(
                user.id,
                UserUpdate::new()
                    .is_email_verified(true)
                    .email_verification_token(None)
                    .email_verification_sent_at(None),
            )
            .await?
            .ok_or(AuthError::InvalidToken)?;
        info!(user_id = %updated.id, "email verified");
        Ok(updated)
    }

    /// Unknown emails succeed silently; a fresh token replaces the previous
    /// one, which stops working.
    pub async fn resend_verification(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let Some(user) = self.store.find_by_email(&email).await? else {
            debug!("resend requested for unknown email");
            return Ok(());
        };
        if user.is_email_verified {
            return Err(AuthError::AlreadyVerified);
        }

        let token = generate_token();
        let updated = self
            .store
            .update_user(
                user.id,
                UserUpdate::new()
                    .email_verification_token(Some(token.clone()))
                    .email_verification_sent_at(Some(OffsetDateTime::now_utc())),
            )
            .await?;
        if updated.is_none() {
            debug!(user_id = %user.id, "resend skipped for deactivated account");
            return Ok(());
        }

        self.mailer
            .send_verification_email(&user.email, &user.name, &token)
            .await?;
        info!(user_id = %user.id, "verification email resent");
        Ok(())
    }

    /// Check order: existence, deactivation, lock, password, then the
    /// verified gate. The attempt counter resets as soon as the password
    /// matches; the last-login stamp waits until every gate has passed.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(User, TokenPair), AuthError> {
        let email = normalize_email(email);
        let user = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if user.is_deactivated() {
            return Err(AuthError::AccountDeactivated);
        }
        self.guard
            .ensure_not_locked(&user, OffsetDateTime::now_utc())?;

        if !verify_password(password, &user.password_hash)? {
            return Err(self.guard.record_failure(user.id).await);
        }
        self.guard.record_success(&user).await?;

        if !user.is_email_verified {
            return Err(AuthError::EmailNotVerified);
        }

        self.guard.stamp_last_login(user.id).await?;
        let tokens = self.sessions.issue(user.id).await?;
        info!(user_id = %user.id, "user logged in");
        Ok((user, tokens))
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, AuthError> {
        self.sessions.refresh(refresh_token).await
    }

    /// Best-effort; never fails visibly.
    pub async fn logout(&self, refresh_token: &str) {
        self.sessions.invalidate(refresh_token).await;
    }

    pub async fn logout_all(&self, user_id: Uuid) -> Result<(), AuthError> {
        self.sessions.invalidate_all(user_id).await
    }

    /// Uniform success whether or not the email exists, so the endpoint
    /// cannot be used to enumerate accounts.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let Some(user) = self.store.find_by_email(&email).await? else {
            debug!("password reset requested for unknown email");
            return Ok(());
        };
        if user.is_deactivated() {
            debug!(user_id = %user.id, "password reset skipped for deactivated account");
            return Ok(());
        }

        let token = generate_token();
        let expires_at = OffsetDateTime::now_utc() + Duration::minutes(RESET_TOKEN_TTL_MINUTES);
        self.store
            .update_user(
                user.id,
                UserUpdate::new()
                    .password_reset_token(Some(token.clone()))
                    .password_reset_expires_at(Some(expires_at)),
            )
            .await?;
        self.mailer
            .send_password_reset_email(&user.email, &user.name, &token)
            .await?;
        info!(user_id = %user.id, "password reset email sent");
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        let user = self
            .store
            .find_by_reset_token(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        if user.reset_token_expired(OffsetDateTime::now_utc()) {
            return Err(AuthError::TokenExpired);
        }

        let hash = hash_password(new_password)?;
        self.store
            .update_user(
                user.id,
                UserUpdate::new()
                    .password_hash(hash)
                    .password_reset_token(None)
                    .password_reset_expires_at(None),
            )
            .await?;
        info!(user_id = %user.id, "password reset");
        Ok(())
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !verify_password(current_password, &user.password_hash)? {
            return Err(AuthError::InvalidPassword);
        }

        let hash = hash_password(new_password)?;
        self.store
            .update_user(user.id, UserUpdate::new().password_hash(hash))
            .await?;
        info!(user_id = %user.id, "password changed");
        Ok(())
    }

    pub async fn current_user(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Drops every session, then soft-deletes the account.
    pub async fn deactivate_account(&self, user_id: Uuid) -> Result<(), AuthError> {
        self.sessions.invalidate_all(user_id).await?;
        if !self.store.soft_delete(user_id).await? {
            return Err(AuthError::UserNotFound);
        }
        info!(user_id = %user_id, "account deactivated");
        Ok(())
    }
}

#[cfg(test)]
mod service_tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::store::MemoryUserStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const PASSWORD: &str = "Password1";

    struct RecordingMailer {
        sent: Mutex<Vec<(&'static str, String, String)>>,
    }

    impl RecordingMailer {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
            }
        }

        fn last_token(&self) -> Option<String> {
            self.sent
                .lock()
                .unwrap()
                .last()
                .map(|(_, _, token)| token.clone())
        }

        fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send_verification_email(
            &self,
            to: &str,
            _name: &str,
            token: &str,
        ) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push(("verification", to.to_string(), token.to_string()));
            Ok(())
        }

        async fn send_password_reset_email(
            &self,
            to: &str,
            _name: &str,
            token: &str,
        ) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push(("reset", to.to_string(), token.to_string()));
            Ok(())
        }
    }

    fn test_keys(refresh_ttl_minutes: i64) -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: "service-test-secret".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            access_ttl_minutes: 15,
            refresh_ttl_minutes,
        })
    }

    fn make_service(
        refresh_ttl_minutes: i64,
    ) -> (AuthService, Arc<MemoryUserStore>, Arc<RecordingMailer>) {
        let store = Arc::new(MemoryUserStore::new());
        let mailer = Arc::new(RecordingMailer::new());
        let service = AuthService::new(
            store.clone(),
            mailer.clone(),
            test_keys(refresh_ttl_minutes),
            &SecurityConfig {
                max_login_attempts: 5,
                lockout_minutes: 30,
            },
        );
        (service, store, mailer)
    }

    fn registration(email: &str) -> Registration {
        Registration {
            name: "Test User".into(),
            email: email.into(),
            password: PASSWORD.into(),
            timezone: None,
            language: None,
            birth_date: None,
        }
    }

    async fn register_verified(
        service: &AuthService,
        mailer: &RecordingMailer,
        email: &str,
    ) -> User {
        service.register(registration(email)).await.unwrap();
        let token = mailer.last_token().unwrap();
        service.verify_email(&token).await.unwrap()
    }

    #[tokio::test]
    async fn register_creates_unverified_user_and_sends_token() {
        let (service, store, mailer) = make_service(7 * 24 * 60);
        let user = service
            .register(registration("NewUser@Example.COM"))
            .await
            .unwrap();

        assert_eq!(user.email, "newuser@example.com");
        assert!(!user.is_email_verified);
        assert_ne!(user.password_hash, PASSWORD);
        assert!(verify_password(PASSWORD, &user.password_hash).unwrap());

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        let token = mailer.last_token().unwrap();
        assert_eq!(stored.email_verification_token.as_deref(), Some(token.as_str()));
        assert!(stored.email_verification_sent_at.is_some());
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email_case_insensitively() {
        let (service, _store, _mailer) = make_service(7 * 24 * 60);
        service.register(registration("dup@example.com")).await.unwrap();

        let err = service
            .register(registration("DUP@Example.Com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailInUse));
    }

    #[tokio::test]
    async fn verify_email_burns_the_token() {
        let (service, store, mailer) = make_service(7 * 24 * 60);
        service.register(registration("v@example.com")).await.unwrap();
        let token = mailer.last_token().unwrap();

        let user = service.verify_email(&token).await.unwrap();
        assert!(user.is_email_verified);
        assert!(user.email_verification_token.is_none());
        assert!(user.email_verification_sent_at.is_none());

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.is_email_verified);

        let err = service.verify_email(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn verify_email_rejects_unknown_token() {
        let (service, _store, _mailer) = make_service(7 * 24 * 60);
        let err = service.verify_email("no-such-token").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn verification_window_is_twenty_four_hours() {
        let (service, store, mailer) = make_service(7 * 24 * 60);
        let user = service.register(registration("w@example.com")).await.unwrap();
        let token = mailer.last_token().unwrap();

        // A token one minute short of the cutoff still verifies.
        let nearly = OffsetDateTime::now_utc() - Duration::hours(24) + Duration::minutes(1);
        store
            .update_user(
                user.id,
                UserUpdate::new().email_verification_sent_at(Some(nearly)),
            )
            .await
            .unwrap();
        service.verify_email(&token).await.unwrap();

        // Re-arm and push it past the cutoff.
        let stale = OffsetDateTime::now_utc() - Duration::hours(25);
        store
            .update_user(
                user.id,
                UserUpdate::new()
                    .is_email_verified(false)
                    .email_verification_token(Some(token.clone()))
                    .email_verification_sent_at(Some(stale)),
            )
            .await
            .unwrap();
        let err = service.verify_email(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[tokio::test]
    async fn resend_overwrites_the_previous_token() {
        let (service, _store, mailer) = make_service(7 * 24 * 60);
        service.register(registration("r@example.com")).await.unwrap();
        let first = mailer.last_token().unwrap();

        service.resend_verification("r@example.com").await.unwrap();
        let second = mailer.last_token().unwrap();
        assert_ne!(first, second);

        let err = service.verify_email(&first).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
        service.verify_email(&second).await.unwrap();
    }

    #[tokio::test]
    async fn resend_is_silent_for_unknown_and_loud_for_verified() {
        let (service, _store, mailer) = make_service(7 * 24 * 60);
        service.resend_verification("ghost@example.com").await.unwrap();
        assert_eq!(mailer.count(), 0);

        register_verified(&service, &mailer, "done@example.com").await;
        let err = service
            .resend_verification("done@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AlreadyVerified));
    }

    #[tokio::test]
    async fn login_unknown_email_is_invalid_credentials() {
        let (service, _store, _mailer) = make_service(7 * 24 * 60);
        let err = service
            .login("nobody@example.com", PASSWORD)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn login_happy_path_issues_a_session() {
        let (service, store, mailer) = make_service(7 * 24 * 60);
        let user = register_verified(&service, &mailer, "login@example.com").await;

        let (logged_in, tokens) = service.login("Login@Example.com", PASSWORD).await.unwrap();
        assert_eq!(logged_in.id, user.id);

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(
            stored.session_token.as_deref(),
            Some(tokens.refresh_token.as_str())
        );
        assert!(stored.last_login_at.is_some());
        assert_eq!(stored.login_attempts, 0);
    }

    #[tokio::test]
    async fn correct_password_before_verification_is_gated() {
        let (service, store, mailer) = make_service(7 * 24 * 60);
        let user = service.register(registration("gate@example.com")).await.unwrap();
        let _ = mailer.last_token();

        // One failure first, so the reset-on-success is observable.
        let err = service.login("gate@example.com", "Wrong1password").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert_eq!(
            store.find_by_id(user.id).await.unwrap().unwrap().login_attempts,
            1
        );

        let err = service.login("gate@example.com", PASSWORD).await.unwrap_err();
        assert!(matches!(err, AuthError::EmailNotVerified));

        // Password was right, so the counter reset even though login failed.
        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.login_attempts, 0);
        assert!(stored.last_login_at.is_none());
        assert!(stored.session_token.is_none());
    }

    #[tokio::test]
    async fn fifth_wrong_password_locks_and_blocks_the_right_one() {
        let (service, store, mailer) = make_service(7 * 24 * 60);
        let user = register_verified(&service, &mailer, "lock@example.com").await;

        for _ in 0..4 {
            let err = service
                .login("lock@example.com", "Wrong1password")
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials));
        }

        let err = service
            .login("lock@example.com", "Wrong1password")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccountLocked { .. }));

        // Correct password inside the lock window changes nothing.
        let err = service.login("lock@example.com", PASSWORD).await.unwrap_err();
        assert!(matches!(err, AuthError::AccountLocked { .. }));
        assert_eq!(
            store.find_by_id(user.id).await.unwrap().unwrap().login_attempts,
            5
        );
    }

    #[tokio::test]
    async fn expired_lock_clears_on_next_successful_login() {
        let (service, store, mailer) = make_service(7 * 24 * 60);
        let user = register_verified(&service, &mailer, "unlock@example.com").await;

        for _ in 0..5 {
            let _ = service.login("unlock@example.com", "Wrong1password").await;
        }
        // Rewind the lock as if the window had passed.
        store
            .lock_account(user.id, OffsetDateTime::now_utc() - Duration::seconds(1))
            .await
            .unwrap();

        service.login("unlock@example.com", PASSWORD).await.unwrap();
        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.login_attempts, 0);
        assert!(stored.locked_until.is_none());
    }

    #[tokio::test]
    async fn deactivated_account_cannot_log_in() {
        let (service, _store, mailer) = make_service(7 * 24 * 60);
        let user = register_verified(&service, &mailer, "gone@example.com").await;
        service.deactivate_account(user.id).await.unwrap();

        let err = service.login("gone@example.com", PASSWORD).await.unwrap_err();
        assert!(matches!(err, AuthError::AccountDeactivated));
        let err = service.current_user(user.id).await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }

    #[tokio::test]
    async fn refresh_round_trip_through_the_service() {
        let (service, _store, mailer) = make_service(7 * 24 * 60);
        register_verified(&service, &mailer, "fresh@example.com").await;
        let (_, tokens) = service.login("fresh@example.com", PASSWORD).await.unwrap();

        let refreshed = service.refresh(&tokens.refresh_token).await.unwrap();
        assert!(refreshed.refresh_token.is_none());
        assert!(!refreshed.access_token.is_empty());
    }

    #[tokio::test]
    async fn refresh_rotates_inside_the_final_day() {
        let (service, _store, mailer) = make_service(12 * 60);
        register_verified(&service, &mailer, "rotate@example.com").await;
        let (_, tokens) = service.login("rotate@example.com", PASSWORD).await.unwrap();

        let refreshed = service.refresh(&tokens.refresh_token).await.unwrap();
        let rotated = refreshed.refresh_token.expect("rotation expected");

        let err = service.refresh(&tokens.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidSession));
        service.refresh(&rotated).await.unwrap();
    }

    #[tokio::test]
    async fn logout_tolerates_garbage_and_kills_real_sessions() {
        let (service, _store, mailer) = make_service(7 * 24 * 60);
        service.logout("garbage").await;

        register_verified(&service, &mailer, "bye@example.com").await;
        let (_, tokens) = service.login("bye@example.com", PASSWORD).await.unwrap();
        service.logout(&tokens.refresh_token).await;
        // Logging out twice is just as fine.
        service.logout(&tokens.refresh_token).await;

        let err = service.refresh(&tokens.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidSession));
    }

    #[tokio::test]
    async fn logout_all_clears_the_session() {
        let (service, _store, mailer) = make_service(7 * 24 * 60);
        let user = register_verified(&service, &mailer, "all@example.com").await;
        let (_, tokens) = service.login("all@example.com", PASSWORD).await.unwrap();

        service.logout_all(user.id).await.unwrap();
        let err = service.refresh(&tokens.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidSession));
    }

    #[tokio::test]
    async fn forgot_password_is_uniform_across_accounts() {
        let (service, store, mailer) = make_service(7 * 24 * 60);

        service.forgot_password("ghost@example.com").await.unwrap();
        assert_eq!(mailer.count(), 0);

        let user = register_verified(&service, &mailer, "forgot@example.com").await;
        let mails_before = mailer.count();
        service.forgot_password("Forgot@Example.com").await.unwrap();
        assert_eq!(mailer.count(), mails_before + 1);

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.password_reset_token.is_some());
        let expires = stored.password_reset_expires_at.unwrap();
        let expected = OffsetDateTime::now_utc() + Duration::minutes(60);
        assert!((expected - expires).abs() < Duration::seconds(5));

        service.deactivate_account(user.id).await.unwrap();
        let mails_before = mailer.count();
        service.forgot_password("forgot@example.com").await.unwrap();
        assert_eq!(mailer.count(), mails_before);
    }

    #[tokio::test]
    async fn reset_password_round_trip() {
        let (service, store, mailer) = make_service(7 * 24 * 60);
        let user = register_verified(&service, &mailer, "reset@example.com").await;
        service.forgot_password("reset@example.com").await.unwrap();
        let token = mailer.last_token().unwrap();

        service.reset_password(&token, "NewPassword2").await.unwrap();

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.password_reset_token.is_none());
        assert!(stored.password_reset_expires_at.is_none());

        service.login("reset@example.com", "NewPassword2").await.unwrap();
        let err = service.login("reset@example.com", PASSWORD).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        // The token was burned with the reset.
        let err = service.reset_password(&token, "Another3one").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn reset_password_rejects_expired_and_unknown_tokens() {
        let (service, store, mailer) = make_service(7 * 24 * 60);
        let user = register_verified(&service, &mailer, "stale@example.com").await;
        service.forgot_password("stale@example.com").await.unwrap();
        let token = mailer.last_token().unwrap();

        store
            .update_user(
                user.id,
                UserUpdate::new().password_reset_expires_at(Some(
                    OffsetDateTime::now_utc() - Duration::seconds(1),
                )),
            )
            .await
            .unwrap();
        let err = service.reset_password(&token, "NewPassword2").await.unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));

        let err = service
            .reset_password("never-issued", "NewPassword2")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn change_password_checks_the_current_one() {
        let (service, _store, mailer) = make_service(7 * 24 * 60);
        let user = register_verified(&service, &mailer, "change@example.com").await;

        let err = service
            .change_password(user.id, "Wrong1password", "NewPassword2")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidPassword));

        let err = service
            .change_password(Uuid::new_v4(), PASSWORD, "NewPassword2")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));

        service
            .change_password(user.id, PASSWORD, "NewPassword2")
            .await
            .unwrap();
        service.login("change@example.com", "NewPassword2").await.unwrap();
    }

    #[tokio::test]
    async fn deactivate_account_revokes_the_session_first() {
        let (service, store, mailer) = make_service(7 * 24 * 60);
        let user = register_verified(&service, &mailer, "del@example.com").await;
        let (_, tokens) = service.login("del@example.com", PASSWORD).await.unwrap();

        service.deactivate_account(user.id).await.unwrap();
        assert!(store.find_by_id(user.id).await.unwrap().is_none());

        let err = service.refresh(&tokens.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidSession));

        let err = service.deactivate_account(user.id).await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }
}
