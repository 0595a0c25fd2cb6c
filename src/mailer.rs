use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use crate::config::SmtpConfig;

/// Outbound notification port. Callers treat delivery as fire-and-forget;
/// implementations decide whether a transport failure is fatal.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification_email(
        &self,
        to: &str,
        name: &str,
        token: &str,
    ) -> anyhow::Result<()>;

    async fn send_password_reset_email(
        &self,
        to: &str,
        name: &str,
        token: &str,
    ) -> anyhow::Result<()>;
}

pub fn verification_link(app_url: &str, token: &str) -> String {
    format!(
        "{}/api/auth/verify-email/{}",
        app_url.trim_end_matches('/'),
        token
    )
}

pub fn reset_link(frontend_url: &str, token: &str) -> String {
    format!(
        "{}/reset-password?token={}",
        frontend_url.trim_end_matches('/'),
        token
    )
}

/// SMTP-backed mailer. With `strict` unset (non-production) a delivery
/// failure is logged and swallowed so a broken relay cannot block signups.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    app_url: String,
    frontend_url: String,
    strict: bool,
}

impl SmtpMailer {
    pub fn new(
        config: &SmtpConfig,
        app_url: impl Into<String>,
        frontend_url: impl Into<String>,
        strict: bool,
    ) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .port(config.port)
            .build();
        let from: Mailbox = config.from.parse()?;
        Ok(Self {
            transport,
            from,
            app_url: app_url.into(),
            frontend_url: frontend_url.into(),
            strict,
        })
    }

    async fn deliver(&self, message: Message, to: &str, kind: &str) -> anyhow::Result<()> {
        match self.transport.send(message).await {
            Ok(_) => {
                info!(to = %to, kind = %kind, "email sent");
                Ok(())
            }
            Err(e) if !self.strict => {
                warn!(to = %to, kind = %kind, error = %e, "email delivery failed, continuing");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_verification_email(
        &self,
        to: &str,
        name: &str,
        token: &str,
    ) -> anyhow::Result<()> {
        let link = verification_link(&self.app_url, token);
        let body = format!(
            "Hi {name},\n\n\
            Welcome! Please verify your email address by opening the link below:\n\n\
            {link}\n\n\
            The link expires in 24 hours. If you did not create an account you \
            can ignore this email.\n"
        );
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject("Verify your email address")
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;
        self.deliver(message, to, "verification").await
    }

    async fn send_password_reset_email(
        &self,
        to: &str,
        name: &str,
        token: &str,
    ) -> anyhow::Result<()> {
        let link = reset_link(&self.frontend_url, token);
        let body = format!(
            "Hi {name},\n\n\
            A password reset was requested for your account. Open the link \
            below to choose a new password:\n\n\
            {link}\n\n\
            The link expires in 1 hour. If you did not request a reset, ignore \
            this email and your password will stay unchanged.\n"
        );
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject("Password reset request")
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;
        self.deliver(message, to, "password_reset").await
    }
}

/// Used when SMTP is not configured: logs the links instead of sending,
/// which is enough to click through a local flow.
pub struct LogMailer {
    app_url: String,
    frontend_url: String,
}

impl LogMailer {
    pub fn new(app_url: impl Into<String>, frontend_url: impl Into<String>) -> Self {
        Self {
            app_url: app_url.into(),
            frontend_url: frontend_url.into(),
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send_verification_email(
        &self,
        to: &str,
        _name: &str,
        token: &str,
    ) -> anyhow::Result<()> {
        info!(
            to = %to,
            link = %verification_link(&self.app_url, token),
            "verification email (log only)"
        );
        Ok(())
    }

    async fn send_password_reset_email(
        &self,
        to: &str,
        _name: &str,
        token: &str,
    ) -> anyhow::Result<()> {
        info!(
            to = %to,
            link = %reset_link(&self.frontend_url, token),
            "password reset email (log only)"
        );
        Ok(())
    }
}
