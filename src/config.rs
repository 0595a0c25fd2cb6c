use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub max_login_attempts: i32,
    pub lockout_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub environment: String,
    pub app_url: String,
    pub frontend_url: String,
    pub jwt: JwtConfig,
    pub security: SecurityConfig,
    /// SMTP is optional; without it emails are logged instead of sent.
    pub smtp: Option<SmtpConfig>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let environment = std::env::var("APP_ENV").unwrap_or_else(|_| "development".into());
        let app_url =
            std::env::var("APP_URL").unwrap_or_else(|_| "http://localhost:8080".into());
        let frontend_url =
            std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".into());

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "authd".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "authd-users".into()),
            access_ttl_minutes: std::env::var("JWT_ACCESS_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(15),
            refresh_ttl_minutes: std::env::var("JWT_REFRESH_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 7),
        };

        let security = SecurityConfig {
            max_login_attempts: std::env::var("MAX_LOGIN_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse::<i32>().ok())
                .unwrap_or(crate::auth::guard::DEFAULT_MAX_LOGIN_ATTEMPTS),
            lockout_minutes: std::env::var("LOCKOUT_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(crate::auth::guard::DEFAULT_LOCKOUT_MINUTES),
        };

        let smtp = match std::env::var("SMTP_HOST") {
            Ok(host) => Some(SmtpConfig {
                host,
                port: std::env::var("SMTP_PORT")
                    .ok()
                    .and_then(|v| v.parse::<u16>().ok())
                    .unwrap_or(587),
                username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
                password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
                from: std::env::var("SMTP_FROM")
                    .unwrap_or_else(|_| "no-reply@localhost".into()),
            }),
            Err(_) => None,
        };

        Ok(Self {
            database_url,
            environment,
            app_url,
            frontend_url,
            jwt,
            security,
            smtp,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
