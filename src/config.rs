use std::env;

use crate::gate::GateMode;
use crate::models::AppSettings;

const LOCAL_AUTH_SECRET: &str = "super-secure-test-secret-value-local";

/// AppConfig
///
/// Immutable configuration loaded once at startup and shared through `AppState`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls the dev bypass and debug routes.
    pub env: Env,
    // Postgres connection string. Local runs without one use the in-memory repository.
    pub db_url: Option<String>,
    // HMAC secret for session JWTs.
    pub auth_secret: String,
    // Public base URL; used for email links, OAuth redirects and the cookie `Secure` flag.
    pub app_url: String,
    pub bind_addr: String,
    pub session_max_age_secs: u64,
    pub verify_token_ttl_minutes: i64,
    pub gate_mode: GateMode,
    pub email_from: String,
    // Mail relay endpoint; logging sender is used when absent (local only).
    pub email_api_url: Option<String>,
    pub email_api_key: Option<String>,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub app: AppSettings,
}

/// Env
///
/// Runtime context: `Local` enables development conveniences, `Production`
/// demands every secret explicitly.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// default
    ///
    /// Safe, non-panicking values for tests.
    fn default() -> Self {
        Self {
            env: Env::Local,
            db_url: None,
            auth_secret: LOCAL_AUTH_SECRET.to_string(),
            app_url: "http://localhost:3000".to_string(),
            bind_addr: "0.0.0.0:3000".to_string(),
            session_max_age_secs: 30 * 24 * 60 * 60,
            verify_token_ttl_minutes: crate::tokens::DEFAULT_TTL_MINUTES,
            gate_mode: GateMode::Scoped,
            email_from: "no-reply@example.com".to_string(),
            email_api_url: None,
            email_api_key: None,
            google_client_id: None,
            google_client_secret: None,
            app: AppSettings::default(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables (after `dotenv`).
    ///
    /// # Panics
    /// Panics in `Env::Production` when `DATABASE_URL`, `AUTH_SECRET` or
    /// `EMAIL_API_URL` is missing, so the service never starts half-configured.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };
        let defaults = Self::default();

        let (db_url, auth_secret, email_api_url) = match env {
            Env::Production => (
                Some(env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in prod")),
                env::var("AUTH_SECRET").expect("FATAL: AUTH_SECRET must be set in production."),
                Some(env::var("EMAIL_API_URL").expect("FATAL: EMAIL_API_URL required in prod")),
            ),
            Env::Local => (
                optional("DATABASE_URL"),
                env::var("AUTH_SECRET").unwrap_or(defaults.auth_secret),
                optional("EMAIL_API_URL"),
            ),
        };

        let app = AppSettings {
            name: env::var("APP_NAME").unwrap_or(defaults.app.name),
            slogan: env::var("APP_SLOGAN").unwrap_or(defaults.app.slogan),
            dir: match env::var("APP_DIR").as_deref() {
                Ok("rtl") => "rtl".to_string(),
                _ => "ltr".to_string(),
            },
            language: env::var("APP_LANG").unwrap_or(defaults.app.language),
        };

        Self {
            env,
            db_url,
            auth_secret,
            app_url: env::var("APP_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.app_url),
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            session_max_age_secs: parsed("SESSION_MAX_AGE_SECS", defaults.session_max_age_secs),
            verify_token_ttl_minutes: parsed(
                "VERIFY_TOKEN_TTL_MINUTES",
                defaults.verify_token_ttl_minutes,
            ),
            gate_mode: env::var("GATE_MODE")
                .map(|mode| GateMode::parse(&mode))
                .unwrap_or_default(),
            email_from: env::var("EMAIL_FROM").unwrap_or(defaults.email_from),
            email_api_url,
            email_api_key: optional("EMAIL_API_KEY"),
            google_client_id: optional("GOOGLE_CLIENT_ID"),
            google_client_secret: optional("GOOGLE_CLIENT_SECRET"),
            app,
        }
    }

    /// Session cookies carry `Secure` only when the site is served over HTTPS.
    pub fn cookie_secure(&self) -> bool {
        self.app_url.starts_with("https://")
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            fallback
        }),
        Err(_) => fallback,
    }
}
