use axum::{
    extract::{FromRef, FromRequestParts},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{self, InvalidHeaderValue},
        request::Parts,
    },
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    gate::Session,
    models::{Role, User},
    repository::RepositoryState,
};

/// Name of the cookie carrying the session JWT.
pub const SESSION_COOKIE_NAME: &str = "authjs.session-token";

/// Claims
///
/// Payload of the session JWT (HS256, signed with `AUTH_SECRET`).
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user's UUID.
    pub sub: Uuid,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Role at issue time. Resolution prefers the stored role so demotions apply at once.
    pub role: String,
    /// Expiration Time (exp), seconds since the epoch.
    pub exp: usize,
    /// Issued At (iat).
    pub iat: usize,
}

/// issue_session
///
/// Signs a session token for `user`, valid for `config.session_max_age_secs`.
pub fn issue_session(user: &User, config: &AppConfig) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp().max(0) as usize;
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        name: user.name.clone(),
        role: user.role.clone(),
        iat: now,
        exp: now + config.session_max_age_secs as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.auth_secret.as_bytes()),
    )
}

/// decode_session_token
///
/// Verifies signature and expiry. Every failure is folded into `None`.
pub fn decode_session_token(token: &str, config: &AppConfig) -> Option<Claims> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    // Expiry is exact; sessions do not get a grace period.
    validation.leeway = 0;

    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.auth_secret.as_bytes()),
        &validation,
    ) {
        Ok(data) => Some(data.claims),
        Err(e) => {
            tracing::debug!(error = ?e.kind(), "rejected session token");
            None
        }
    }
}

/// resolve_session
///
/// Turns an incoming request into an optional `Session`. It never fails:
/// missing, malformed, expired or orphaned tokens all resolve to `None`.
///
/// Order:
/// 1. `Env::Local` only: an `x-user-id` header naming an existing user.
/// 2. The session cookie, falling back to an `Authorization: Bearer` header.
/// 3. The token's subject must still exist; its stored role is authoritative.
pub async fn resolve_session(
    headers: &HeaderMap,
    config: &AppConfig,
    repo: &RepositoryState,
) -> Option<Session> {
    if config.env == Env::Local {
        if let Some(user_id) = headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|id| Uuid::parse_str(id).ok())
        {
            if let Some(user) = repo.get_user(user_id).await {
                return Some(session_for(&user, None));
            }
        }
    }

    let token = extract_session_token(headers)?;
    let claims = decode_session_token(&token, config)?;
    let user = repo.get_user(claims.sub).await?;
    let expires_at = DateTime::<Utc>::from_timestamp(claims.exp as i64, 0);
    Some(session_for(&user, expires_at))
}

fn session_for(user: &User, expires_at: Option<DateTime<Utc>>) -> Session {
    Session {
        user_id: user.id,
        email: user.email.clone(),
        name: user.name.clone(),
        role: user.role(),
        expires_at,
    }
}

/// Builds the `HttpOnly` session cookie.
pub fn session_cookie(token: &str, config: &AppConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    build_cookie(SESSION_COOKIE_NAME, token, "/", config.session_max_age_secs, config)
}

/// Expires the session cookie immediately.
pub fn clear_session_cookie(config: &AppConfig) -> HeaderValue {
    clear_cookie(SESSION_COOKIE_NAME, "/", config)
}

pub(crate) fn build_cookie(
    name: &str,
    value: &str,
    path: &str,
    max_age_secs: u64,
    config: &AppConfig,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{name}={value}; Path={path}; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}");
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn clear_cookie(name: &str, path: &str, config: &AppConfig) -> HeaderValue {
    build_cookie(name, "", path, 0, config)
        .unwrap_or_else(|_| HeaderValue::from_static("invalid=; Max-Age=0"))
}

/// Reads a cookie value by name from the `Cookie` header(s).
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    read_cookie(headers, SESSION_COOKIE_NAME).or_else(|| extract_bearer_token(headers))
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.trim().strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// AuthUser Extractor Result
///
/// Resolved identity of an authenticated API request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    /// `None` for roles this service does not recognize.
    pub role: Option<Role>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }
}

impl From<Session> for AuthUser {
    fn from(session: Session) -> Self {
        Self {
            id: session.user_id,
            email: session.email,
            name: session.name,
            role: session.role,
        }
    }
}

/// AuthUser Extractor Implementation
///
/// Resolves the session through `resolve_session`.
/// Rejection: `StatusCode::UNAUTHORIZED` (401) when no session resolves.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        resolve_session(&parts.headers, &config, &repo)
            .await
            .map(AuthUser::from)
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

/// MaybeSession
///
/// Optional identity for public handlers that behave differently when signed in.
#[derive(Debug, Clone)]
pub struct MaybeSession(pub Option<Session>);

impl<S> FromRequestParts<S> for MaybeSession
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);
        Ok(MaybeSession(
            resolve_session(&parts.headers, &config, &repo).await,
        ))
    }
}
