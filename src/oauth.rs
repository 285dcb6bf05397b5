use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

use crate::{
    config::AppConfig,
    gate::Session,
    models::{NewUser, Role, User},
    repository::Repository,
    validation::normalize_email,
};

pub const GOOGLE_PROVIDER_ID: &str = "google";
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";
pub const GOOGLE_CALLBACK_PATH: &str = "/auth/google/callback";

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const GOOGLE_SCOPE: &str = "openid email profile";

/// OAuthError
///
/// Failure codes surfaced to the login page as `/auth?error=<code>`.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("OAuth provider is not configured")]
    Unavailable,
    #[error("OAuth state mismatch")]
    StateMismatch,
    #[error("email already belongs to an account that is not linked to this provider")]
    AccountNotLinked,
    #[error("provider did not return a verified email")]
    EmailMissing,
    #[error("provider request failed: {0}")]
    Provider(#[from] reqwest::Error),
    #[error("provider rejected the request with status {0}")]
    Rejected(u16),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("could not issue a session")]
    Session,
}

impl OAuthError {
    pub fn code(&self) -> &'static str {
        match self {
            OAuthError::Unavailable => "OAuthUnavailable",
            OAuthError::StateMismatch => "OAuthStateMismatch",
            OAuthError::AccountNotLinked => "OAuthAccountNotLinked",
            OAuthError::EmailMissing
            | OAuthError::Provider(_)
            | OAuthError::Rejected(_) => "OAuthCallback",
            OAuthError::Storage(_) | OAuthError::Session => "Callback",
        }
    }

    /// Where the browser goes after this failure.
    pub fn login_redirect(&self) -> String {
        format!("{}?error={}", crate::gate::LOGIN_PATH, self.code())
    }
}

/// OAuthProfile
///
/// The identity facts a provider hands back after a successful code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthProfile {
    pub provider_account_id: String,
    pub email: String,
    pub email_verified: bool,
    pub name: Option<String>,
    pub image: Option<String>,
}

/// OAuthProvider
///
/// Authorization-code flow against one identity provider.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn provider_id(&self) -> &'static str;
    fn authorize_url(&self, state: &str) -> String;
    async fn exchange(&self, code: &str) -> Result<OAuthProfile, OAuthError>;
}

pub type OAuthState = Arc<dyn OAuthProvider>;

/// GoogleProvider
///
/// Google OpenID Connect over plain `reqwest` calls.
pub struct GoogleProvider {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl GoogleProvider {
    pub fn new(client_id: &str, client_secret: &str, app_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: format!("{}{GOOGLE_CALLBACK_PATH}", app_url.trim_end_matches('/')),
        }
    }

    /// Builds the provider when both credentials are configured.
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        match (&config.google_client_id, &config.google_client_secret) {
            (Some(id), Some(secret)) => Some(Self::new(id, secret, &config.app_url)),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
    picture: Option<String>,
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn provider_id(&self) -> &'static str {
        GOOGLE_PROVIDER_ID
    }

    fn authorize_url(&self, state: &str) -> String {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", GOOGLE_SCOPE),
            ("state", state),
            ("prompt", "select_account"),
        ];
        match Url::parse_with_params(GOOGLE_AUTH_URL, &params) {
            Ok(url) => url.to_string(),
            Err(_) => GOOGLE_AUTH_URL.to_string(),
        }
    }

    async fn exchange(&self, code: &str) -> Result<OAuthProfile, OAuthError> {
        let response = self
            .client
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(OAuthError::Rejected(response.status().as_u16()));
        }
        let token: TokenResponse = response.json().await?;

        let response = self
            .client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(OAuthError::Rejected(response.status().as_u16()));
        }
        let info: GoogleUserInfo = response.json().await?;

        let email = info.email.ok_or(OAuthError::EmailMissing)?;
        Ok(OAuthProfile {
            provider_account_id: info.sub,
            email,
            email_verified: info.email_verified,
            name: info.name,
            image: info.picture,
        })
    }
}

/// resolve_oauth_user
///
/// Maps a provider identity onto a local user:
/// 1. an already linked account signs in its owner;
/// 2. a signed-in caller gets the account linked to them;
/// 3. an existing, unlinked email is refused rather than silently merged;
/// 4. otherwise a verified `USER` without a password is created and linked.
pub async fn resolve_oauth_user(
    repo: &dyn Repository,
    provider_id: &str,
    profile: OAuthProfile,
    current: Option<&Session>,
) -> Result<User, OAuthError> {
    if let Some(account) = repo
        .find_account(provider_id, &profile.provider_account_id)
        .await
    {
        if let Some(user) = repo.get_user(account.user_id).await {
            return Ok(user);
        }
    }

    if let Some(session) = current {
        if let Some(user) = repo.get_user(session.user_id).await {
            repo.link_account(user.id, provider_id, &profile.provider_account_id)
                .await?;
            tracing::info!(user_id = %user.id, provider = provider_id, "linked oauth account");
            return Ok(user);
        }
    }

    if !profile.email_verified {
        return Err(OAuthError::EmailMissing);
    }

    let email = normalize_email(&profile.email);
    if repo.find_user_by_email(&email).await.is_some() {
        return Err(OAuthError::AccountNotLinked);
    }

    let user = repo
        .create_user(NewUser {
            name: profile.name,
            email,
            password: None,
            image: profile.image,
            role: Role::User,
            email_verified: Some(Utc::now()),
        })
        .await?;
    repo.link_account(user.id, provider_id, &profile.provider_account_id)
        .await?;
    tracing::info!(user_id = %user.id, provider = provider_id, "created user from oauth profile");
    Ok(user)
}

/// MockOAuthProvider
///
/// Hands back a fixed profile for any code except `"bad"`.
pub struct MockOAuthProvider {
    pub profile: OAuthProfile,
}

#[async_trait]
impl OAuthProvider for MockOAuthProvider {
    fn provider_id(&self) -> &'static str {
        GOOGLE_PROVIDER_ID
    }

    fn authorize_url(&self, state: &str) -> String {
        format!("https://oauth.test/authorize?state={state}")
    }

    async fn exchange(&self, code: &str) -> Result<OAuthProfile, OAuthError> {
        if code == "bad" {
            return Err(OAuthError::Rejected(400));
        }
        Ok(self.profile.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;

    fn profile(email: &str) -> OAuthProfile {
        OAuthProfile {
            provider_account_id: "google-123".to_string(),
            email: email.to_string(),
            email_verified: true,
            name: Some("Ada".to_string()),
            image: None,
        }
    }

    #[test]
    fn authorize_url_carries_state_and_scope() {
        let google = GoogleProvider::new("cid", "secret", "http://localhost:3000/");
        let url = google.authorize_url("xyz");
        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("state=xyz"));
        assert!(url.contains("scope=openid+email+profile"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fauth%2Fgoogle%2Fcallback"));
    }

    #[tokio::test]
    async fn new_identity_creates_verified_user() {
        let repo = InMemoryRepository::new();
        let user = resolve_oauth_user(&repo, "google", profile("Ada@Example.com"), None)
            .await
            .unwrap();
        assert_eq!(user.email, "ada@example.com");
        assert!(user.is_verified());
        assert!(user.password.is_none());

        // Second round resolves through the linked account.
        let again = resolve_oauth_user(&repo, "google", profile("ada@example.com"), None)
            .await
            .unwrap();
        assert_eq!(again.id, user.id);
    }

    #[tokio::test]
    async fn existing_unlinked_email_is_refused() {
        let repo = InMemoryRepository::new();
        repo.create_user(NewUser {
            email: "ada@example.com".to_string(),
            password: Some("hash".to_string()),
            ..NewUser::default()
        })
        .await
        .unwrap();

        let err = resolve_oauth_user(&repo, "google", profile("ada@example.com"), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "OAuthAccountNotLinked");
    }

    #[tokio::test]
    async fn signed_in_caller_gets_account_linked() {
        let repo = InMemoryRepository::new();
        let owner = repo
            .create_user(NewUser {
                email: "owner@example.com".to_string(),
                ..NewUser::default()
            })
            .await
            .unwrap();
        let session = Session {
            user_id: owner.id,
            email: owner.email.clone(),
            name: None,
            role: Some(Role::User),
            expires_at: None,
        };

        let user = resolve_oauth_user(&repo, "google", profile("other@gmail.com"), Some(&session))
            .await
            .unwrap();
        assert_eq!(user.id, owner.id);
        assert_eq!(repo.list_accounts(owner.id).await.len(), 1);
    }
}
