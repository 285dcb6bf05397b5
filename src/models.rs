use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

// --- Roles ---

/// Role
///
/// RBAC role stored as `'USER'` or `'ADMIN'` in `users.role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    /// Returns `None` for any value other than the two known roles.
    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "USER" => Some(Role::User),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }
}

// --- Persistence Rows ---

/// User
///
/// Canonical identity record from the `users` table.
/// `password` is an Argon2 PHC string and stays `None` for OAuth-only accounts.
#[derive(Debug, Clone, FromRow, Default)]
pub struct User {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub email_verified: Option<DateTime<Utc>>,
    pub image: Option<String>,
    pub password: Option<String>,
    // Kept as text so unknown roles survive the round trip and are handled by the gate.
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> Option<Role> {
        Role::parse(&self.role)
    }

    pub fn is_verified(&self) -> bool {
        self.email_verified.is_some()
    }
}

/// NewUser
///
/// Insert payload for `Repository::create_user`.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub name: Option<String>,
    pub email: String,
    pub password: Option<String>,
    pub image: Option<String>,
    pub role: Role,
    pub email_verified: Option<DateTime<Utc>>,
}

/// Account
///
/// An OAuth identity linked to a local user (`accounts` table).
#[derive(Debug, Clone, FromRow, Default)]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub provider_account_id: String,
    pub created_at: DateTime<Utc>,
}

/// VerificationToken
///
/// Single-use email verification token (`verification_tokens` table).
/// `identifier` is the lower-cased email the token was issued for.
#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct VerificationToken {
    pub identifier: String,
    pub token: String,
    pub expires: DateTime<Utc>,
}

// --- Request Payloads ---

/// SignUpRequest
///
/// Body of `POST /auth/sign-up`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SignUpRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

/// SignInRequest
///
/// Body of `POST /auth/sign-in`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SignInRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// SignOutRequest
///
/// Optional body of `POST /auth/sign-out`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SignOutRequest {
    pub redirect_to: Option<String>,
}

/// VerifyQuery
///
/// Query of the email verification link (`/verify?email=..&token=..`).
#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
pub struct VerifyQuery {
    pub email: Option<String>,
    pub token: Option<String>,
}

// --- Response Schemas ---

/// Field name -> list of messages. Form-wide errors live under `_form`.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// FormState
///
/// Uniform result of every auth form endpoint.
/// `version` is a millisecond timestamp so clients can tell consecutive submissions apart.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct FormState {
    pub success: bool,
    #[ts(type = "number")]
    pub version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, String>>,
}

impl FormState {
    pub fn ok() -> Self {
        Self {
            success: true,
            version: Utc::now().timestamp_millis(),
            errors: None,
            fields: None,
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.into());
        self
    }

    pub fn failed(errors: FieldErrors) -> Self {
        Self {
            success: false,
            version: Utc::now().timestamp_millis(),
            errors: Some(errors),
            fields: None,
        }
    }

    /// A failure carrying a single form-wide message.
    pub fn form_error(message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert("_form".to_string(), vec![message.into()]);
        Self::failed(errors)
    }
}

/// UserProfile
///
/// Public view of a `User`; never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
    pub role: String,
    pub email_verified: bool,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            image: user.image.clone(),
            role: user.role.clone(),
            email_verified: user.is_verified(),
        }
    }
}

/// UserHome
///
/// Payload of `GET /user`. `verified` and `denied` echo the one-shot hints
/// set by the verification flow and the admin gate.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserHome {
    pub profile: UserProfile,
    pub verified: bool,
    pub denied: bool,
}

/// UserSettings
///
/// Payload of `GET /user/settings`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserSettings {
    pub linked_providers: Vec<String>,
    pub has_password: bool,
}

/// AdminOverview
///
/// Payload of `GET /admin`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AdminOverview {
    #[ts(type = "number")]
    pub total_users: i64,
    #[ts(type = "number")]
    pub verified_users: i64,
    #[ts(type = "number")]
    pub admins: i64,
}

/// AuthPage
///
/// Payload of `GET /auth`: what the login screen needs to render.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AuthPage {
    pub callback_url: Option<String>,
    pub error: Option<String>,
    pub verify_error: bool,
    pub providers: Vec<String>,
}

/// AppSettings
///
/// Project identity served at `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq, Eq)]
#[ts(export)]
pub struct AppSettings {
    pub name: String,
    pub slogan: String,
    /// Text direction, `ltr` or `rtl`.
    pub dir: String,
    pub language: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "My Rust Starter".to_string(),
            slogan: "Build fast. Ship polished.".to_string(),
            dir: "ltr".to_string(),
            language: "en".to_string(),
        }
    }
}

/// SessionSummary
///
/// Redacted session view returned by the debug endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SessionSummary {
    pub id: Uuid,
    pub email: String,
    pub role: Option<Role>,
    #[ts(type = "string | null")]
    pub expires: Option<DateTime<Utc>>,
}
