use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::models::{FieldErrors, FormState};

/// AuthError
///
/// Every way a sign-up or sign-in attempt can fail. The `Display` text is the
/// message shown to the user under `_form`.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid input")]
    Validation(FieldErrors),
    #[error("User already exists")]
    UserExists,
    #[error("No account found with this email")]
    UnknownAccount,
    #[error("You signed up but your email is not verified yet. Please check your inbox.")]
    EmailNotVerified,
    #[error("This account uses a different sign-in method.")]
    OAuthOnlyAccount,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Could not send the verification email. Check SMTP settings.")]
    EmailDelivery(#[from] crate::email::EmailError),
    #[error("Sign-in failed")]
    Session(#[from] jsonwebtoken::errors::Error),
    #[error("Sign-in failed")]
    Cookie(#[from] axum::http::header::InvalidHeaderValue),
    #[error("Unexpected error")]
    Storage(#[from] sqlx::Error),
    #[error("Unexpected error")]
    PasswordHash,
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AuthError::UserExists => StatusCode::CONFLICT,
            AuthError::UnknownAccount
            | AuthError::OAuthOnlyAccount
            | AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::EmailNotVerified => StatusCode::FORBIDDEN,
            AuthError::EmailDelivery(_) => StatusCode::BAD_GATEWAY,
            AuthError::Session(_)
            | AuthError::Cookie(_)
            | AuthError::Storage(_)
            | AuthError::PasswordHash => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Field errors pass through untouched; everything else becomes a `_form` message.
    pub fn into_form_state(self) -> FormState {
        match self {
            AuthError::Validation(errors) => FormState::failed(errors),
            other => FormState::form_error(other.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AuthError::EmailDelivery(e) => tracing::error!(error = %e, "verification email failed"),
            AuthError::Session(e) => tracing::error!(error = %e, "session signing failed"),
            AuthError::Cookie(e) => tracing::error!(error = %e, "session cookie rejected"),
            AuthError::Storage(e) => tracing::error!(error = ?e, "auth storage error"),
            AuthError::PasswordHash => tracing::error!("password hashing failed"),
            _ => {}
        }
        (status, Json(self.into_form_state())).into_response()
    }
}
