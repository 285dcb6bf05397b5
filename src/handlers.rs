use crate::{
    AppState,
    auth::{
        self, AuthUser, MaybeSession, SESSION_COOKIE_NAME, clear_session_cookie, issue_session,
        read_cookie, resolve_session, session_cookie,
    },
    error::AuthError,
    gate::{GateDecision, LOGIN_PATH, USER_HOME},
    models::{
        AdminOverview, AppSettings, AuthPage, FormState, NewUser, Role, SessionSummary,
        SignInRequest, SignOutRequest, SignUpRequest, UserHome, UserProfile, UserSettings,
        VerifyQuery,
    },
    oauth::{self, OAUTH_STATE_COOKIE, OAuthError},
    password::{hash_password, verify_password},
    repository::is_unique_violation,
    tokens::{self, create_email_verification_token},
    validation::{validate_sign_in, validate_sign_up, validate_verify_email},
};
use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use url::form_urlencoded;

const VERIFY_ERROR_REDIRECT: &str = "/auth?verify_error=1";
const VERIFIED_REDIRECT: &str = "/user?verified=1";
const OAUTH_STATE_PATH: &str = "/auth/google";
const OAUTH_STATE_MAX_AGE_SECS: u64 = 600;

// --- Query Structs ---

/// AuthPageQuery
///
/// Query parameters the login page understands (`/auth?callbackUrl=..&error=..`).
#[derive(Deserialize, utoipa::IntoParams)]
pub struct AuthPageQuery {
    #[serde(rename = "callbackUrl")]
    pub callback_url: Option<String>,
    pub error: Option<String>,
    pub verify_error: Option<String>,
}

/// HintQuery
///
/// One-shot flags echoed on `/user` after verification or an admin denial.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct HintQuery {
    pub verified: Option<String>,
    pub denied: Option<String>,
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct DebugSessionQuery {
    /// Optional path to run through the gate with the current session.
    pub path: Option<String>,
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

fn flag(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| v == "1" || v == "true")
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

// --- Credentials Flows ---

/// sign_up
///
/// [Public Route] Registers a credentials account and mails the verification link.
/// The account stays unverified, and cannot sign in, until the link is followed.
#[utoipa::path(
    post,
    path = "/auth/sign-up",
    request_body = SignUpRequest,
    responses(
        (status = 200, description = "Created; `fields.userId` set", body = FormState),
        (status = 409, description = "User already exists", body = FormState),
        (status = 422, description = "Validation failed", body = FormState),
        (status = 502, description = "Verification email could not be sent", body = FormState)
    )
)]
pub async fn sign_up(
    State(state): State<AppState>,
    Json(payload): Json<SignUpRequest>,
) -> Result<Json<FormState>, AuthError> {
    let input = validate_sign_up(&payload).map_err(|errors| {
        tracing::warn!(fields = ?errors.keys().collect::<Vec<_>>(), "sign-up validation failed");
        AuthError::Validation(errors)
    })?;

    if state.repo.find_user_by_email(&input.email).await.is_some() {
        tracing::warn!(email = %input.email, "sign-up for existing user");
        return Err(AuthError::UserExists);
    }

    let hashed = hash_password(&input.password).map_err(|_| AuthError::PasswordHash)?;
    let user = state
        .repo
        .create_user(NewUser {
            name: Some(input.name),
            email: input.email.clone(),
            password: Some(hashed),
            image: None,
            role: Role::User,
            email_verified: None,
        })
        .await
        .map_err(|e| {
            // A concurrent sign-up can win between the lookup and the insert.
            if is_unique_violation(&e) {
                tracing::warn!(email = %input.email, "sign-up lost race to existing user");
                AuthError::UserExists
            } else {
                AuthError::Storage(e)
            }
        })?;
    tracing::info!(user_id = %user.id, "user created");

    let issued = create_email_verification_token(
        state.repo.as_ref(),
        &input.email,
        state.config.verify_token_ttl_minutes,
    )
    .await?;
    let verify_url = format!(
        "{}/verify?email={}&token={}",
        state.config.app_url,
        encode(&input.email),
        encode(&issued.token)
    );

    state
        .mailer
        .send_verification_link(&state.config.email_from, &input.email, &verify_url)
        .await?;
    tracing::info!(user_id = %user.id, "verification email sent");

    Ok(Json(FormState::ok().with_field("userId", user.id.to_string())))
}

/// sign_in
///
/// [Public Route] Credentials sign-in. Checks run in a fixed order so the user
/// always gets the most specific reason: unknown email, unverified email,
/// OAuth-only account, then wrong password.
#[utoipa::path(
    post,
    path = "/auth/sign-in",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in; session cookie set", body = FormState),
        (status = 401, description = "Rejected", body = FormState),
        (status = 403, description = "Email not verified", body = FormState),
        (status = 422, description = "Validation failed", body = FormState)
    )
)]
pub async fn sign_in(
    State(state): State<AppState>,
    Json(payload): Json<SignInRequest>,
) -> Result<Response, AuthError> {
    let input = validate_sign_in(&payload).map_err(AuthError::Validation)?;

    let Some(user) = state.repo.find_user_by_email(&input.email).await else {
        tracing::warn!(email = %input.email, "sign-in for unknown email");
        return Err(AuthError::UnknownAccount);
    };
    if !user.is_verified() {
        tracing::warn!(user_id = %user.id, "sign-in before email verification");
        return Err(AuthError::EmailNotVerified);
    }
    let Some(stored_hash) = user.password.as_deref() else {
        tracing::warn!(user_id = %user.id, "password sign-in for oauth-only account");
        return Err(AuthError::OAuthOnlyAccount);
    };
    if !verify_password(&input.password, stored_hash) {
        tracing::warn!(user_id = %user.id, "invalid password");
        return Err(AuthError::InvalidCredentials);
    }

    let token = issue_session(&user, &state.config)?;
    let cookie = session_cookie(&token, &state.config)?;
    tracing::info!(user_id = %user.id, "signed in");

    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(FormState::ok().with_field("redirectTo", USER_HOME)),
    )
        .into_response())
}

/// sign_out
///
/// [Public Route] Clears the session cookie. The optional body may name a
/// same-site `redirectTo`; anything else falls back to `/auth`.
#[utoipa::path(
    post,
    path = "/auth/sign-out",
    request_body(content = SignOutRequest, description = "Optional"),
    responses((status = 200, description = "Signed out", body = FormState))
)]
pub async fn sign_out(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let redirect_to = serde_json::from_slice::<SignOutRequest>(&body)
        .ok()
        .and_then(|request| request.redirect_to)
        .filter(|target| target.starts_with('/') && !target.starts_with("//"))
        .unwrap_or_else(|| LOGIN_PATH.to_string());

    (
        AppendHeaders([(SET_COOKIE, clear_session_cookie(&state.config))]),
        Json(FormState::ok().with_field("redirectTo", redirect_to)),
    )
}

/// verify_email
///
/// [Public Route] Target of the emailed link. Consumes the token, marks the
/// email verified and signs the user straight in.
#[utoipa::path(
    get,
    path = "/verify",
    params(VerifyQuery),
    responses(
        (status = 303, description = "To /user?verified=1 on success, /auth?verify_error=1 otherwise")
    )
)]
pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let (Some(email), Some(token)) = (query.email, query.token) else {
        return Redirect::to(VERIFY_ERROR_REDIRECT).into_response();
    };
    let Ok(input) = validate_verify_email(&email, &token) else {
        return Redirect::to(VERIFY_ERROR_REDIRECT).into_response();
    };

    match complete_verification(&state, &input.email, &input.token).await {
        Ok(Some(cookie)) => (
            AppendHeaders([(SET_COOKIE, cookie)]),
            Redirect::to(VERIFIED_REDIRECT),
        )
            .into_response(),
        Ok(None) => {
            tracing::warn!(email = %input.email, "invalid or expired verification token");
            Redirect::to(VERIFY_ERROR_REDIRECT).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "verification failed");
            Redirect::to(VERIFY_ERROR_REDIRECT).into_response()
        }
    }
}

/// Returns the new session cookie, or `None` when the token does not check out.
async fn complete_verification(
    state: &AppState,
    email: &str,
    token: &str,
) -> Result<Option<axum::http::HeaderValue>, AuthError> {
    if !tokens::consume_email_verification_token(state.repo.as_ref(), email, token).await? {
        return Ok(None);
    }
    let Some(user) = state.repo.mark_email_verified(email).await? else {
        return Ok(None);
    };
    tracing::info!(user_id = %user.id, "email verified");

    let session = issue_session(&user, &state.config)?;
    Ok(Some(session_cookie(&session, &state.config)?))
}

/// clear_session
///
/// [Public Route] Drops a stale or broken session cookie and returns to the login page.
#[utoipa::path(
    get,
    path = "/api/auth/clear-session",
    responses((status = 303, description = "Cookie cleared; redirect to /auth"))
)]
pub async fn clear_session(State(state): State<AppState>) -> impl IntoResponse {
    (
        AppendHeaders([(SET_COOKIE, clear_session_cookie(&state.config))]),
        Redirect::to(LOGIN_PATH),
    )
}

/// debug_session
///
/// [Local Only] What the server sees for this request: the resolved session,
/// whether the cookie arrived, and optionally the gate's verdict for `?path=`.
/// The token value itself is never echoed.
#[utoipa::path(
    get,
    path = "/api/debug-session",
    params(DebugSessionQuery),
    responses((status = 200, description = "Session diagnostics"))
)]
pub async fn debug_session(
    State(state): State<AppState>,
    Query(query): Query<DebugSessionQuery>,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    let session = resolve_session(&headers, &state.config, &state.repo).await;
    let gate = query
        .path
        .as_deref()
        .map(|path| GateDecision::from(state.gate.decide(session.as_ref(), path)));
    let summary = session.map(|s| SessionSummary {
        id: s.user_id,
        email: s.email,
        role: s.role,
        expires: s.expires_at,
    });

    Json(serde_json::json!({
        "now": chrono::Utc::now().to_rfc3339(),
        "session": summary,
        "cookie": {
            "hasSessionToken": read_cookie(&headers, SESSION_COOKIE_NAME).is_some(),
        },
        "gate": gate,
    }))
}

// --- Pages ---

/// get_app_settings
///
/// [Public Route] Project identity for the landing page.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "App settings", body = AppSettings))
)]
pub async fn get_app_settings(State(state): State<AppState>) -> Json<AppSettings> {
    Json(state.config.app.clone())
}

/// get_auth_page
///
/// [Public Route] Everything the login screen needs: where to go afterwards,
/// any error code, and the available providers.
#[utoipa::path(
    get,
    path = "/auth",
    params(AuthPageQuery),
    responses((status = 200, description = "Login page state", body = AuthPage))
)]
pub async fn get_auth_page(
    State(state): State<AppState>,
    Query(query): Query<AuthPageQuery>,
) -> Json<AuthPage> {
    let mut providers = vec!["credentials".to_string()];
    if let Some(provider) = &state.oauth {
        providers.push(provider.provider_id().to_string());
    }

    Json(AuthPage {
        callback_url: query.callback_url,
        error: query.error,
        verify_error: flag(&query.verify_error),
        providers,
    })
}

/// get_user_home
///
/// [User Route] The caller's profile plus the one-shot `verified`/`denied` hints.
#[utoipa::path(
    get,
    path = "/user",
    params(HintQuery),
    responses(
        (status = 200, description = "Profile", body = UserHome),
        (status = 401, description = "No session")
    )
)]
pub async fn get_user_home(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Query(hints): Query<HintQuery>,
) -> Result<Json<UserHome>, StatusCode> {
    let user = state.repo.get_user(id).await.ok_or(StatusCode::UNAUTHORIZED)?;
    Ok(Json(UserHome {
        profile: UserProfile::from(&user),
        verified: flag(&hints.verified),
        denied: flag(&hints.denied),
    }))
}

/// get_user_settings
///
/// [User Route] Linked OAuth providers and whether a password is set.
#[utoipa::path(
    get,
    path = "/user/settings",
    responses(
        (status = 200, description = "Settings", body = UserSettings),
        (status = 401, description = "No session")
    )
)]
pub async fn get_user_settings(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserSettings>, StatusCode> {
    let user = state.repo.get_user(id).await.ok_or(StatusCode::UNAUTHORIZED)?;
    let linked_providers = state
        .repo
        .list_accounts(id)
        .await
        .into_iter()
        .map(|account| account.provider)
        .collect();

    Ok(Json(UserSettings {
        linked_providers,
        has_password: user.password.is_some(),
    }))
}

/// get_admin_overview
///
/// [Admin Route] User counters for the dashboard.
///
/// *Authorization*: The gate already bounces non-admins; the role is checked again here.
#[utoipa::path(
    get,
    path = "/admin",
    responses(
        (status = 200, description = "Overview", body = AdminOverview),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn get_admin_overview(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<AdminOverview>, StatusCode> {
    if !user.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(Json(state.repo.get_overview().await))
}

/// get_admin_users
///
/// [Admin Route] Every user, newest first, without password hashes.
#[utoipa::path(
    get,
    path = "/admin/users",
    responses(
        (status = 200, description = "Users", body = [UserProfile]),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn get_admin_users(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<UserProfile>>, StatusCode> {
    if !user.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }
    let users = state.repo.list_users().await;
    Ok(Json(users.iter().map(UserProfile::from).collect()))
}

// --- Google OAuth ---

/// google_sign_in
///
/// [Public Route] Starts the authorization-code flow. A random state is pinned
/// in a short-lived cookie scoped to the callback path.
#[utoipa::path(
    get,
    path = "/auth/google",
    responses((status = 303, description = "Redirect to the provider consent screen"))
)]
pub async fn google_sign_in(State(state): State<AppState>) -> Response {
    let Some(provider) = &state.oauth else {
        return Redirect::to(&OAuthError::Unavailable.login_redirect()).into_response();
    };

    let oauth_state = tokens::generate_token();
    let cookie = match auth::build_cookie(
        OAUTH_STATE_COOKIE,
        &oauth_state,
        OAUTH_STATE_PATH,
        OAUTH_STATE_MAX_AGE_SECS,
        &state.config,
    ) {
        Ok(cookie) => cookie,
        Err(e) => {
            tracing::error!(error = %e, "could not build oauth state cookie");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    (
        AppendHeaders([(SET_COOKIE, cookie)]),
        Redirect::to(&provider.authorize_url(&oauth_state)),
    )
        .into_response()
}

/// google_callback
///
/// [Public Route] Provider redirect target. Verifies the state, exchanges the
/// code, maps the identity onto a local user and signs them in.
#[utoipa::path(
    get,
    path = "/auth/google/callback",
    params(OAuthCallbackQuery),
    responses((status = 303, description = "To /user on success, /auth?error=<code> otherwise"))
)]
pub async fn google_callback(
    State(state): State<AppState>,
    MaybeSession(current): MaybeSession,
    Query(query): Query<OAuthCallbackQuery>,
    headers: HeaderMap,
) -> Response {
    let clear_state = auth::clear_cookie(OAUTH_STATE_COOKIE, OAUTH_STATE_PATH, &state.config);

    match finish_oauth(&state, current.as_ref(), &query, &headers).await {
        Ok(session) => (
            AppendHeaders([(SET_COOKIE, clear_state), (SET_COOKIE, session)]),
            Redirect::to(USER_HOME),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, code = e.code(), "oauth sign-in failed");
            (
                AppendHeaders([(SET_COOKIE, clear_state)]),
                Redirect::to(&e.login_redirect()),
            )
                .into_response()
        }
    }
}

async fn finish_oauth(
    state: &AppState,
    current: Option<&crate::gate::Session>,
    query: &OAuthCallbackQuery,
    headers: &HeaderMap,
) -> Result<axum::http::HeaderValue, OAuthError> {
    let provider = state.oauth.as_ref().ok_or(OAuthError::Unavailable)?;

    let expected = read_cookie(headers, OAUTH_STATE_COOKIE);
    if expected.is_none() || expected != query.state {
        return Err(OAuthError::StateMismatch);
    }
    if let Some(error) = &query.error {
        tracing::warn!(provider_error = %error, "provider returned an error");
        return Err(OAuthError::Rejected(StatusCode::BAD_REQUEST.as_u16()));
    }
    let code = query
        .code
        .as_deref()
        .ok_or(OAuthError::Rejected(StatusCode::BAD_REQUEST.as_u16()))?;

    let profile = provider.exchange(code).await?;
    let user =
        oauth::resolve_oauth_user(state.repo.as_ref(), provider.provider_id(), profile, current)
            .await?;

    let token = issue_session(&user, &state.config).map_err(|e| {
        tracing::error!(error = %e, "session signing failed");
        OAuthError::Session
    })?;
    tracing::info!(user_id = %user.id, provider = provider.provider_id(), "signed in with oauth");
    session_cookie(&token, &state.config).map_err(|_| OAuthError::Session)
}
