use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session. The gate classifies these paths as
/// public, so they never redirect to the login page.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /
        // Project identity (name, slogan, text direction, language).
        .route("/", get(handlers::get_app_settings))
        // GET /api/health
        // Liveness probe for load balancers.
        .route("/api/health", get(|| async { "ok" }))
        // --- Credentials ---
        .route("/auth", get(handlers::get_auth_page))
        .route("/auth/sign-up", post(handlers::sign_up))
        .route("/auth/sign-in", post(handlers::sign_in))
        .route("/auth/sign-out", post(handlers::sign_out))
        // GET /verify?email=..&token=..
        // Emailed link; `/api/verify` is the same flow for API clients.
        .route("/verify", get(handlers::verify_email))
        .route("/api/verify", get(handlers::verify_email))
        // GET /api/auth/clear-session
        // Escape hatch for a stale cookie that no longer decodes.
        .route("/api/auth/clear-session", get(handlers::clear_session))
        // --- Google OAuth ---
        .route("/auth/google", get(handlers::google_sign_in))
        .route("/auth/google/callback", get(handlers::google_callback))
}
