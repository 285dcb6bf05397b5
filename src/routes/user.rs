use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// User Router Module
///
/// Pages for any signed-in user. Anonymous requests never get here: the gate
/// redirects them to `/auth?callbackUrl=..` first.
pub fn user_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /user?verified=1|denied=1
        .route("/user", get(handlers::get_user_home))
        // GET /user/settings
        // Linked providers, used by the "Connect Google" button.
        .route("/user/settings", get(handlers::get_user_settings))
}
