use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// Routes exclusively for the `ADMIN` role. The gate sends signed-in
/// non-admins to `/user?denied=1`; each handler repeats the role check and
/// answers 403 if reached some other way.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin
        // User counters for the dashboard.
        .route("/admin", get(handlers::get_admin_overview))
        // GET /admin/users
        .route("/admin/users", get(handlers::get_admin_users))
}
