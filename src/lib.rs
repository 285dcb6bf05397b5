use axum::{
    Router,
    extract::{FromRef, Request, State},
    http::{HeaderName, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Request gate and session handling.
pub mod auth;
pub mod gate;

// Auth flows and their building blocks.
pub mod email;
pub mod error;
pub mod handlers;
pub mod oauth;
pub mod password;
pub mod tokens;
pub mod validation;

// Persistence, models and configuration.
pub mod config;
pub mod models;
pub mod repository;

// Route groups (public, user, admin).
pub mod routes;
use routes::{admin, public, user};

// --- Public Re-exports ---

pub use config::{AppConfig, Env};
pub use email::{EmailState, HttpEmailSender, LogEmailSender, MockEmailSender};
pub use gate::{Gate, GateMode};
pub use oauth::{GoogleProvider, OAuthState};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// Auto-generated OpenAPI document, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::sign_up, handlers::sign_in, handlers::sign_out, handlers::verify_email,
        handlers::clear_session, handlers::debug_session, handlers::get_app_settings,
        handlers::get_auth_page, handlers::get_user_home, handlers::get_user_settings,
        handlers::get_admin_overview, handlers::get_admin_users, handlers::google_sign_in,
        handlers::google_callback,
    ),
    components(
        schemas(
            models::Role, models::SignUpRequest, models::SignInRequest, models::SignOutRequest,
            models::FormState, models::UserProfile, models::UserHome, models::UserSettings,
            models::AdminOverview, models::AuthPage, models::AppSettings,
            models::SessionSummary, gate::GateDecision,
        )
    ),
    tags(
        (name = "auth-starter", description = "Role-gated authentication starter API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Shared, immutable service container handed to every request.
#[derive(Clone)]
pub struct AppState {
    /// Users, linked accounts and verification tokens.
    pub repo: RepositoryState,
    /// Outgoing mail (verification links).
    pub mailer: EmailState,
    /// Google OAuth, when credentials are configured.
    pub oauth: Option<OAuthState>,
    /// Path authorization rules.
    pub gate: Gate,
    pub config: AppConfig,
}

impl AppState {
    /// Assembles state with the gate mode taken from the configuration.
    pub fn new(
        repo: RepositoryState,
        mailer: EmailState,
        oauth: Option<OAuthState>,
        config: AppConfig,
    ) -> Self {
        Self {
            repo,
            mailer,
            oauth,
            gate: Gate::new(config.gate_mode),
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for EmailState {
    fn from_ref(app_state: &AppState) -> EmailState {
        app_state.mailer.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// gate_middleware
///
/// Runs every request through the `Gate` before routing. An allowed request
/// continues untouched; anything else gets a temporary redirect, either to the
/// login page with a `callbackUrl` or to the role's landing page.
async fn gate_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let session =
        auth::resolve_session(request.headers(), &state.config, &state.repo).await;
    let uri = request.uri();

    match state
        .gate
        .decide_request(session.as_ref(), uri.path(), uri.query())
    {
        gate::Action::Allow => next.run(request).await,
        gate::Action::RedirectTo(target) => {
            tracing::debug!(
                path = %uri.path(),
                user_id = ?session.as_ref().map(|s| s.user_id),
                redirect_to = %target,
                "gate redirect"
            );
            Redirect::temporary(&target).into_response()
        }
    }
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}

/// create_router
///
/// Assembles the routes, puts the gate in front of them and wraps everything
/// in the observability layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let mut app_routes = Router::new()
        .merge(public::public_routes())
        .merge(user::user_routes())
        .merge(admin::admin_routes());

    // Session diagnostics never ship outside local development.
    if state.config.env == Env::Local {
        app_routes = app_routes.route("/api/debug-session", get(handlers::debug_session));
    }

    let base_router = app_routes
        .fallback(not_found)
        // The gate sees every path, including ones no handler serves.
        .layer(middleware::from_fn_with_state(state.clone(), gate_middleware))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for `TraceLayer`: method, URI and the `x-request-id` set above, so every
/// log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
