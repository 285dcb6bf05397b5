use auth_starter::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    email::{EmailState, HttpEmailSender, LogEmailSender},
    oauth::{GoogleProvider, OAuthState},
    repository::{InMemoryRepository, PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, sets up logging, wires the repository, mailer and OAuth
/// provider into `AppState`, and serves the router.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast on missing production secrets)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise a sensible local default.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "auth_starter=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Persistence: Postgres when configured, otherwise an in-process store.
    let repo: RepositoryState = match &config.db_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");
            Arc::new(PostgresRepository::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory repository");
            Arc::new(InMemoryRepository::new())
        }
    };

    // 4. Mail delivery
    let mailer: EmailState = match &config.email_api_url {
        Some(endpoint) => Arc::new(HttpEmailSender::new(
            endpoint,
            config.email_api_key.as_deref(),
        )),
        None => {
            tracing::warn!("EMAIL_API_URL not set; verification links are only logged");
            Arc::new(LogEmailSender)
        }
    };

    // 5. Google OAuth (optional)
    let oauth = GoogleProvider::from_config(&config).map(|google| Arc::new(google) as OAuthState);
    if oauth.is_none() {
        tracing::info!("Google OAuth disabled (GOOGLE_CLIENT_ID / GOOGLE_CLIENT_SECRET unset)");
    }

    tracing::info!(gate_mode = ?config.gate_mode, "request gate configured");

    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState::new(repo, mailer, oauth, config));

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind BIND_ADDR.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at: http://{}/swagger-ui", bind_addr);

    axum::serve(listener, app).await.expect("server error");
}
