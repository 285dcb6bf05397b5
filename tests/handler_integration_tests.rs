use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use auth_starter::{
    AppState, InMemoryRepository, MockEmailSender,
    auth::AuthUser,
    config::AppConfig,
    handlers::{self, HintQuery},
    models::{AdminOverview, NewUser, Role, User, UserHome, UserProfile},
    repository::RepositoryState,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::test;

// --- Helpers ---

fn create_test_state(repo: RepositoryState) -> AppState {
    AppState::new(
        repo,
        Arc::new(MockEmailSender::new()),
        None,
        AppConfig::default(),
    )
}

async fn seeded_repo() -> (RepositoryState, User, User) {
    let repo: RepositoryState = Arc::new(InMemoryRepository::new());
    let member = repo
        .create_user(NewUser {
            email: "member@example.com".to_string(),
            password: Some("$argon2id$not-a-real-hash".to_string()),
            email_verified: Some(Utc::now()),
            ..NewUser::default()
        })
        .await
        .unwrap();
    let admin = repo
        .create_user(NewUser {
            email: "admin@example.com".to_string(),
            role: Role::Admin,
            ..NewUser::default()
        })
        .await
        .unwrap();
    (repo, member, admin)
}

fn as_auth_user(user: &User) -> AuthUser {
    AuthUser {
        id: user.id,
        email: user.email.clone(),
        name: user.name.clone(),
        role: user.role(),
    }
}

async fn body_json<T: serde::de::DeserializeOwned>(response: impl IntoResponse) -> T {
    let (_parts, body) = response.into_response().into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// --- Admin Handlers ---

#[test]
async fn test_get_admin_overview_forbidden_for_user() {
    let (repo, member, _) = seeded_repo().await;
    let state = create_test_state(repo);

    let result = handlers::get_admin_overview(as_auth_user(&member), State(state)).await;

    assert_eq!(result.unwrap_err(), StatusCode::FORBIDDEN);
}

#[test]
async fn test_get_admin_overview_counts_users() {
    let (repo, _, admin) = seeded_repo().await;
    let state = create_test_state(repo);

    let result = handlers::get_admin_overview(as_auth_user(&admin), State(state)).await;
    let overview: AdminOverview = body_json(result.unwrap()).await;

    assert_eq!(
        overview,
        AdminOverview {
            total_users: 2,
            verified_users: 1,
            admins: 1,
        }
    );
}

#[test]
async fn test_get_admin_users_hides_password_hashes() {
    let (repo, member, admin) = seeded_repo().await;
    let state = create_test_state(repo);

    let denied = handlers::get_admin_users(as_auth_user(&member), State(state.clone())).await;
    assert_eq!(denied.unwrap_err(), StatusCode::FORBIDDEN);

    let result = handlers::get_admin_users(as_auth_user(&admin), State(state)).await;
    let (_parts, body) = result.unwrap().into_response().into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    let raw = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(!raw.contains("argon2"));

    let users: Vec<UserProfile> = serde_json::from_str(&raw).unwrap();
    assert_eq!(users.len(), 2);
}

#[test]
async fn test_unknown_role_is_not_admin() {
    let (repo, member, _) = seeded_repo().await;
    let state = create_test_state(repo);
    let mut caller = as_auth_user(&member);
    caller.role = None;

    let result = handlers::get_admin_overview(caller, State(state)).await;
    assert_eq!(result.unwrap_err(), StatusCode::FORBIDDEN);
}

// --- User Handlers ---

#[test]
async fn test_get_user_home_echoes_hints() {
    let (repo, member, _) = seeded_repo().await;
    let state = create_test_state(repo);

    let result = handlers::get_user_home(
        as_auth_user(&member),
        State(state),
        Query(HintQuery {
            verified: None,
            denied: Some("1".to_string()),
        }),
    )
    .await;
    let home: UserHome = body_json(result.unwrap()).await;

    assert_eq!(home.profile.email, "member@example.com");
    assert!(home.profile.email_verified);
    assert!(home.denied);
    assert!(!home.verified);
}

#[test]
async fn test_get_user_home_for_vanished_user() {
    let (repo, member, _) = seeded_repo().await;
    let state = create_test_state(Arc::new(InMemoryRepository::new()));
    drop(repo);

    let result = handlers::get_user_home(
        as_auth_user(&member),
        State(state),
        Query(HintQuery {
            verified: None,
            denied: None,
        }),
    )
    .await;
    assert_eq!(result.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[test]
async fn test_get_app_settings_defaults() {
    let (repo, _, _) = seeded_repo().await;
    let state = create_test_state(repo);
    let settings = handlers::get_app_settings(State(state)).await;
    assert_eq!(settings.0.language, "en");
}
