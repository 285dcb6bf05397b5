use auth_starter::{
    models::{NewUser, Role, VerificationToken},
    repository::{InMemoryRepository, Repository, is_unique_violation},
};
use chrono::{Duration, Utc};
use tokio::test;

// --- Test Data Helpers ---

async fn create_test_user(repo: &InMemoryRepository, email: &str, role: Role) -> uuid::Uuid {
    repo.create_user(NewUser {
        email: email.to_string(),
        role,
        ..NewUser::default()
    })
    .await
    .expect("user insert")
    .id
}

// --- Users ---

#[test]
async fn test_duplicate_email_is_rejected() {
    let repo = InMemoryRepository::new();
    create_test_user(&repo, "ada@example.com", Role::User).await;

    let duplicate = repo
        .create_user(NewUser {
            email: "ada@example.com".to_string(),
            ..NewUser::default()
        })
        .await;
    assert!(is_unique_violation(&duplicate.unwrap_err()));
    assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
}

#[test]
async fn test_mark_email_verified() {
    let repo = InMemoryRepository::new();
    let id = create_test_user(&repo, "ada@example.com", Role::User).await;

    assert!(repo.mark_email_verified("nobody@example.com").await.unwrap().is_none());

    let verified = repo
        .mark_email_verified("ada@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(verified.id, id);
    assert!(repo.get_user(id).await.unwrap().is_verified());
}

#[test]
async fn test_overview_and_listing() {
    let repo = InMemoryRepository::new();
    create_test_user(&repo, "a@example.com", Role::User).await;
    create_test_user(&repo, "b@example.com", Role::Admin).await;
    repo.mark_email_verified("a@example.com").await.unwrap();

    let overview = repo.get_overview().await;
    assert_eq!(overview.total_users, 2);
    assert_eq!(overview.verified_users, 1);
    assert_eq!(overview.admins, 1);
    assert_eq!(repo.list_users().await.len(), 2);
}

// --- OAuth Accounts ---

#[test]
async fn test_account_linking_is_unique_per_provider_identity() {
    let repo = InMemoryRepository::new();
    let first = create_test_user(&repo, "a@example.com", Role::User).await;
    let second = create_test_user(&repo, "b@example.com", Role::User).await;

    repo.link_account(first, "google", "sub-1").await.unwrap();
    assert!(repo.link_account(second, "google", "sub-1").await.is_err());

    let found = repo.find_account("google", "sub-1").await.unwrap();
    assert_eq!(found.user_id, first);
    assert!(repo.find_account("github", "sub-1").await.is_none());
    assert_eq!(repo.list_accounts(first).await.len(), 1);
    assert!(repo.list_accounts(second).await.is_empty());
}

// --- Verification Tokens ---

#[test]
async fn test_verification_token_crud() {
    let repo = InMemoryRepository::new();
    let token = VerificationToken {
        identifier: "ada@example.com".to_string(),
        token: "abc".to_string(),
        expires: Utc::now() + Duration::minutes(30),
    };
    repo.create_verification_token(token.clone()).await.unwrap();
    assert!(repo.create_verification_token(token.clone()).await.is_err());

    assert_eq!(repo.find_verification_token("abc").await, Some(token));
    assert!(repo.delete_verification_token("abc").await.unwrap());
    assert!(!repo.delete_verification_token("abc").await.unwrap());
}

#[test]
async fn test_delete_tokens_for_identifier() {
    let repo = InMemoryRepository::new();
    for token in ["t1", "t2"] {
        repo.create_verification_token(VerificationToken {
            identifier: "ada@example.com".to_string(),
            token: token.to_string(),
            expires: Utc::now(),
        })
        .await
        .unwrap();
    }
    repo.create_verification_token(VerificationToken {
        identifier: "eve@example.com".to_string(),
        token: "t3".to_string(),
        expires: Utc::now(),
    })
    .await
    .unwrap();

    assert_eq!(repo.delete_verification_tokens_for("ada@example.com").await.unwrap(), 2);
    assert!(repo.find_verification_token("t3").await.is_some());
}
