//! Email verification tokens: creation and single-use consumption.

use chrono::{DateTime, Duration, Utc};
use rand::{RngCore, rngs::OsRng};

use crate::{models::VerificationToken, repository::Repository, validation::normalize_email};

/// Default token lifetime.
pub const DEFAULT_TTL_MINUTES: i64 = 30;

/// IssuedToken
///
/// The raw token to embed in the email link, with its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires: DateTime<Utc>,
}

/// 32 random bytes, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// create_email_verification_token
///
/// Replaces any outstanding tokens for `email` with a fresh one valid for `ttl_minutes`.
pub async fn create_email_verification_token(
    repo: &dyn Repository,
    email: &str,
    ttl_minutes: i64,
) -> Result<IssuedToken, sqlx::Error> {
    let identifier = normalize_email(email);
    let token = generate_token();
    let expires = Utc::now() + Duration::minutes(ttl_minutes);

    let cleared = repo.delete_verification_tokens_for(&identifier).await?;
    if cleared > 0 {
        tracing::debug!(identifier = %identifier, cleared, "replaced outstanding verification tokens");
    }

    repo.create_verification_token(VerificationToken {
        identifier,
        token: token.clone(),
        expires,
    })
    .await?;

    Ok(IssuedToken { token, expires })
}

/// consume_email_verification_token
///
/// Returns true only for an unexpired token issued to `email`, and only to the one
/// caller that actually deleted it. A matching token is deleted either way once found,
/// so it can never be replayed; a token issued to another identifier is left untouched.
pub async fn consume_email_verification_token(
    repo: &dyn Repository,
    email: &str,
    token: &str,
) -> Result<bool, sqlx::Error> {
    let identifier = normalize_email(email);

    let Some(found) = repo.find_verification_token(token).await else {
        return Ok(false);
    };
    if found.identifier != identifier {
        return Ok(false);
    }

    // Only the caller whose delete removed the row may use it.
    let deleted = repo.delete_verification_token(token).await?;
    Ok(deleted && found.expires >= Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;

    #[test]
    fn generated_tokens_are_hex_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn token_is_single_use() {
        let repo = InMemoryRepository::new();
        let issued = create_email_verification_token(&repo, "Ada@Example.com", 30)
            .await
            .unwrap();

        assert!(
            consume_email_verification_token(&repo, "ada@example.com", &issued.token)
                .await
                .unwrap()
        );
        assert!(
            !consume_email_verification_token(&repo, "ada@example.com", &issued.token)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn new_token_replaces_old_one() {
        let repo = InMemoryRepository::new();
        let first = create_email_verification_token(&repo, "ada@example.com", 30)
            .await
            .unwrap();
        let second = create_email_verification_token(&repo, "ada@example.com", 30)
            .await
            .unwrap();

        assert!(repo.find_verification_token(&first.token).await.is_none());
        assert!(repo.find_verification_token(&second.token).await.is_some());
    }

    #[tokio::test]
    async fn token_for_other_email_is_rejected_and_kept() {
        let repo = InMemoryRepository::new();
        let issued = create_email_verification_token(&repo, "ada@example.com", 30)
            .await
            .unwrap();

        assert!(
            !consume_email_verification_token(&repo, "eve@example.com", &issued.token)
                .await
                .unwrap()
        );
        assert!(repo.find_verification_token(&issued.token).await.is_some());
    }

    #[tokio::test]
    async fn expired_token_is_rejected_and_removed() {
        let repo = InMemoryRepository::new();
        let issued = create_email_verification_token(&repo, "ada@example.com", -1)
            .await
            .unwrap();

        assert!(
            !consume_email_verification_token(&repo, "ada@example.com", &issued.token)
                .await
                .unwrap()
        );
        assert!(repo.find_verification_token(&issued.token).await.is_none());
    }
}
