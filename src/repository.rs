use crate::models::{Account, AdminOverview, NewUser, Role, User, VerificationToken};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    PgPool,
    error::{DatabaseError, ErrorKind},
};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Repository Trait
///
/// Abstract contract for every persistence operation the auth flows need.
/// Reads degrade to `None`/empty and log on database errors; writes surface
/// the `sqlx::Error` so the caller can report the failure.
///
/// **Send + Sync + async_trait** keep `Arc<dyn Repository>` usable across Axum tasks.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> Option<User>;
    // `email` must already be normalized.
    async fn find_user_by_email(&self, email: &str) -> Option<User>;
    async fn create_user(&self, user: NewUser) -> Result<User, sqlx::Error>;
    // Returns the updated user, or `None` when no user has that email.
    async fn mark_email_verified(&self, email: &str) -> Result<Option<User>, sqlx::Error>;
    async fn list_users(&self) -> Vec<User>;
    async fn get_overview(&self) -> AdminOverview;

    // --- OAuth Accounts ---
    async fn find_account(&self, provider: &str, provider_account_id: &str) -> Option<Account>;
    async fn link_account(
        &self,
        user_id: Uuid,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Account, sqlx::Error>;
    async fn list_accounts(&self, user_id: Uuid) -> Vec<Account>;

    // --- Verification Tokens ---
    async fn create_verification_token(&self, token: VerificationToken) -> Result<(), sqlx::Error>;
    async fn find_verification_token(&self, token: &str) -> Option<VerificationToken>;
    // Returns true if a row was removed.
    async fn delete_verification_token(&self, token: &str) -> Result<bool, sqlx::Error>;
    async fn delete_verification_tokens_for(&self, identifier: &str) -> Result<u64, sqlx::Error>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str = "id, name, email, email_verified, image, password, role, created_at";

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL (schema in `migrations/`).
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> Option<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_user error: {:?}", e);
                None
            })
    }

    async fn find_user_by_email(&self, email: &str) -> Option<User> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("find_user_by_email error: {:?}", e);
            None
        })
    }

    /// create_user
    ///
    /// Inserts a user. The unique index on `email` turns a duplicate into a database error.
    async fn create_user(&self, user: NewUser) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"INSERT INTO users (id, name, email, email_verified, image, password, role, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
               RETURNING {USER_COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(user.name)
        .bind(user.email)
        .bind(user.email_verified)
        .bind(user.image)
        .bind(user.password)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
    }

    async fn mark_email_verified(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET email_verified = NOW() WHERE email = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_users(&self) -> Vec<User> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("list_users error: {:?}", e);
            vec![]
        })
    }

    /// get_overview
    ///
    /// Compiles the admin dashboard counters in one round trip.
    async fn get_overview(&self) -> AdminOverview {
        let row: Result<(i64, i64, i64), sqlx::Error> = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE email_verified IS NOT NULL),
                COUNT(*) FILTER (WHERE role = 'ADMIN')
            FROM users
            "#,
        )
        .fetch_one(&self.pool)
        .await;

        match row {
            Ok((total_users, verified_users, admins)) => AdminOverview {
                total_users,
                verified_users,
                admins,
            },
            Err(e) => {
                tracing::error!("get_overview error: {:?}", e);
                AdminOverview::default()
            }
        }
    }

    async fn find_account(&self, provider: &str, provider_account_id: &str) -> Option<Account> {
        sqlx::query_as::<_, Account>(
            r#"SELECT id, user_id, provider, provider_account_id, created_at
               FROM accounts
               WHERE provider = $1 AND provider_account_id = $2"#,
        )
        .bind(provider)
        .bind(provider_account_id)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("find_account error: {:?}", e);
            None
        })
    }

    async fn link_account(
        &self,
        user_id: Uuid,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Account, sqlx::Error> {
        sqlx::query_as::<_, Account>(
            r#"INSERT INTO accounts (id, user_id, provider, provider_account_id, created_at)
               VALUES ($1, $2, $3, $4, NOW())
               RETURNING id, user_id, provider, provider_account_id, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(provider)
        .bind(provider_account_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn list_accounts(&self, user_id: Uuid) -> Vec<Account> {
        sqlx::query_as::<_, Account>(
            r#"SELECT id, user_id, provider, provider_account_id, created_at
               FROM accounts WHERE user_id = $1 ORDER BY created_at ASC"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("list_accounts error: {:?}", e);
            vec![]
        })
    }

    async fn create_verification_token(&self, token: VerificationToken) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO verification_tokens (identifier, token, expires) VALUES ($1, $2, $3)",
        )
        .bind(token.identifier)
        .bind(token.token)
        .bind(token.expires)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_verification_token(&self, token: &str) -> Option<VerificationToken> {
        sqlx::query_as::<_, VerificationToken>(
            "SELECT identifier, token, expires FROM verification_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("find_verification_token error: {:?}", e);
            None
        })
    }

    async fn delete_verification_token(&self, token: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM verification_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_verification_tokens_for(&self, identifier: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM verification_tokens WHERE identifier = $1")
            .bind(identifier)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Default)]
struct MemoryTables {
    users: Vec<User>,
    accounts: Vec<Account>,
    tokens: Vec<VerificationToken>,
}

/// InMemoryRepository
///
/// Process-local `Repository` used by the test suite and by local runs without
/// `DATABASE_URL`. Mirrors the Postgres uniqueness rules on `users.email`,
/// `(provider, provider_account_id)` and `verification_tokens.token`.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<MemoryTables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryTables> {
        self.tables.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryTables> {
        self.tables
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Unique-index failure raised by `InMemoryRepository`, shaped like the Postgres one.
#[derive(Debug, thiserror::Error)]
#[error("duplicate key value violates unique constraint on {constraint}")]
struct MemoryUniqueViolation {
    constraint: &'static str,
}

impl DatabaseError for MemoryUniqueViolation {
    fn message(&self) -> &str {
        "duplicate key value violates unique constraint"
    }

    fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self
    }

    fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
        self
    }

    fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
        self
    }

    fn constraint(&self) -> Option<&str> {
        Some(self.constraint)
    }

    fn kind(&self) -> ErrorKind {
        ErrorKind::UniqueViolation
    }
}

fn unique_violation(constraint: &'static str) -> sqlx::Error {
    sqlx::Error::Database(Box::new(MemoryUniqueViolation { constraint }))
}

/// True when `err` is a unique-index violation from either repository.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: Uuid) -> Option<User> {
        self.read().users.iter().find(|u| u.id == id).cloned()
    }

    async fn find_user_by_email(&self, email: &str) -> Option<User> {
        self.read().users.iter().find(|u| u.email == email).cloned()
    }

    async fn create_user(&self, user: NewUser) -> Result<User, sqlx::Error> {
        let mut tables = self.write();
        if tables.users.iter().any(|u| u.email == user.email) {
            return Err(unique_violation("users.email"));
        }
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            email_verified: user.email_verified,
            image: user.image,
            password: user.password,
            role: user.role.as_str().to_string(),
            created_at: Utc::now(),
        };
        tables.users.push(created.clone());
        Ok(created)
    }

    async fn mark_email_verified(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let mut tables = self.write();
        Ok(tables
            .users
            .iter_mut()
            .find(|u| u.email == email)
            .map(|user| {
                user.email_verified = Some(Utc::now());
                user.clone()
            }))
    }

    async fn list_users(&self) -> Vec<User> {
        let mut users = self.read().users.clone();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        users
    }

    async fn get_overview(&self) -> AdminOverview {
        let tables = self.read();
        AdminOverview {
            total_users: tables.users.len() as i64,
            verified_users: tables.users.iter().filter(|u| u.is_verified()).count() as i64,
            admins: tables
                .users
                .iter()
                .filter(|u| u.role() == Some(Role::Admin))
                .count() as i64,
        }
    }

    async fn find_account(&self, provider: &str, provider_account_id: &str) -> Option<Account> {
        self.read()
            .accounts
            .iter()
            .find(|a| a.provider == provider && a.provider_account_id == provider_account_id)
            .cloned()
    }

    async fn link_account(
        &self,
        user_id: Uuid,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Account, sqlx::Error> {
        let mut tables = self.write();
        if tables
            .accounts
            .iter()
            .any(|a| a.provider == provider && a.provider_account_id == provider_account_id)
        {
            return Err(unique_violation("accounts(provider, provider_account_id)"));
        }
        let account = Account {
            id: Uuid::new_v4(),
            user_id,
            provider: provider.to_string(),
            provider_account_id: provider_account_id.to_string(),
            created_at: Utc::now(),
        };
        tables.accounts.push(account.clone());
        Ok(account)
    }

    async fn list_accounts(&self, user_id: Uuid) -> Vec<Account> {
        self.read()
            .accounts
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect()
    }

    async fn create_verification_token(&self, token: VerificationToken) -> Result<(), sqlx::Error> {
        let mut tables = self.write();
        if tables.tokens.iter().any(|t| t.token == token.token) {
            return Err(unique_violation("verification_tokens.token"));
        }
        tables.tokens.push(token);
        Ok(())
    }

    async fn find_verification_token(&self, token: &str) -> Option<VerificationToken> {
        self.read().tokens.iter().find(|t| t.token == token).cloned()
    }

    async fn delete_verification_token(&self, token: &str) -> Result<bool, sqlx::Error> {
        let mut tables = self.write();
        let before = tables.tokens.len();
        tables.tokens.retain(|t| t.token != token);
        Ok(tables.tokens.len() < before)
    }

    async fn delete_verification_tokens_for(&self, identifier: &str) -> Result<u64, sqlx::Error> {
        let mut tables = self.write();
        let before = tables.tokens.len();
        tables.tokens.retain(|t| t.identifier != identifier);
        Ok((before - tables.tokens.len()) as u64)
    }
}
