// =============================================================================
// User Store — username / password-hash table in a local SQLite file
// =============================================================================

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, info};

use super::password::PasswordHasher;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Username already exists")]
    UsernameTaken,

    #[error("Username and password are required")]
    MissingCredentials,

    #[error("password hashing task failed: {0}")]
    Hashing(#[from] tokio::task::JoinError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub struct UserStore {
    pool: SqlitePool,
    hasher: PasswordHasher,
}

impl UserStore {
    /// Open (creating if needed) the SQLite file at `path` and ensure the
    /// user table exists.
    pub async fn open(path: &str, hasher: PasswordHasher) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open user database at {path}"))?;

        let store = Self { pool, hasher };
        store.init().await.context("failed to initialise user table")?;
        info!(path, "user store ready");
        Ok(store)
    }

    pub async fn init(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Create an account. Fails with [`AccountError::UsernameTaken`] when the
    /// username already exists; the existing account is left untouched.
    pub async fn register(&self, username: &str, password: &str) -> Result<(), AccountError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AccountError::MissingCredentials);
        }

        let hasher = self.hasher;
        let password = password.to_string();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&password)).await?;

        let result = sqlx::query("INSERT INTO users (username, password_hash) VALUES (?, ?)")
            .bind(username)
            .bind(&hash)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => {
                info!(username, "account registered");
                Ok(())
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                debug!(username, "registration rejected: username taken");
                Err(AccountError::UsernameTaken)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Whether `password` is correct for `username`. Unknown users are `false`.
    pub async fn verify(&self, username: &str, password: &str) -> Result<bool, AccountError> {
        let Some(hash) = self.password_hash(username.trim()).await? else {
            return Ok(false);
        };

        let hasher = self.hasher;
        let password = password.to_string();
        let ok = tokio::task::spawn_blocking(move || hasher.verify(&password, &hash)).await?;
        Ok(ok)
    }

    async fn password_hash(&self, username: &str) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT password_hash FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(hash,)| hash))
    }
}

#[cfg(test)]
impl UserStore {
    /// Private in-memory database on a single long-lived connection.
    pub(crate) async fn in_memory() -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = Self {
            pool,
            hasher: PasswordHasher::new(10),
        };
        store.init().await.unwrap();
        store
    }

    pub(crate) async fn count(&self) -> i64 {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .unwrap();
        n
    }
}
