//! User accounts and session cookies.
//!
//! Users live in SQLite (see `migrations/`). Passwords are stored as Argon2id
//! PHC strings (`$argon2id$v=19$...`) with a random salt per user.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::http::{header, HeaderMap, HeaderValue};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

pub const SESSION_COOKIE: &str = "promptcut_session";

const MAX_USERNAME_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Username '{0}' is already taken.")]
    UsernameTaken(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub created_at: i64,
}

/// SQLite-backed user table.
#[derive(Clone, Debug)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    /// Open (or create) the database at `url` and run pending migrations.
    ///
    /// `sqlite::memory:` keeps a single pooled connection so every query sees
    /// the same database.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let in_memory = url.contains(":memory:");

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("[AUTH] User store ready at {}", url);
        Ok(Self { pool })
    }

    pub async fn create_user(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidInput(
                "Username and password are required.".to_string(),
            ));
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(AuthError::InvalidInput(format!(
                "Username must be at most {} characters.",
                MAX_USERNAME_LEN
            )));
        }

        let password_hash = hash_password_blocking(password).await?;
        let created_at = unix_now();

        let result = sqlx::query(
            "INSERT INTO users (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(username)
        .bind(&password_hash)
        .bind(created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => {
                info!("[AUTH] Registered user '{}'", username);
                Ok(User {
                    id: done.last_insert_rowid(),
                    username: username.to_string(),
                    password_hash,
                    created_at,
                })
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(AuthError::UsernameTaken(username.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<(i64, String, String, i64)> = sqlx::query_as(
            "SELECT id, username, password_hash, created_at FROM users WHERE username = ?1",
        )
        .bind(username.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, username, password_hash, created_at)| User {
            id,
            username,
            password_hash,
            created_at,
        }))
    }

    /// The user, if `username` exists and `password` matches.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Option<User>, sqlx::Error> {
        let Some(user) = self.find_by_username(username).await? else {
            return Ok(None);
        };
        // Argon2 verification is CPU-bound; run it on the blocking pool.
        let password = password.to_string();
        let stored = user.password_hash.clone();
        let ok = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
            .await
            .unwrap_or(false);
        Ok(ok.then_some(user))
    }
}

async fn hash_password_blocking(password: &str) -> Result<String, AuthError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AuthError::Hash(e.to_string()))?
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Constant-time check of `password` against a stored PHC string.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

// ── session cookie ───────────────────────────────────────────────────────────

/// Session id from the request's `Cookie` header, if present.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|v| !v.is_empty())
}

pub fn session_cookie(session_id: &str) -> HeaderValue {
    HeaderValue::from_str(&format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, session_id
    ))
    .unwrap_or_else(|_| clear_session_cookie())
}

pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("promptcut_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let stored = hash_password("hunter2").unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert!(!stored.contains("hunter2"));
        assert!(verify_password("hunter2", &stored));
        assert!(!verify_password("hunter3", &stored));
        assert!(!verify_password("hunter2", "plaintext"));
    }

    #[test]
    fn test_salts_differ() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn test_fast_digest_is_not_accepted() {
        // An unsalted sha256 of the password must never verify.
        let fast = "sha256$00$652c7dc687d98c9889304ed2e408c74b611e86a40caa51c4b43f1dd5913c5cd0";
        assert!(!verify_password("hunter2", fast));
    }

    #[tokio::test]
    async fn test_stored_hash_is_argon2() {
        let store = UserStore::connect("sqlite::memory:").await.unwrap();
        let user = store.create_user("zoe", "pw").await.unwrap();
        let stored = store.find_by_username("zoe").await.unwrap().unwrap();
        assert_eq!(stored.password_hash, user.password_hash);
        assert!(stored.password_hash.starts_with("$argon2id$v=19$"));
    }

    #[test]
    fn test_session_id_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; promptcut_session=abc-123"),
        );
        assert_eq!(session_id_from_headers(&headers).as_deref(), Some("abc-123"));

        let empty = HeaderMap::new();
        assert_eq!(session_id_from_headers(&empty), None);
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let store = UserStore::connect("sqlite::memory:").await.unwrap();
        let user = store.create_user("alice", "s3cret").await.unwrap();
        assert_eq!(user.username, "alice");

        let ok = store.authenticate("alice", "s3cret").await.unwrap();
        assert_eq!(ok.map(|u| u.id), Some(user.id));
        assert!(store.authenticate("alice", "wrong").await.unwrap().is_none());
        assert!(store.authenticate("bob", "s3cret").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_and_empty_usernames() {
        let store = UserStore::connect("sqlite::memory:").await.unwrap();
        store.create_user("alice", "one").await.unwrap();
        assert!(matches!(
            store.create_user("alice", "two").await,
            Err(AuthError::UsernameTaken(_))
        ));
        assert!(matches!(
            store.create_user("  ", "pw").await,
            Err(AuthError::InvalidInput(_))
        ));
    }
}
