// Key-value store and user directory (SQLite via sqlx).

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::engine::host::UserDirectory;
use crate::error::GameResult;

/// Where a variable lives: process-wide or attached to one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    Global,
    User(&'a str),
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub name: String,
    pub created_at: String,
}

/// Canonical spelling of a chat user name: trimmed, without a leading `@`.
pub fn user_name(raw: &str) -> &str {
    raw.trim().trim_start_matches('@').trim_start()
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let mut options = SqlitePoolOptions::new().max_connections(5);
        // Every connection to an in-memory database is a fresh database
        if database_url.contains(":memory:") {
            options = options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = options.connect(database_url).await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS global_vars (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_vars (
                user TEXT NOT NULL COLLATE NOCASE,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (user, key)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                name TEXT PRIMARY KEY COLLATE NOCASE,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Variables ─────────────────────────────────────────────────────

    pub async fn get(&self, scope: Scope<'_>, key: &str) -> Result<Option<String>, sqlx::Error> {
        let value = match scope {
            Scope::Global => {
                sqlx::query_scalar::<_, String>("SELECT value FROM global_vars WHERE key = ?")
                    .bind(key)
                    .fetch_optional(&self.pool)
                    .await?
            }
            Scope::User(user) => {
                sqlx::query_scalar::<_, String>(
                    "SELECT value FROM user_vars WHERE user = ? AND key = ?",
                )
                .bind(user)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(value)
    }

    pub async fn set(&self, scope: Scope<'_>, key: &str, value: &str) -> Result<(), sqlx::Error> {
        match scope {
            Scope::Global => {
                sqlx::query(
                    "INSERT INTO global_vars (key, value) VALUES (?, ?) \
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
                )
                .bind(key)
                .bind(value)
                .execute(&self.pool)
                .await?;
            }
            Scope::User(user) => {
                sqlx::query(
                    "INSERT INTO user_vars (user, key, value) VALUES (?, ?, ?) \
                     ON CONFLICT(user, key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
                )
                .bind(user)
                .bind(key)
                .bind(value)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    /// Remove a variable. Returns whether it existed.
    pub async fn unset(&self, scope: Scope<'_>, key: &str) -> Result<bool, sqlx::Error> {
        let result = match scope {
            Scope::Global => {
                sqlx::query("DELETE FROM global_vars WHERE key = ?")
                    .bind(key)
                    .execute(&self.pool)
                    .await?
            }
            Scope::User(user) => {
                sqlx::query("DELETE FROM user_vars WHERE user = ? AND key = ?")
                    .bind(user)
                    .bind(key)
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected() > 0)
    }

    // ── Users ─────────────────────────────────────────────────────────

    /// Record a user the first time they interact. Keeps the original spelling.
    pub async fn register_user(&self, name: &str) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT OR IGNORE INTO users (name) VALUES (?)")
            .bind(user_name(name))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Look a user up by name, case-insensitively.
    pub async fn find_user(&self, name: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT name, created_at FROM users WHERE name = ?")
            .bind(user_name(name))
            .fetch_optional(&self.pool)
            .await
    }

}

#[async_trait::async_trait]
impl UserDirectory for Database {
    async fn resolve(&self, name: &str) -> GameResult<Option<String>> {
        Ok(self.find_user(name).await?.map(|u| u.name))
    }
}
