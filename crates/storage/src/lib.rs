//! Durable local key-value store for the candidate client.
//!
//! Keys live in one of two scopes. The session scope holds the identity of the
//! logged-in candidate and is wiped at logout. The local scope holds answer
//! snapshots and outlives logout so a later login can pick the work back up.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreScope {
    Session,
    Local,
}

impl StoreScope {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreScope::Session => "session",
            StoreScope::Local => "local",
        }
    }
}

#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get(&self, scope: StoreScope, key: &str) -> Result<Option<String>>;
    async fn put(&self, scope: StoreScope, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, scope: StoreScope, key: &str) -> Result<()>;
    async fn clear_scope(&self, scope: StoreScope) -> Result<()>;
}

pub async fn load_json<T: DeserializeOwned>(
    store: &dyn LocalStore,
    scope: StoreScope,
    key: &str,
) -> Result<Option<T>> {
    let Some(raw) = store.get(scope, key).await? else {
        return Ok(None);
    };
    let value = serde_json::from_str(&raw)
        .with_context(|| format!("corrupt {} value under key '{key}'", scope.as_str()))?;
    Ok(Some(value))
}

pub async fn save_json<T: Serialize + ?Sized>(
    store: &dyn LocalStore,
    scope: StoreScope,
    key: &str,
    value: &T,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.put(scope, key, &raw).await
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open local store at '{database_url}'"))?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn get(&self, scope: StoreScope, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM local_store WHERE scope = ? AND key = ?")
            .bind(scope.as_str())
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get::<String, _>(0)))
    }

    async fn put(&self, scope: StoreScope, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO local_store (scope, key, value, updated_at) VALUES (?, ?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(scope, key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(scope.as_str())
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        debug!(scope = scope.as_str(), key, bytes = value.len(), "local store write");
        Ok(())
    }

    async fn remove(&self, scope: StoreScope, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM local_store WHERE scope = ? AND key = ?")
            .bind(scope.as_str())
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_scope(&self, scope: StoreScope) -> Result<()> {
        let result = sqlx::query("DELETE FROM local_store WHERE scope = ?")
            .bind(scope.as_str())
            .execute(&self.pool)
            .await?;
        debug!(
            scope = scope.as_str(),
            removed = result.rows_affected(),
            "local store scope cleared"
        );
        Ok(())
    }
}

/// Process-local store. Backs tests and hosts that do not need reloads to
/// survive a restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<(StoreScope, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, scope: StoreScope) -> usize {
        self.entries
            .lock()
            .await
            .keys()
            .filter(|(entry_scope, _)| *entry_scope == scope)
            .count()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get(&self, scope: StoreScope, key: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .lock()
            .await
            .get(&(scope, key.to_string()))
            .cloned())
    }

    async fn put(&self, scope: StoreScope, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert((scope, key.to_string()), value.to_string());
        Ok(())
    }

    async fn remove(&self, scope: StoreScope, key: &str) -> Result<()> {
        self.entries.lock().await.remove(&(scope, key.to_string()));
        Ok(())
    }

    async fn clear_scope(&self, scope: StoreScope) -> Result<()> {
        self.entries
            .lock()
            .await
            .retain(|(entry_scope, _), _| *entry_scope != scope);
        Ok(())
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
