//! SQLite-backed state store.
//!
//! Stores each [`VectorizationState`] as one JSON document row addressed by
//! its state key. SQLite serializes writers, which provides the per-key
//! write ordering the [`StateStore`](super::StateStore) contract requires.
//!
//! When the `sqlite-migrations` feature is enabled (default), embedded
//! migrations (`sqlx::migrate!("./migrations")`) run on connect; disabling
//! the feature assumes external migration orchestration.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use crate::state::VectorizationState;

use super::{StateStore, StoreError};

/// Opens (and bootstraps, if needed) a SQLite pool for a database URL.
///
/// File-backed URLs (`sqlite://path`) get their parent directory and file
/// created on first use so a fresh deployment starts without manual setup.
pub(crate) async fn connect_pool(database_url: &str) -> Result<SqlitePool, StoreError> {
    if let Some(path) = database_url.strip_prefix("sqlite://") {
        let path = path.trim();
        if !path.is_empty() && path != ":memory:" {
            let p = std::path::Path::new(path);
            if let Some(parent) = p.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if !p.exists() {
                // Ignore result; if it already exists or we lack permission
                // the connect below surfaces the real error.
                let _ = std::fs::File::create_new(p);
            }
        }
    }

    let pool = SqlitePool::connect(database_url)
        .await
        .map_err(|e| StoreError::Backend {
            message: format!("connect error: {e}"),
        })?;

    #[cfg(feature = "sqlite-migrations")]
    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
        return Err(StoreError::Backend {
            message: format!("migration error: {e}"),
        });
    }

    Ok(pool)
}

/// SQLite-backed [`StateStore`].
#[derive(Clone, Debug)]
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Connects to the database and runs embedded migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        Ok(Self {
            pool: connect_pool(database_url).await?,
        })
    }

    /// Wraps an existing pool (shared with the durable request sources).
    #[must_use]
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl StateStore for SqliteStateStore {
    async fn has_state(&self, state_key: &str) -> Result<bool, StoreError> {
        let row =
            sqlx::query("SELECT EXISTS(SELECT 1 FROM vectorization_states WHERE state_key = ?)")
                .bind(state_key)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StoreError::Backend {
                    message: e.to_string(),
                })?;
        let exists: i64 = row.get(0);
        Ok(exists != 0)
    }

    #[instrument(skip(self), err)]
    async fn read_state(&self, state_key: &str) -> Result<Option<VectorizationState>, StoreError> {
        let row = sqlx::query("SELECT body FROM vectorization_states WHERE state_key = ?")
            .bind(state_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend {
                message: e.to_string(),
            })?;
        match row {
            None => Ok(None),
            Some(row) => {
                let body: String = row.get("body");
                serde_json::from_str(&body)
                    .map(Some)
                    .map_err(|source| StoreError::Serde {
                        path: state_key.to_string(),
                        source,
                    })
            }
        }
    }

    #[instrument(skip(self, state), err)]
    async fn save_state(&self, state: &VectorizationState) -> Result<(), StoreError> {
        let key = state.state_key().map_err(|e| StoreError::Backend {
            message: e.to_string(),
        })?;
        let body = serde_json::to_string(state).map_err(|source| StoreError::Serde {
            path: key.clone(),
            source,
        })?;
        sqlx::query(
            "INSERT INTO vectorization_states (state_key, body, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(state_key) DO UPDATE SET
                 body = excluded.body,
                 updated_at = excluded.updated_at",
        )
        .bind(&key)
        .bind(&body)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend {
            message: e.to_string(),
        })?;
        Ok(())
    }
}
