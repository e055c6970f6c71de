// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`NhisStore`] trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use nhislink_config::model::StorageConfig;
use nhislink_core::{
    AdapterType, CacheStats, FetchAttempt, FetchCacheEntry, HealthStatus, IdentityCacheLookup,
    LinkPatch, NhisError, NhisLink, NhisStore, PluginAdapter,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed store scoped to one provider.
///
/// The database is opened lazily by [`SqliteNhisStore::initialize`].
pub struct SqliteNhisStore {
    config: StorageConfig,
    provider: String,
    db: OnceCell<Database>,
}

impl SqliteNhisStore {
    /// Create a store. The database is not opened until [`Self::initialize`].
    pub fn new(config: StorageConfig, provider: impl Into<String>) -> Self {
        Self {
            config,
            provider: provider.into(),
            db: OnceCell::new(),
        }
    }

    /// Open the database and run migrations. Fails when called twice.
    pub async fn initialize(&self) -> Result<(), NhisError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| NhisError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, provider = %self.provider, "SQLite store initialized");
        Ok(())
    }

    /// Provider name stamped on every record.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    fn db(&self) -> Result<&Database, NhisError> {
        self.db.get().ok_or_else(|| NhisError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    async fn checkpoint(db: &Database) -> Result<(), NhisError> {
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)
    }
}

#[async_trait]
impl PluginAdapter for SqliteNhisStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, NhisError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), NhisError> {
        if let Some(db) = self.db.get() {
            Self::checkpoint(db).await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl NhisStore for SqliteNhisStore {
    async fn get_link(&self, app_user_id: &str) -> Result<Option<NhisLink>, NhisError> {
        queries::links::get_link(self.db()?, app_user_id, &self.provider).await
    }

    async fn upsert_link(&self, app_user_id: &str, patch: LinkPatch) -> Result<NhisLink, NhisError> {
        queries::links::upsert_link(self.db()?, app_user_id, &self.provider, patch, Utc::now()).await
    }

    async fn clear_link(&self, app_user_id: &str) -> Result<(), NhisError> {
        let removed =
            queries::links::clear_link(self.db()?, app_user_id, &self.provider, Utc::now()).await?;
        debug!(app_user_id, removed, "link cleared");
        Ok(())
    }

    async fn get_valid_cache(
        &self,
        app_user_id: &str,
        request_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<FetchCacheEntry>, NhisError> {
        queries::fetch_cache::get_valid_cache(self.db()?, app_user_id, &self.provider, request_hash, now)
            .await
    }

    async fn latest_cache_for_identity(
        &self,
        lookup: &IdentityCacheLookup,
    ) -> Result<Option<FetchCacheEntry>, NhisError> {
        queries::fetch_cache::latest_cache_for_identity(self.db()?, &self.provider, lookup).await
    }

    async fn save_cache(&self, entry: &FetchCacheEntry) -> Result<(), NhisError> {
        queries::fetch_cache::save_cache(self.db()?, entry).await
    }

    async fn mark_cache_hit(&self, id: &str, at: DateTime<Utc>) -> Result<(), NhisError> {
        queries::fetch_cache::mark_cache_hit(self.db()?, id, at).await
    }

    async fn cache_stats(&self, app_user_id: &str, now: DateTime<Utc>) -> Result<CacheStats, NhisError> {
        queries::fetch_cache::cache_stats(self.db()?, app_user_id, &self.provider, now).await
    }

    async fn record_attempt(&self, attempt: &FetchAttempt) -> Result<(), NhisError> {
        queries::attempts::record_attempt(self.db()?, attempt).await
    }

    async fn attempts_since(
        &self,
        app_user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<FetchAttempt>, NhisError> {
        queries::attempts::attempts_since(self.db()?, app_user_id, &self.provider, since).await
    }

    async fn recent_attempts(&self, app_user_id: &str, limit: u32) -> Result<Vec<FetchAttempt>, NhisError> {
        queries::attempts::recent_attempts(self.db()?, app_user_id, &self.provider, limit).await
    }

    async fn latest_attempt_at(&self, app_user_id: &str) -> Result<Option<DateTime<Utc>>, NhisError> {
        queries::attempts::latest_attempt_at(self.db()?, app_user_id, &self.provider).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nhislink_core::{DEFAULT_PROVIDER, LinkError};
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    #[tokio::test]
    async fn store_implements_plugin_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let store = SqliteNhisStore::new(make_config(db_path.to_str().unwrap()), DEFAULT_PROVIDER);

        assert_eq!(store.name(), "sqlite");
        assert_eq!(store.version(), semver::Version::new(0, 1, 0));
        assert_eq!(store.adapter_type(), AdapterType::Storage);
        assert_eq!(store.provider(), DEFAULT_PROVIDER);
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("double_init.db");
        let store = SqliteNhisStore::new(make_config(db_path.to_str().unwrap()), DEFAULT_PROVIDER);

        store.initialize().await.unwrap();
        assert!(db_path.exists());
        assert!(store.initialize().await.is_err());
    }

    #[tokio::test]
    async fn operations_fail_before_initialize() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("no_init.db");
        let store = SqliteNhisStore::new(make_config(db_path.to_str().unwrap()), DEFAULT_PROVIDER);

        assert!(store.health_check().await.is_err());
        assert!(matches!(
            store.get_link("user-1").await,
            Err(NhisError::Storage { .. })
        ));
        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn save_link_error_goes_through_upsert() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("errors.db");
        let store = SqliteNhisStore::new(make_config(db_path.to_str().unwrap()), DEFAULT_PROVIDER);
        store.initialize().await.unwrap();

        let link = store
            .save_link_error("user-1", LinkError::new(Some("E9".into()), Some("down".into())))
            .await
            .unwrap();
        assert!(!link.linked);
        assert_eq!(link.last_error().unwrap().message.as_deref(), Some("down"));
        assert_eq!(store.health_check().await.unwrap(), HealthStatus::Healthy);
        store.shutdown().await.unwrap();
    }
}
