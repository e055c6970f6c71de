// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Temp-directory SQLite store for tests.

use std::sync::Arc;

use nhislink_config::model::StorageConfig;
use nhislink_core::{DEFAULT_PROVIDER, NhisError};
use nhislink_storage::SqliteNhisStore;

/// An initialized store whose database lives as long as this value.
pub struct TestStore {
    pub store: Arc<SqliteNhisStore>,
    _dir: tempfile::TempDir,
}

impl TestStore {
    /// Opens a fresh database for [`DEFAULT_PROVIDER`].
    pub async fn new() -> Result<Self, NhisError> {
        let dir = tempfile::TempDir::new().map_err(NhisError::storage)?;
        let path = dir.path().join("test.db");
        let store = SqliteNhisStore::new(
            StorageConfig {
                database_path: path.to_string_lossy().into_owned(),
                wal_mode: true,
            },
            DEFAULT_PROVIDER,
        );
        store.initialize().await?;
        Ok(Self {
            store: Arc::new(store),
            _dir: dir,
        })
    }
}
