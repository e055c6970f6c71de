// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store wrapper that fails cache writes on demand.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use nhislink_core::{
    AdapterType, CacheStats, FetchAttempt, FetchCacheEntry, HealthStatus, IdentityCacheLookup,
    LinkPatch, NhisError, NhisLink, NhisStore, PluginAdapter,
};

/// Delegates to an inner store, except that `save_cache` errors while
/// cache writes are set to fail.
pub struct FailingStore {
    inner: Arc<dyn NhisStore>,
    fail_cache_writes: AtomicBool,
}

impl FailingStore {
    pub fn new(inner: Arc<dyn NhisStore>) -> Self {
        Self {
            inner,
            fail_cache_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_cache_writes(&self, fail: bool) {
        self.fail_cache_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PluginAdapter for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    fn version(&self) -> semver::Version {
        self.inner.version()
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, NhisError> {
        self.inner.health_check().await
    }

    async fn shutdown(&self) -> Result<(), NhisError> {
        self.inner.shutdown().await
    }
}

#[async_trait]
impl NhisStore for FailingStore {
    async fn get_link(&self, app_user_id: &str) -> Result<Option<NhisLink>, NhisError> {
        self.inner.get_link(app_user_id).await
    }

    async fn upsert_link(
        &self,
        app_user_id: &str,
        patch: LinkPatch,
    ) -> Result<NhisLink, NhisError> {
        self.inner.upsert_link(app_user_id, patch).await
    }

    async fn clear_link(&self, app_user_id: &str) -> Result<(), NhisError> {
        self.inner.clear_link(app_user_id).await
    }

    async fn get_valid_cache(
        &self,
        app_user_id: &str,
        request_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<FetchCacheEntry>, NhisError> {
        self.inner.get_valid_cache(app_user_id, request_hash, now).await
    }

    async fn latest_cache_for_identity(
        &self,
        lookup: &IdentityCacheLookup,
    ) -> Result<Option<FetchCacheEntry>, NhisError> {
        self.inner.latest_cache_for_identity(lookup).await
    }

    async fn save_cache(&self, entry: &FetchCacheEntry) -> Result<(), NhisError> {
        if self.fail_cache_writes.load(Ordering::SeqCst) {
            return Err(NhisError::Internal("disk full".into()));
        }
        self.inner.save_cache(entry).await
    }

    async fn mark_cache_hit(&self, id: &str, at: DateTime<Utc>) -> Result<(), NhisError> {
        self.inner.mark_cache_hit(id, at).await
    }

    async fn cache_stats(
        &self,
        app_user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CacheStats, NhisError> {
        self.inner.cache_stats(app_user_id, now).await
    }

    async fn record_attempt(&self, attempt: &FetchAttempt) -> Result<(), NhisError> {
        self.inner.record_attempt(attempt).await
    }

    async fn attempts_since(
        &self,
        app_user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<FetchAttempt>, NhisError> {
        self.inner.attempts_since(app_user_id, since).await
    }

    async fn recent_attempts(
        &self,
        app_user_id: &str,
        limit: u32,
    ) -> Result<Vec<FetchAttempt>, NhisError> {
        self.inner.recent_attempts(app_user_id, limit).await
    }

    async fn latest_attempt_at(
        &self,
        app_user_id: &str,
    ) -> Result<Option<DateTime<Utc>>, NhisError> {
        self.inner.latest_attempt_at(app_user_id).await
    }
}
