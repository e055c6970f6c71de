// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence trait for link state, fetch cache and fetch attempts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::NhisError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    CacheStats, FetchAttempt, FetchCacheEntry, IdentityCacheLookup, LinkError, LinkPatch,
    NhisLink,
};

/// Storage backend for the orchestrator.
///
/// Implementations are scoped to a single provider; every record they
/// read or write carries that provider name.
#[async_trait]
pub trait NhisStore: PluginAdapter {
    // --- Link operations ---

    /// Reads the link record for a user.
    async fn get_link(&self, app_user_id: &str) -> Result<Option<NhisLink>, NhisError>;

    /// Creates or updates the link record and returns the stored result.
    async fn upsert_link(&self, app_user_id: &str, patch: LinkPatch)
        -> Result<NhisLink, NhisError>;

    /// Unlinks the user, wiping session state, and deletes their fetch caches.
    async fn clear_link(&self, app_user_id: &str) -> Result<(), NhisError>;

    /// Records an error on the link without touching anything else.
    async fn save_link_error(
        &self,
        app_user_id: &str,
        error: LinkError,
    ) -> Result<NhisLink, NhisError> {
        self.upsert_link(
            app_user_id,
            LinkPatch {
                last_error: Some(Some(error)),
                ..Default::default()
            },
        )
        .await
    }

    // --- Fetch cache operations ---

    /// Returns the entry for a request fingerprint if it has not expired.
    async fn get_valid_cache(
        &self,
        app_user_id: &str,
        request_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<FetchCacheEntry>, NhisError>;

    /// Returns the newest successful entry for an identity and request shape,
    /// including expired entries.
    async fn latest_cache_for_identity(
        &self,
        lookup: &IdentityCacheLookup,
    ) -> Result<Option<FetchCacheEntry>, NhisError>;

    /// Inserts or replaces the entry for its request fingerprint.
    async fn save_cache(&self, entry: &FetchCacheEntry) -> Result<(), NhisError>;

    /// Increments the hit counter of an entry.
    async fn mark_cache_hit(&self, id: &str, at: DateTime<Utc>) -> Result<(), NhisError>;

    /// Aggregate cache figures for the status view.
    async fn cache_stats(
        &self,
        app_user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CacheStats, NhisError>;

    // --- Attempt operations ---

    /// Records one fetch attempt.
    async fn record_attempt(&self, attempt: &FetchAttempt) -> Result<(), NhisError>;

    /// Uncached attempts created at or after `since`, oldest first.
    async fn attempts_since(
        &self,
        app_user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<FetchAttempt>, NhisError>;

    /// The newest `limit` attempts, cached serves included, newest first.
    async fn recent_attempts(
        &self,
        app_user_id: &str,
        limit: u32,
    ) -> Result<Vec<FetchAttempt>, NhisError>;

    /// Time of the newest uncached attempt, falling back to the newest cache entry.
    async fn latest_attempt_at(
        &self,
        app_user_id: &str,
    ) -> Result<Option<DateTime<Utc>>, NhisError>;
}
