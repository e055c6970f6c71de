// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded in-process copy of recent fetch cache entries.
//!
//! Checked before the database. Entries are indexed by request fingerprint
//! and by identity plus request shape, the latter pointing at the newest
//! entry written for that shape. Expired entries linger for a grace period
//! so forced refreshes can still be answered from history.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use nhislink_config::model::CacheConfig;
use nhislink_core::{FetchCacheEntry, FetchTarget, IdentityCacheLookup};

/// Which index answered a lookup, and whether expired entries were allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemorySource {
    Request,
    Identity,
    History,
    HistoryIdentity,
}

impl MemorySource {
    pub fn as_str(self) -> &'static str {
        match self {
            MemorySource::Request => "memory",
            MemorySource::Identity => "memory-identity",
            MemorySource::History => "memory-history",
            MemorySource::HistoryIdentity => "memory-history-identity",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryLookup {
    /// Fall back to expired entries still inside the grace period.
    pub allow_history: bool,
    /// Reject entries fetched longer ago than this.
    pub max_age_secs: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct MemoryHit {
    pub entry: FetchCacheEntry,
    pub source: MemorySource,
    pub stale: bool,
    pub age_secs: i64,
}

fn request_key(app_user_id: &str, request_hash: &str) -> String {
    format!("{app_user_id}|{request_hash}")
}

fn identity_key(
    app_user_id: &str,
    identity_hash: &str,
    targets: &[FetchTarget],
    year_limit: u32,
    subject_type: Option<&str>,
) -> String {
    let mut names: Vec<&str> = targets.iter().map(|t| t.as_str()).collect();
    names.sort_unstable();
    names.dedup();
    let subject = subject_type.filter(|s| !s.is_empty()).unwrap_or("-");
    format!(
        "{app_user_id}|{identity_hash}|{}|{year_limit}|{subject}",
        names.join(",")
    )
}

fn entry_identity_key(entry: &FetchCacheEntry) -> String {
    identity_key(
        &entry.app_user_id,
        &entry.identity_hash,
        &entry.targets,
        entry.year_limit,
        entry.subject_type.as_deref(),
    )
}

fn to_hit(
    entry: FetchCacheEntry,
    source: MemorySource,
    lookup: MemoryLookup,
    allow_stale: bool,
    now: DateTime<Utc>,
) -> Option<MemoryHit> {
    let age_secs = (now - entry.fetched_at).num_seconds().max(0);
    if lookup.max_age_secs.is_some_and(|max| max >= 0 && age_secs > max) {
        return None;
    }
    let stale = !entry.is_valid_at(now);
    if stale && !allow_stale {
        return None;
    }
    Some(MemoryHit {
        entry,
        source,
        stale,
        age_secs,
    })
}

/// Bounded fetch cache shared by every clone of the fetch service.
#[derive(Debug)]
pub struct FetchMemoryCache {
    by_request: DashMap<String, FetchCacheEntry>,
    by_identity: DashMap<String, String>,
    max_entries: usize,
    history_grace: Duration,
}

impl FetchMemoryCache {
    pub fn new(max_entries: usize, history_grace: Duration) -> Self {
        Self {
            by_request: DashMap::new(),
            by_identity: DashMap::new(),
            max_entries: max_entries.max(1),
            history_grace,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            config.memory_max_entries,
            Duration::minutes(i64::from(config.memory_history_grace_minutes)),
        )
    }

    pub fn len(&self) -> usize {
        self.by_request.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_request.is_empty()
    }

    /// Find an entry for the request fingerprint, then for the identity and
    /// request shape. Expired entries are considered only with
    /// `allow_history`, after both valid lookups missed.
    pub fn read(
        &self,
        request_hash: &str,
        shape: &IdentityCacheLookup,
        lookup: MemoryLookup,
        now: DateTime<Utc>,
    ) -> Option<MemoryHit> {
        self.trim_expired(now);

        let direct = self
            .by_request
            .get(&request_key(&shape.app_user_id, request_hash))
            .map(|e| e.value().clone());
        let mapped = self
            .by_identity
            .get(&identity_key(
                &shape.app_user_id,
                &shape.identity_hash,
                &shape.targets,
                shape.year_limit,
                shape.subject_type.as_deref(),
            ))
            .map(|k| k.value().clone());
        let by_identity = mapped.and_then(|key| self.by_request.get(&key).map(|e| e.value().clone()));

        let candidates = [
            (direct.clone(), MemorySource::Request, false),
            (by_identity.clone(), MemorySource::Identity, false),
            (direct, MemorySource::History, true),
            (by_identity, MemorySource::HistoryIdentity, true),
        ];
        candidates
            .into_iter()
            .filter(|(_, _, stale_ok)| !stale_ok || lookup.allow_history)
            .find_map(|(entry, source, stale_ok)| to_hit(entry?, source, lookup, stale_ok, now))
    }

    /// Store an entry, replacing any entry for the same request fingerprint.
    pub fn write(&self, entry: FetchCacheEntry, now: DateTime<Utc>) {
        let key = request_key(&entry.app_user_id, &entry.request_hash);
        self.by_identity.insert(entry_identity_key(&entry), key.clone());
        self.by_request.insert(key, entry);

        self.trim_expired(now);
        self.trim_to_limit();
    }

    /// Drop every entry of a user.
    pub fn clear_user(&self, app_user_id: &str) {
        let keys: Vec<String> = self
            .by_request
            .iter()
            .filter(|e| e.value().app_user_id == app_user_id)
            .map(|e| e.key().clone())
            .collect();
        for key in keys {
            self.drop_entry(&key);
        }
    }

    fn drop_entry(&self, key: &str) {
        let Some((_, entry)) = self.by_request.remove(key) else {
            return;
        };
        self.by_identity
            .remove_if(&entry_identity_key(&entry), |_, mapped| mapped == key);
    }

    fn trim_expired(&self, now: DateTime<Utc>) {
        let expired: Vec<String> = self
            .by_request
            .iter()
            .filter(|e| e.value().expires_at + self.history_grace <= now)
            .map(|e| e.key().clone())
            .collect();
        for key in expired {
            self.drop_entry(&key);
        }
    }

    fn trim_to_limit(&self) {
        let overflow = self.by_request.len().saturating_sub(self.max_entries);
        if overflow == 0 {
            return;
        }
        let mut by_age: Vec<(DateTime<Utc>, String)> = self
            .by_request
            .iter()
            .map(|e| (e.value().fetched_at, e.key().clone()))
            .collect();
        by_age.sort();
        for (_, key) in by_age.into_iter().take(overflow) {
            self.drop_entry(&key);
        }
    }
}
