// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fetch cache operations.

use chrono::{DateTime, Utc};
use nhislink_core::{CacheStats, FetchCacheEntry, IdentityCacheLookup, NhisError};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::models::{encode_targets, format_opt_ts, format_ts, json_col, opt_ts_col, targets_col, ts_col};

const CACHE_COLUMNS: &str = "id, app_user_id, provider, identity_hash, request_hash, request_key, \
     targets, year_limit, subject_type, status_code, ok, partial, payload, fetched_at, expires_at, \
     hit_count, last_hit_at";

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FetchCacheEntry> {
    Ok(FetchCacheEntry {
        id: row.get(0)?,
        app_user_id: row.get(1)?,
        provider: row.get(2)?,
        identity_hash: row.get(3)?,
        request_hash: row.get(4)?,
        request_key: row.get(5)?,
        targets: targets_col(row, 6)?,
        year_limit: row.get(7)?,
        subject_type: row.get(8)?,
        status_code: row.get(9)?,
        ok: row.get(10)?,
        partial: row.get(11)?,
        payload: json_col(row, 12)?,
        fetched_at: ts_col(row, 13)?,
        expires_at: ts_col(row, 14)?,
        hit_count: row.get(15)?,
        last_hit_at: opt_ts_col(row, 16)?,
    })
}

/// The entry for a request fingerprint, if it expires after `now`.
pub async fn get_valid_cache(
    db: &Database,
    app_user_id: &str,
    provider: &str,
    request_hash: &str,
    now: DateTime<Utc>,
) -> Result<Option<FetchCacheEntry>, NhisError> {
    let app_user_id = app_user_id.to_string();
    let provider = provider.to_string();
    let request_hash = request_hash.to_string();
    let now = format_ts(now);
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {CACHE_COLUMNS} FROM fetch_cache
                     WHERE app_user_id = ?1 AND provider = ?2 AND request_hash = ?3 AND expires_at > ?4"
                ),
                params![app_user_id, provider, request_hash, now],
                entry_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Newest successful entry for an identity and request shape, expired or not.
pub async fn latest_cache_for_identity(
    db: &Database,
    provider: &str,
    lookup: &IdentityCacheLookup,
) -> Result<Option<FetchCacheEntry>, NhisError> {
    let provider = provider.to_string();
    let app_user_id = lookup.app_user_id.clone();
    let identity_hash = lookup.identity_hash.clone();
    let targets = encode_targets(&lookup.targets);
    let year_limit = lookup.year_limit;
    let subject_type = lookup.subject_type.clone();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {CACHE_COLUMNS} FROM fetch_cache
                     WHERE app_user_id = ?1 AND provider = ?2 AND identity_hash = ?3
                       AND targets = ?4 AND year_limit = ?5 AND subject_type IS ?6 AND ok = 1
                     ORDER BY fetched_at DESC LIMIT 1"
                ),
                params![app_user_id, provider, identity_hash, targets, year_limit, subject_type],
                entry_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert or replace the entry for its `(app_user_id, provider, request_hash)`.
///
/// Replacing keeps the original row id and resets the hit counter to the
/// entry's values.
pub async fn save_cache(db: &Database, entry: &FetchCacheEntry) -> Result<(), NhisError> {
    let entry = entry.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO fetch_cache ({CACHE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                     ON CONFLICT (app_user_id, provider, request_hash) DO UPDATE SET
                        identity_hash = excluded.identity_hash,
                        request_key = excluded.request_key,
                        targets = excluded.targets,
                        year_limit = excluded.year_limit,
                        subject_type = excluded.subject_type,
                        status_code = excluded.status_code,
                        ok = excluded.ok,
                        partial = excluded.partial,
                        payload = excluded.payload,
                        fetched_at = excluded.fetched_at,
                        expires_at = excluded.expires_at,
                        hit_count = excluded.hit_count,
                        last_hit_at = excluded.last_hit_at"
                ),
                params![
                    entry.id,
                    entry.app_user_id,
                    entry.provider,
                    entry.identity_hash,
                    entry.request_hash,
                    entry.request_key,
                    encode_targets(&entry.targets),
                    entry.year_limit,
                    entry.subject_type,
                    entry.status_code,
                    entry.ok,
                    entry.partial,
                    entry.payload.to_string(),
                    format_ts(entry.fetched_at),
                    format_ts(entry.expires_at),
                    entry.hit_count,
                    format_opt_ts(entry.last_hit_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Increment the hit counter of an entry.
pub async fn mark_cache_hit(db: &Database, id: &str, at: DateTime<Utc>) -> Result<(), NhisError> {
    let id = id.to_string();
    let at = format_ts(at);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE fetch_cache SET hit_count = hit_count + 1, last_hit_at = ?1 WHERE id = ?2",
                params![at, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Entry counts plus the newest entry's timestamps and hit counter.
pub async fn cache_stats(
    db: &Database,
    app_user_id: &str,
    provider: &str,
    now: DateTime<Utc>,
) -> Result<CacheStats, NhisError> {
    let app_user_id = app_user_id.to_string();
    let provider = provider.to_string();
    let now = format_ts(now);
    db.connection()
        .call(move |conn| {
            let (total_entries, valid_entries): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(CASE WHEN expires_at > ?3 THEN 1 ELSE 0 END), 0)
                 FROM fetch_cache WHERE app_user_id = ?1 AND provider = ?2",
                params![app_user_id, provider, now],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let latest = conn
                .query_row(
                    "SELECT fetched_at, expires_at, last_hit_at, hit_count FROM fetch_cache
                     WHERE app_user_id = ?1 AND provider = ?2
                     ORDER BY fetched_at DESC LIMIT 1",
                    params![app_user_id, provider],
                    |row| {
                        Ok((
                            ts_col(row, 0)?,
                            ts_col(row, 1)?,
                            opt_ts_col(row, 2)?,
                            row.get::<_, i64>(3)?,
                        ))
                    },
                )
                .optional()?;
            Ok(CacheStats {
                total_entries,
                valid_entries,
                latest_fetched_at: latest.map(|l| l.0),
                latest_expires_at: latest.map(|l| l.1),
                latest_hit_at: latest.and_then(|l| l.2),
                latest_hit_count: latest.map(|l| l.3),
            })
        })
        .await
        .map_err(crate::database::map_tr_err)
}
