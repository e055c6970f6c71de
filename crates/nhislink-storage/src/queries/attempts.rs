// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fetch attempt log.

use chrono::{DateTime, Utc};
use nhislink_core::{FetchAttempt, NhisError};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::models::{format_ts, opt_ts_col, ts_col};

const ATTEMPT_COLUMNS: &str = "app_user_id, provider, identity_hash, request_hash, request_key,
     force_refresh, cached, status_code, ok, created_at";

fn attempt_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FetchAttempt> {
    Ok(FetchAttempt {
        app_user_id: row.get(0)?,
        provider: row.get(1)?,
        identity_hash: row.get(2)?,
        request_hash: row.get(3)?,
        request_key: row.get(4)?,
        force_refresh: row.get(5)?,
        cached: row.get(6)?,
        status_code: row.get(7)?,
        ok: row.get(8)?,
        created_at: ts_col(row, 9)?,
    })
}

/// Append one attempt.
pub async fn record_attempt(db: &Database, attempt: &FetchAttempt) -> Result<(), NhisError> {
    let attempt = attempt.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO fetch_attempts (app_user_id, provider, identity_hash, request_hash,
                     request_key, force_refresh, cached, status_code, ok, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    attempt.app_user_id,
                    attempt.provider,
                    attempt.identity_hash,
                    attempt.request_hash,
                    attempt.request_key,
                    attempt.force_refresh,
                    attempt.cached,
                    attempt.status_code,
                    attempt.ok,
                    format_ts(attempt.created_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Uncached attempts created at or after `since`, oldest first.
pub async fn attempts_since(
    db: &Database,
    app_user_id: &str,
    provider: &str,
    since: DateTime<Utc>,
) -> Result<Vec<FetchAttempt>, NhisError> {
    let app_user_id = app_user_id.to_string();
    let provider = provider.to_string();
    let since = format_ts(since);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ATTEMPT_COLUMNS}
                 FROM fetch_attempts
                 WHERE app_user_id = ?1 AND provider = ?2 AND cached = 0 AND created_at >= ?3
                 ORDER BY created_at ASC, id ASC"
            ))?;
            let rows = stmt.query_map(params![app_user_id, provider, since], attempt_from_row)?;
            let attempts = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(attempts)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The newest `limit` attempts, cached serves included, newest first.
pub async fn recent_attempts(
    db: &Database,
    app_user_id: &str,
    provider: &str,
    limit: u32,
) -> Result<Vec<FetchAttempt>, NhisError> {
    let app_user_id = app_user_id.to_string();
    let provider = provider.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ATTEMPT_COLUMNS}
                 FROM fetch_attempts
                 WHERE app_user_id = ?1 AND provider = ?2
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?3"
            ))?;
            let rows = stmt.query_map(params![app_user_id, provider, limit], attempt_from_row)?;
            let attempts = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(attempts)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Time of the newest uncached attempt, falling back to the newest cache entry.
pub async fn latest_attempt_at(
    db: &Database,
    app_user_id: &str,
    provider: &str,
) -> Result<Option<DateTime<Utc>>, NhisError> {
    let app_user_id = app_user_id.to_string();
    let provider = provider.to_string();
    db.connection()
        .call(move |conn| {
            let attempt = conn
                .query_row(
                    "SELECT created_at FROM fetch_attempts
                     WHERE app_user_id = ?1 AND provider = ?2 AND cached = 0
                     ORDER BY created_at DESC LIMIT 1",
                    params![app_user_id, provider],
                    |row| opt_ts_col(row, 0),
                )
                .optional()?
                .flatten();
            if attempt.is_some() {
                return Ok(attempt);
            }
            let fetched = conn
                .query_row(
                    "SELECT fetched_at FROM fetch_cache
                     WHERE app_user_id = ?1 AND provider = ?2
                     ORDER BY fetched_at DESC LIMIT 1",
                    params![app_user_id, provider],
                    |row| opt_ts_col(row, 0),
                )
                .optional()?
                .flatten();
            Ok(fetched)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
