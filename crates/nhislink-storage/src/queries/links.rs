// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Link state reads and partial updates.

use chrono::{DateTime, Utc};
use nhislink_core::{LinkPatch, NhisError, NhisLink};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::models::{encode_opt_json, format_opt_ts, format_ts, opt_json_col, opt_ts_col, ts_col};

const LINK_COLUMNS: &str = "app_user_id, provider, linked, login_method, login_org_cd, step_mode, \
     step_data, cookie_data, last_identity_hash, last_linked_at, last_fetched_at, last_attempt_at, \
     last_error_code, last_error_message, cached_payload, cache_entry_count, created_at, updated_at";

fn link_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NhisLink> {
    Ok(NhisLink {
        app_user_id: row.get(0)?,
        provider: row.get(1)?,
        linked: row.get(2)?,
        login_method: row.get(3)?,
        login_org_cd: row.get(4)?,
        step_mode: row.get(5)?,
        step_data: opt_json_col(row, 6)?,
        cookie_data: opt_json_col(row, 7)?,
        last_identity_hash: row.get(8)?,
        last_linked_at: opt_ts_col(row, 9)?,
        last_fetched_at: opt_ts_col(row, 10)?,
        last_attempt_at: opt_ts_col(row, 11)?,
        last_error_code: row.get(12)?,
        last_error_message: row.get(13)?,
        cached_payload: opt_json_col(row, 14)?,
        cache_entry_count: row.get(15)?,
        created_at: ts_col(row, 16)?,
        updated_at: ts_col(row, 17)?,
    })
}

fn select_link(
    conn: &rusqlite::Connection,
    app_user_id: &str,
    provider: &str,
) -> rusqlite::Result<Option<NhisLink>> {
    conn.query_row(
        &format!("SELECT {LINK_COLUMNS} FROM nhis_links WHERE app_user_id = ?1 AND provider = ?2"),
        params![app_user_id, provider],
        link_from_row,
    )
    .optional()
}

fn write_link(conn: &rusqlite::Connection, link: &NhisLink) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO nhis_links ({LINK_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
             ON CONFLICT (app_user_id, provider) DO UPDATE SET
                linked = excluded.linked,
                login_method = excluded.login_method,
                login_org_cd = excluded.login_org_cd,
                step_mode = excluded.step_mode,
                step_data = excluded.step_data,
                cookie_data = excluded.cookie_data,
                last_identity_hash = excluded.last_identity_hash,
                last_linked_at = excluded.last_linked_at,
                last_fetched_at = excluded.last_fetched_at,
                last_attempt_at = excluded.last_attempt_at,
                last_error_code = excluded.last_error_code,
                last_error_message = excluded.last_error_message,
                cached_payload = excluded.cached_payload,
                cache_entry_count = excluded.cache_entry_count,
                updated_at = excluded.updated_at"
        ),
        params![
            link.app_user_id,
            link.provider,
            link.linked,
            link.login_method,
            link.login_org_cd,
            link.step_mode,
            encode_opt_json(link.step_data.as_ref()),
            encode_opt_json(link.cookie_data.as_ref()),
            link.last_identity_hash,
            format_opt_ts(link.last_linked_at),
            format_opt_ts(link.last_fetched_at),
            format_opt_ts(link.last_attempt_at),
            link.last_error_code,
            link.last_error_message,
            encode_opt_json(link.cached_payload.as_ref()),
            link.cache_entry_count,
            format_ts(link.created_at),
            format_ts(link.updated_at),
        ],
    )?;
    Ok(())
}

/// Get the link record for a user and provider.
pub async fn get_link(
    db: &Database,
    app_user_id: &str,
    provider: &str,
) -> Result<Option<NhisLink>, NhisError> {
    let app_user_id = app_user_id.to_string();
    let provider = provider.to_string();
    db.connection()
        .call(move |conn| select_link(conn, &app_user_id, &provider))
        .await
        .map_err(crate::database::map_tr_err)
}

/// Apply a partial update, creating a blank record first when none exists.
pub async fn upsert_link(
    db: &Database,
    app_user_id: &str,
    provider: &str,
    patch: LinkPatch,
    now: DateTime<Utc>,
) -> Result<NhisLink, NhisError> {
    let app_user_id = app_user_id.to_string();
    let provider = provider.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut link = select_link(&tx, &app_user_id, &provider)?
                .unwrap_or_else(|| NhisLink::new(&app_user_id, &provider, now));
            link.apply(patch, now);
            write_link(&tx, &link)?;
            tx.commit()?;
            Ok(link)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Unlink the user and delete every fetch cache row they own.
///
/// Returns the number of cache rows removed.
pub async fn clear_link(
    db: &Database,
    app_user_id: &str,
    provider: &str,
    now: DateTime<Utc>,
) -> Result<usize, NhisError> {
    let app_user_id = app_user_id.to_string();
    let provider = provider.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            if let Some(mut link) = select_link(&tx, &app_user_id, &provider)? {
                link.clear(now);
                write_link(&tx, &link)?;
            }
            let removed = tx.execute(
                "DELETE FROM fetch_cache WHERE app_user_id = ?1 AND provider = ?2",
                params![app_user_id, provider],
            )?;
            tx.commit()?;
            Ok(removed)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
