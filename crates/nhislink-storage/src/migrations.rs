// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded database migrations using refinery.
//!
//! SQL migration files are compiled into the binary at build time via
//! `embed_migrations!` and applied on every [`crate::Database::open`].

use nhislink_core::NhisError;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Run all pending migrations against the given connection.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), NhisError> {
    let report = embedded::migrations::runner()
        .run(conn)
        .map_err(NhisError::storage)?;
    tracing::debug!(applied = report.applied_migrations().len(), "migrations complete");
    Ok(())
}
