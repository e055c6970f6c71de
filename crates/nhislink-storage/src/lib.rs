// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the NHIS fetch orchestrator.
//!
//! Holds link state, the fetch cache and the fetch attempt log in a single
//! database file. All writes go through one tokio-rusqlite background thread.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use adapter::SqliteNhisStore;
pub use database::Database;
