// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the NHIS fetch orchestrator.
//!
//! This crate provides the foundational trait definitions, error types, and
//! domain types shared by every other crate in the workspace. The upstream
//! client and the persistence backend both implement traits defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{NhisError, UpstreamError, SESSION_EXPIRED_ERR_CODE};
pub use types::{
    AdapterType, CacheStats, FetchAttempt, FetchCacheEntry, FetchFailure, FetchTarget,
    HealthStatus, IdentityCacheLookup, LinkError, LinkPatch, NhisLink, TargetCost,
    DEFAULT_PROVIDER,
};

pub use traits::{NhisStore, NhisUpstream, PluginAdapter};
