// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! NHIS fetch execution and orchestration.
//!
//! [`NhisFetchService`] is the entry point: it applies the target, link,
//! cache, cooldown, session and budget gates, deduplicates concurrent
//! identical requests, runs the [`executor`] and persists the outcome.
//! Cached results are looked up in [`memory_cache`] before SQLite. The
//! [`link`] module adds the easy-auth `init` and `sign` steps that make a
//! user's link usable.

pub mod executor;
pub mod helpers;
pub mod link;
pub mod memory_cache;
pub mod service;
pub mod status;

pub use executor::{ALL_FAILED_MESSAGE, ExecuteInput, ExecuteOutput, execute_nhis_fetch};
pub use helpers::RequestDefaults;
pub use link::{
    EasyAuthIdentity, INIT_FAILED_ERR_CODE, INIT_INFLIGHT_NAMESPACE, InitRequest,
    SIGN_FAILED_ERR_CODE, SIGN_INFLIGHT_NAMESPACE, SignRequest,
};
pub use memory_cache::{FetchMemoryCache, MemoryHit, MemoryLookup, MemorySource};
pub use service::{
    AUTH_EXPIRED_CODE, FETCH_BUDGET_EXCEEDED_ERR_CODE, FETCH_INFLIGHT_NAMESPACE,
    FORCE_REFRESH_COOLDOWN_ERR_CODE, FetchOutcome, FetchRequest, INIT_REQUIRED_ERR_CODE,
    NhisFetchService, TARGET_POLICY_BLOCKED_ERR_CODE,
};
pub use status::{StatusPayload, build_status, build_status_payload};
