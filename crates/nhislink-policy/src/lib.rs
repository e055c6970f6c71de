// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pure policy functions for NHIS fetches.
//!
//! Everything here is a function of configuration and inputs; nothing
//! performs I/O. The orchestration service composes these gates before any
//! upstream call is issued.

pub mod budget;
pub mod cache;
pub mod cooldown;
pub mod identity;
pub mod request;
pub mod target;

pub use budget::{
    budget_snapshot, budget_window_start, evaluate_fetch_budget, BudgetDecision, BudgetReason,
    BudgetSnapshot, BudgetUsage,
};
pub use cache::resolve_cache_ttl;
pub use cooldown::{
    compute_cooldown_state, compute_force_refresh_cooldown, pick_most_recent, CooldownState,
};
pub use identity::{resolve_identity_hash, IdentityInput, IdentitySource};
pub use request::{
    build_request_hash, dedupe_fetch_targets, normalize_fetch_year_limit,
    resolve_effective_year_limit, RequestHashMeta, DEFAULT_FETCH_TARGETS,
};
pub use target::{is_high_cost_targets_enabled, resolve_allowed_targets, resolve_blocked_targets};
