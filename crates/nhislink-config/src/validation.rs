// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as year-limit ordering, endpoint path shape, and credential presence.

use crate::diagnostic::ConfigError;
use crate::model::{AuthMode, NhisConfig};

/// Longest duration any window, guard or cooldown may span.
pub const MAX_DURATION_SECS: u64 = 366 * 24 * 60 * 60;

/// Smallest in-process cache bound.
pub const MIN_MEMORY_ENTRIES: usize = 100;

/// Longest rolling budget window in hours.
pub const MAX_BUDGET_WINDOW_HOURS: u32 = 366 * 24;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &NhisConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    let base_url = config.hyphen.base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        fail(format!(
            "hyphen.base_url `{base_url}` must start with http:// or https://"
        ));
    }

    let endpoints = &config.hyphen.endpoints;
    for (name, path) in [
        ("medical", &endpoints.medical),
        ("medication", &endpoints.medication),
        ("checkup_list", &endpoints.checkup_list),
        ("checkup_yearly", &endpoints.checkup_yearly),
        ("checkup_overview", &endpoints.checkup_overview),
        ("health_age", &endpoints.health_age),
    ] {
        if !path.starts_with('/') {
            fail(format!(
                "hyphen.endpoints.{name} `{path}` must be an absolute path starting with `/`"
            ));
        }
    }

    match config.hyphen.auth_mode {
        AuthMode::Header => {
            // Credentials are optional until a fetch is made, but a half-filled pair is a mistake.
            if config.hyphen.user_id.is_some() != config.hyphen.hkey.is_some() {
                fail("hyphen.user_id and hyphen.hkey must be set together".to_string());
            }
        }
        AuthMode::Oauth => {
            if config
                .hyphen
                .access_token
                .as_deref()
                .is_none_or(|t| t.trim().is_empty())
            {
                fail("hyphen.access_token is required when hyphen.auth_mode = \"oauth\"".to_string());
            }
        }
    }

    if config.hyphen.timeout_secs == 0 {
        fail("hyphen.timeout_secs must be at least 1".to_string());
    }

    let fetch = &config.fetch;
    if fetch.max_year_limit == 0 {
        fail("fetch.max_year_limit must be at least 1".to_string());
    }
    if fetch.default_year_limit == 0 || fetch.default_year_limit > fetch.max_year_limit {
        fail(format!(
            "fetch.default_year_limit must be between 1 and fetch.max_year_limit ({}), got {}",
            fetch.max_year_limit, fetch.default_year_limit
        ));
    }
    if fetch.max_yearly_detail_requests == 0 {
        fail("fetch.max_yearly_detail_requests must be at least 1".to_string());
    }
    if fetch.request_window_years == 0 {
        fail("fetch.request_window_years must be at least 1".to_string());
    }
    for (name, secs) in [
        ("force_refresh_cooldown_secs", fetch.force_refresh_cooldown_secs),
        ("force_refresh_cache_guard_secs", fetch.force_refresh_cache_guard_secs),
    ] {
        if secs > MAX_DURATION_SECS {
            fail(format!(
                "fetch.{name} must be at most {MAX_DURATION_SECS}, got {secs}"
            ));
        }
    }

    let cache = &config.cache;
    for (name, minutes) in [
        ("summary_ttl_minutes", cache.summary_ttl_minutes),
        ("detail_ttl_minutes", cache.detail_ttl_minutes),
        ("partial_ttl_minutes", cache.partial_ttl_minutes),
        ("failure_ttl_minutes", cache.failure_ttl_minutes),
    ] {
        if minutes == 0 {
            fail(format!("cache.{name} must be at least 1"));
        }
    }
    if cache.hash_salt.trim().is_empty() {
        fail("cache.hash_salt must not be empty".to_string());
    }
    if cache.memory_max_entries < MIN_MEMORY_ENTRIES {
        fail(format!(
            "cache.memory_max_entries must be at least {MIN_MEMORY_ENTRIES}, got {}",
            cache.memory_max_entries
        ));
    }
    let grace_secs = u64::from(cache.memory_history_grace_minutes) * 60;
    if cache.memory_history_grace_minutes < 30 || grace_secs > MAX_DURATION_SECS {
        fail(format!(
            "cache.memory_history_grace_minutes must be between 30 and {}, got {}",
            MAX_DURATION_SECS / 60,
            cache.memory_history_grace_minutes
        ));
    }

    let budget = &config.budget;
    if !(1..=MAX_BUDGET_WINDOW_HOURS).contains(&budget.window_hours) {
        fail(format!(
            "budget.window_hours must be between 1 and {MAX_BUDGET_WINDOW_HOURS}, got {}",
            budget.window_hours
        ));
    }
    if budget.max_fresh_fetches == 0 || budget.max_force_refreshes == 0 {
        fail("budget.max_fresh_fetches and budget.max_force_refreshes must be at least 1".to_string());
    }

    if config.gateway.host.trim().is_empty() {
        fail("gateway.host must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
