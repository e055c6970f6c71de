// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use chrono::Duration;
use nhislink_config::model::CacheConfig;
use nhislink_core::FetchTarget;

/// Lifetime of a fetch cache entry.
///
/// Failures expire fastest, then partial results; complete results that
/// include year-paged detail targets live longest.
pub fn resolve_cache_ttl(
    config: &CacheConfig,
    targets: &[FetchTarget],
    ok: bool,
    partial: bool,
) -> Duration {
    let minutes = if !ok {
        config.failure_ttl_minutes
    } else if partial {
        config.partial_ttl_minutes
    } else if targets.iter().any(|t| t.is_detail()) {
        config.detail_ttl_minutes
    } else {
        config.summary_ttl_minutes
    };
    Duration::minutes(i64::from(minutes.max(1)))
}
