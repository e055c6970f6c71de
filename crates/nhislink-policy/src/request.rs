// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canonical request descriptors: target deduplication, year limits, and the
//! request fingerprint used for cache and in-flight keys.

use nhislink_config::model::FetchConfig;
use nhislink_core::FetchTarget;
use serde::Serialize;

use crate::identity::salted_sha256;

/// Targets fetched when the caller names none.
pub const DEFAULT_FETCH_TARGETS: [FetchTarget; 2] =
    [FetchTarget::CheckupOverview, FetchTarget::Medication];

/// Deterministic fingerprint of a normalized request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestHashMeta {
    pub request_hash: String,
    pub request_key: String,
    /// Sorted by wire name and deduplicated.
    pub normalized_targets: Vec<FetchTarget>,
}

/// Deduplicate requested targets, preserving first-seen order.
///
/// An absent or empty input yields [`DEFAULT_FETCH_TARGETS`]. When
/// `medication` is present without `checkupOverview`, `checkupOverview`
/// is prepended since medication lookups depend on the overview result.
pub fn dedupe_fetch_targets(input: Option<&[FetchTarget]>) -> Vec<FetchTarget> {
    let Some(input) = input.filter(|targets| !targets.is_empty()) else {
        return DEFAULT_FETCH_TARGETS.to_vec();
    };

    let mut out: Vec<FetchTarget> = Vec::with_capacity(input.len() + 1);
    for target in input {
        if !out.contains(target) {
            out.push(*target);
        }
    }

    if out.contains(&FetchTarget::Medication) && !out.contains(&FetchTarget::CheckupOverview) {
        out.insert(0, FetchTarget::CheckupOverview);
    }
    out
}

/// Clamp a requested year limit to `[1, max_year_limit]`.
///
/// Absent or non-finite values fall back to the configured default;
/// fractional values are floored.
pub fn normalize_fetch_year_limit(value: Option<f64>, config: &FetchConfig) -> u32 {
    let max = config.max_year_limit.max(1);
    match value {
        Some(v) if v.is_finite() => v.floor().clamp(1.0, f64::from(max)) as u32,
        _ => config.default_year_limit.clamp(1, max),
    }
}

/// Year limit that actually applies to a target set.
///
/// Zero unless a detail target (one that pages by year) is present, so the
/// request fingerprint stays stable for targets that ignore the limit.
pub fn resolve_effective_year_limit(
    targets: &[FetchTarget],
    value: Option<f64>,
    config: &FetchConfig,
) -> u32 {
    if targets.iter().any(|t| t.is_detail()) {
        normalize_fetch_year_limit(value, config)
    } else {
        0
    }
}

/// Build the request fingerprint for an identity and request shape.
///
/// Identical `(targets, year_limit, subject_type)` for the same identity
/// always yields the same hash, regardless of target order or duplicates.
pub fn build_request_hash(
    salt: &str,
    identity_hash: &str,
    targets: &[FetchTarget],
    year_limit: u32,
    subject_type: Option<&str>,
) -> RequestHashMeta {
    let mut normalized_targets = targets.to_vec();
    normalized_targets.sort_by_key(|t| t.as_str());
    normalized_targets.dedup();

    let joined = if normalized_targets.is_empty() {
        "none".to_string()
    } else {
        normalized_targets
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(",")
    };
    let subject = subject_type.map(str::trim).filter(|s| !s.is_empty()).unwrap_or("-");
    let request_key = format!("targets={joined}|yearLimit={year_limit}|subjectType={subject}");
    let request_hash = salted_sha256(salt, &format!("{identity_hash}|{request_key}"));

    RequestHashMeta {
        request_hash,
        request_key,
        normalized_targets,
    }
}
