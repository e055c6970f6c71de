// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Link status payload.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use nhislink_config::NhisConfig;
use nhislink_core::{FetchTarget, IdentityCacheLookup, NhisError, NhisStore};
use nhislink_policy::{
    BudgetSnapshot, IdentityInput, budget_snapshot, budget_window_start,
    compute_force_refresh_cooldown, is_high_cost_targets_enabled, pick_most_recent,
    resolve_allowed_targets, resolve_identity_hash,
};

use crate::helpers::to_iso;

/// Target sets whose cached result counts as a summary, most complete first.
/// Targets are sorted by wire name as the cache stores them.
const SUMMARY_TARGET_SETS: [&[FetchTarget]; 2] = [
    &[FetchTarget::CheckupOverview, FetchTarget::Medication],
    &[FetchTarget::CheckupOverview],
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusError {
    pub code: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceRefreshStatus {
    pub available: bool,
    pub cooldown_seconds: i64,
    pub remaining_seconds: i64,
    pub available_at: Option<String>,
    pub last_attempt_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetPolicyStatus {
    pub high_cost_targets_enabled: bool,
    pub allowed_targets: Vec<FetchTarget>,
}

/// Whether the summary is served from a still-valid entry or only history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarySource {
    Valid,
    History,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub total_entries: i64,
    pub valid_entries: i64,
    pub summary_available: bool,
    pub summary_source: Option<SummarySource>,
    pub latest_fetched_at: Option<String>,
    pub latest_expires_at: Option<String>,
    pub latest_hit_at: Option<String>,
    pub latest_hit_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStatus {
    pub linked: bool,
    pub provider: String,
    pub login_method: Option<String>,
    pub login_org_cd: Option<String>,
    pub last_linked_at: Option<String>,
    pub last_fetched_at: Option<String>,
    pub last_error: Option<StatusError>,
    pub has_step_data: bool,
    pub has_cookie_data: bool,
    /// An auth step is pending and can be confirmed.
    pub pending_auth_ready: bool,
    pub force_refresh: ForceRefreshStatus,
    pub target_policy: TargetPolicyStatus,
    pub cache: CacheStatus,
    pub latest_fetch_attempt_at: Option<String>,
    pub fetch_budget: BudgetSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusPayload {
    pub ok: bool,
    pub status: LinkStatus,
}

async fn summary_source(
    store: &dyn NhisStore,
    config: &NhisConfig,
    app_user_id: &str,
    identity_hash: &str,
    now: DateTime<Utc>,
) -> Result<Option<SummarySource>, NhisError> {
    let mut history = false;
    for targets in SUMMARY_TARGET_SETS {
        let lookup = IdentityCacheLookup {
            app_user_id: app_user_id.to_string(),
            identity_hash: identity_hash.to_string(),
            targets: targets.to_vec(),
            year_limit: 0,
            subject_type: Some(config.fetch.subject_type.clone()),
        };
        match store.latest_cache_for_identity(&lookup).await? {
            Some(entry) if entry.is_valid_at(now) => return Ok(Some(SummarySource::Valid)),
            Some(_) => history = true,
            None => {}
        }
    }
    Ok(history.then_some(SummarySource::History))
}

/// Assemble the status of a user's link at `now`.
pub async fn build_status(
    store: &dyn NhisStore,
    config: &NhisConfig,
    app_user_id: &str,
    now: DateTime<Utc>,
) -> Result<StatusPayload, NhisError> {
    let link = store.get_link(app_user_id).await?;
    let latest_attempt_at = store.latest_attempt_at(app_user_id).await?;
    let stats = store.cache_stats(app_user_id, now).await?;
    let attempts = store
        .attempts_since(app_user_id, budget_window_start(&config.budget, now))
        .await?;

    let (identity_hash, _) = resolve_identity_hash(
        &IdentityInput {
            app_user_id,
            login_org_cd: link.as_ref().and_then(|l| l.login_org_cd.as_deref()),
            stored_identity_hash: link.as_ref().and_then(|l| l.last_identity_hash.as_deref()),
            ..Default::default()
        },
        &config.cache.hash_salt,
    );
    let summary = summary_source(store, config, app_user_id, &identity_hash, now).await?;

    let link_attempt_at = link.as_ref().and_then(|l| l.last_attempt_at);
    let cooldown = compute_force_refresh_cooldown(
        &config.fetch,
        pick_most_recent(link_attempt_at, latest_attempt_at),
        now,
    );

    let linked = link.as_ref().is_some_and(|l| l.linked);
    let has_step_data = link.as_ref().is_some_and(|l| l.has_step_data());

    let status = LinkStatus {
        linked,
        provider: link
            .as_ref()
            .map(|l| l.provider.clone())
            .unwrap_or_else(|| config.hyphen.provider.clone()),
        login_method: link.as_ref().and_then(|l| l.login_method.clone()),
        login_org_cd: link.as_ref().and_then(|l| l.login_org_cd.clone()),
        last_linked_at: link.as_ref().and_then(|l| l.last_linked_at).map(to_iso),
        last_fetched_at: link.as_ref().and_then(|l| l.last_fetched_at).map(to_iso),
        last_error: link.as_ref().and_then(|l| l.last_error()).map(|e| StatusError {
            code: e.code,
            message: e.message,
        }),
        has_step_data,
        has_cookie_data: link.as_ref().is_some_and(|l| l.has_cookie_data()),
        pending_auth_ready: !linked && has_step_data,
        force_refresh: ForceRefreshStatus {
            available: cooldown.available,
            cooldown_seconds: cooldown.cooldown_seconds,
            remaining_seconds: cooldown.remaining_seconds,
            available_at: cooldown.available_at.map(to_iso),
            last_attempt_at: link_attempt_at.map(to_iso),
        },
        target_policy: TargetPolicyStatus {
            high_cost_targets_enabled: is_high_cost_targets_enabled(&config.fetch),
            allowed_targets: resolve_allowed_targets(&config.fetch),
        },
        cache: CacheStatus {
            total_entries: stats.total_entries,
            valid_entries: stats.valid_entries,
            summary_available: summary.is_some(),
            summary_source: summary,
            latest_fetched_at: stats.latest_fetched_at.map(to_iso),
            latest_expires_at: stats.latest_expires_at.map(to_iso),
            latest_hit_at: stats.latest_hit_at.map(to_iso),
            latest_hit_count: stats.latest_hit_count.unwrap_or(0),
        },
        latest_fetch_attempt_at: latest_attempt_at.map(to_iso),
        fetch_budget: budget_snapshot(&config.budget, &attempts, now),
    };

    Ok(StatusPayload { ok: true, status })
}

/// [`build_status`] as JSON.
pub async fn build_status_payload(
    store: &dyn NhisStore,
    config: &NhisConfig,
    app_user_id: &str,
    now: DateTime<Utc>,
) -> Result<Value, NhisError> {
    let payload = build_status(store, config, app_user_id, now).await?;
    serde_json::to_value(payload)
        .map_err(|e| NhisError::Internal(format!("status payload encoding failed: {e}")))
}
