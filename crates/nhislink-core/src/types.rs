// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the orchestrator crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString, IntoStaticStr};

/// Provider name recorded on links, caches and attempts unless configured otherwise.
pub const DEFAULT_PROVIDER: &str = "HYPHEN_NHIS";

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a [`crate::PluginAdapter`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Upstream,
    Storage,
}

/// Declared cost class of a fetch target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TargetCost {
    Low,
    High,
}

/// A category of remote health data that can be fetched independently.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum FetchTarget {
    /// Medical treatment history.
    Medical,
    /// Prescription and dispensing history.
    Medication,
    /// Per-year checkup result list.
    CheckupList,
    /// Checkup detail for a single listed result.
    CheckupYearly,
    /// Latest checkup overview.
    CheckupOverview,
    /// Health-age estimate.
    HealthAge,
}

impl FetchTarget {
    /// Every target, in declaration order.
    pub const ALL: [FetchTarget; 6] = [
        FetchTarget::Medical,
        FetchTarget::Medication,
        FetchTarget::CheckupList,
        FetchTarget::CheckupYearly,
        FetchTarget::CheckupOverview,
        FetchTarget::HealthAge,
    ];

    /// Wire name of the target (`checkupOverview`, `healthAge`, ...).
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Declared cost class.
    pub const fn cost(self) -> TargetCost {
        match self {
            FetchTarget::CheckupOverview | FetchTarget::Medication => TargetCost::Low,
            FetchTarget::Medical
            | FetchTarget::CheckupList
            | FetchTarget::CheckupYearly
            | FetchTarget::HealthAge => TargetCost::High,
        }
    }

    /// Detail targets page upstream data by year and honour the year limit.
    pub const fn is_detail(self) -> bool {
        matches!(self, FetchTarget::CheckupList | FetchTarget::CheckupYearly)
    }
}

/// Last error recorded on a link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkError {
    pub code: Option<String>,
    pub message: Option<String>,
}

impl LinkError {
    pub fn new(code: Option<String>, message: Option<String>) -> Self {
        Self { code, message }
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_none() && self.message.is_none()
    }
}

/// Persisted NHIS link state, one per `(app_user_id, provider)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NhisLink {
    pub app_user_id: String,
    pub provider: String,
    pub linked: bool,
    pub login_method: Option<String>,
    pub login_org_cd: Option<String>,
    pub step_mode: Option<String>,
    pub step_data: Option<Value>,
    pub cookie_data: Option<Value>,
    pub last_identity_hash: Option<String>,
    pub last_linked_at: Option<DateTime<Utc>>,
    /// Set only after a successful normalize and persist cycle.
    pub last_fetched_at: Option<DateTime<Utc>>,
    /// Set on every uncached attempt; sole input to the force-refresh cooldown.
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error_code: Option<String>,
    pub last_error_message: Option<String>,
    pub cached_payload: Option<Value>,
    pub cache_entry_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NhisLink {
    /// A blank, unlinked record.
    pub fn new(app_user_id: impl Into<String>, provider: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            app_user_id: app_user_id.into(),
            provider: provider.into(),
            linked: false,
            login_method: None,
            login_org_cd: None,
            step_mode: None,
            step_data: None,
            cookie_data: None,
            last_identity_hash: None,
            last_linked_at: None,
            last_fetched_at: None,
            last_attempt_at: None,
            last_error_code: None,
            last_error_message: None,
            cached_payload: None,
            cache_entry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_step_data(&self) -> bool {
        self.step_data.as_ref().is_some_and(|v| !v.is_null())
    }

    pub fn has_cookie_data(&self) -> bool {
        self.cookie_data.as_ref().is_some_and(|v| !v.is_null())
    }

    /// The recorded error, or `None` when neither code nor message is set.
    pub fn last_error(&self) -> Option<LinkError> {
        let err = LinkError::new(self.last_error_code.clone(), self.last_error_message.clone());
        (!err.is_empty()).then_some(err)
    }

    /// Applies a partial update. Unset patch fields leave the record untouched.
    pub fn apply(&mut self, patch: LinkPatch, now: DateTime<Utc>) {
        if let Some(linked) = patch.linked {
            self.linked = linked;
        }
        if let Some(v) = patch.login_method {
            self.login_method = Some(v);
        }
        if let Some(v) = patch.login_org_cd {
            self.login_org_cd = Some(v);
        }
        if let Some(v) = patch.step_mode {
            self.step_mode = Some(v);
        }
        if let Some(v) = patch.step_data {
            self.step_data = Some(v);
        }
        if let Some(v) = patch.cookie_data {
            self.cookie_data = Some(v);
        }
        if let Some(v) = patch.last_identity_hash {
            self.last_identity_hash = Some(v);
        }
        if let Some(v) = patch.last_linked_at {
            self.last_linked_at = Some(v);
        }
        if let Some(v) = patch.last_fetched_at {
            self.last_fetched_at = Some(v);
        }
        if let Some(v) = patch.last_attempt_at {
            self.last_attempt_at = Some(v);
        }
        if let Some(err) = patch.last_error {
            let err = err.unwrap_or_default();
            self.last_error_code = err.code;
            self.last_error_message = err.message;
        }
        if let Some(v) = patch.cached_payload {
            self.cached_payload = Some(v);
        }
        if let Some(v) = patch.cache_entry_count {
            self.cache_entry_count = v;
        }
        self.updated_at = now;
    }

    /// Unlinks the record and wipes cached payload and pending auth state.
    pub fn clear(&mut self, now: DateTime<Utc>) {
        self.linked = false;
        self.login_method = None;
        self.login_org_cd = None;
        self.step_mode = None;
        self.step_data = None;
        self.cookie_data = None;
        self.last_identity_hash = None;
        self.last_error_code = None;
        self.last_error_message = None;
        self.cached_payload = None;
        self.cache_entry_count = 0;
        self.updated_at = now;
    }
}

/// Partial update for an [`NhisLink`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkPatch {
    pub linked: Option<bool>,
    pub login_method: Option<String>,
    pub login_org_cd: Option<String>,
    pub step_mode: Option<String>,
    pub step_data: Option<Value>,
    pub cookie_data: Option<Value>,
    pub last_identity_hash: Option<String>,
    pub last_linked_at: Option<DateTime<Utc>>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// `Some(None)` clears the recorded error.
    pub last_error: Option<Option<LinkError>>,
    pub cached_payload: Option<Value>,
    pub cache_entry_count: Option<i64>,
}

/// One failed target inside a fetch result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchFailure {
    pub target: FetchTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_cd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_msg: Option<String>,
}

/// A persisted fetch result keyed by request fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchCacheEntry {
    pub id: String,
    pub app_user_id: String,
    pub provider: String,
    pub identity_hash: String,
    pub request_hash: String,
    pub request_key: String,
    /// Sorted and deduplicated.
    pub targets: Vec<FetchTarget>,
    pub year_limit: u32,
    pub subject_type: Option<String>,
    pub status_code: u16,
    pub ok: bool,
    pub partial: bool,
    pub payload: Value,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub hit_count: i64,
    pub last_hit_at: Option<DateTime<Utc>>,
}

impl FetchCacheEntry {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Lookup of the latest successful cache entry for an identity and request shape.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityCacheLookup {
    pub app_user_id: String,
    pub identity_hash: String,
    /// Sorted and deduplicated.
    pub targets: Vec<FetchTarget>,
    pub year_limit: u32,
    pub subject_type: Option<String>,
}

/// A recorded fetch attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchAttempt {
    pub app_user_id: String,
    pub provider: String,
    pub identity_hash: String,
    pub request_hash: String,
    pub request_key: String,
    pub force_refresh: bool,
    /// Cached responses are recorded but never count against budgets.
    pub cached: bool,
    pub status_code: u16,
    pub ok: bool,
    pub created_at: DateTime<Utc>,
}

/// Aggregate view of a user's fetch cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_entries: i64,
    pub valid_entries: i64,
    pub latest_fetched_at: Option<DateTime<Utc>>,
    pub latest_expires_at: Option<DateTime<Utc>>,
    pub latest_hit_at: Option<DateTime<Utc>>,
    pub latest_hit_count: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn fetch_target_wire_names() {
        assert_eq!(FetchTarget::CheckupOverview.as_str(), "checkupOverview");
        assert_eq!(FetchTarget::HealthAge.to_string(), "healthAge");
        assert_eq!(
            FetchTarget::from_str("checkupYearly").unwrap(),
            FetchTarget::CheckupYearly
        );
        let json = serde_json::to_string(&FetchTarget::CheckupList).unwrap();
        assert_eq!(json, "\"checkupList\"");
        assert!(FetchTarget::from_str("lifestyle").is_err());
    }

    #[test]
    fn target_costs_and_detail_flags() {
        assert_eq!(FetchTarget::CheckupOverview.cost(), TargetCost::Low);
        assert_eq!(FetchTarget::Medication.cost(), TargetCost::Low);
        assert_eq!(FetchTarget::Medical.cost(), TargetCost::High);
        assert!(FetchTarget::CheckupList.is_detail());
        assert!(FetchTarget::CheckupYearly.is_detail());
        assert!(!FetchTarget::HealthAge.is_detail());
    }

    #[test]
    fn link_patch_sets_and_clears_error() {
        let now = ts("2026-03-01T00:00:00Z");
        let mut link = NhisLink::new("user-1", DEFAULT_PROVIDER, now);
        link.apply(
            LinkPatch {
                linked: Some(true),
                last_error: Some(Some(LinkError::new(Some("E1".into()), Some("bad".into())))),
                ..Default::default()
            },
            now,
        );
        assert!(link.linked);
        assert_eq!(link.last_error().unwrap().code.as_deref(), Some("E1"));

        link.apply(
            LinkPatch {
                last_error: Some(None),
                ..Default::default()
            },
            now,
        );
        assert!(link.last_error().is_none());
        assert!(link.linked, "unset fields must not change");
    }

    #[test]
    fn clear_wipes_session_state() {
        let now = ts("2026-03-01T00:00:00Z");
        let mut link = NhisLink::new("user-1", DEFAULT_PROVIDER, now);
        link.apply(
            LinkPatch {
                linked: Some(true),
                cookie_data: Some(serde_json::json!({"c": 1})),
                step_data: Some(serde_json::json!({"s": 1})),
                cached_payload: Some(serde_json::json!({"ok": true})),
                last_identity_hash: Some("abc".into()),
                last_attempt_at: Some(now),
                ..Default::default()
            },
            now,
        );
        assert!(link.has_cookie_data());

        link.clear(now);
        assert!(!link.linked);
        assert!(!link.has_cookie_data());
        assert!(!link.has_step_data());
        assert!(link.cached_payload.is_none());
        assert!(link.last_identity_hash.is_none());
        assert_eq!(link.last_attempt_at, Some(now), "attempt history survives unlink");
    }

    #[test]
    fn cache_entry_validity_is_strict() {
        let fetched = ts("2026-03-01T00:00:00Z");
        let entry = FetchCacheEntry {
            id: "c1".into(),
            app_user_id: "u".into(),
            provider: DEFAULT_PROVIDER.into(),
            identity_hash: "i".into(),
            request_hash: "r".into(),
            request_key: "k".into(),
            targets: vec![FetchTarget::CheckupOverview],
            year_limit: 0,
            subject_type: None,
            status_code: 200,
            ok: true,
            partial: false,
            payload: serde_json::json!({}),
            fetched_at: fetched,
            expires_at: ts("2026-03-01T01:00:00Z"),
            hit_count: 0,
            last_hit_at: None,
        };
        assert!(entry.is_valid_at(ts("2026-03-01T00:59:59Z")));
        assert!(!entry.is_valid_at(ts("2026-03-01T01:00:00Z")));
    }

    #[test]
    fn fetch_failure_serializes_camel_case() {
        let failure = FetchFailure {
            target: FetchTarget::HealthAge,
            err_cd: Some("E1".into()),
            err_msg: None,
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json, serde_json::json!({"target": "healthAge", "errCd": "E1"}));
    }
}
