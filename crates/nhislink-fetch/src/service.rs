// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fetch orchestration: policy gates, cache, budget, dedup, execution and
//! persistence composed into the operations the HTTP surface exposes.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};
use dashmap::DashMap;
use uuid::Uuid;

use nhislink_config::NhisConfig;
use nhislink_core::{
    FetchAttempt, FetchCacheEntry, FetchFailure, FetchTarget, IdentityCacheLookup, LinkError,
    LinkPatch, NhisError, NhisStore, NhisUpstream, SESSION_EXPIRED_ERR_CODE,
};
use nhislink_policy::{
    BudgetDecision, IdentityInput, RequestHashMeta, budget_window_start,
    build_request_hash, compute_force_refresh_cooldown, dedupe_fetch_targets,
    evaluate_fetch_budget, pick_most_recent, resolve_blocked_targets, resolve_cache_ttl,
    resolve_effective_year_limit, resolve_identity_hash,
};
use nhislink_resilience::{InFlightError, InFlightRegistry};

use crate::executor::{ExecuteInput, execute_nhis_fetch};
use crate::helpers::{
    RequestDefaults, build_base_payload, build_detail_payload, extract_session_artifacts,
    to_iso, with_fields,
};
use crate::link::EasyAuthIdentity;
use crate::memory_cache::{FetchMemoryCache, MemoryLookup, MemorySource};

/// Namespace of fetch executions in the in-flight registry.
pub const FETCH_INFLIGHT_NAMESPACE: &str = "nhis-fetch";

pub const TARGET_POLICY_BLOCKED_ERR_CODE: &str = "NHIS_TARGET_POLICY_BLOCKED";
pub const INIT_REQUIRED_ERR_CODE: &str = "NHIS_INIT_REQUIRED";
pub const FORCE_REFRESH_COOLDOWN_ERR_CODE: &str = "NHIS_FORCE_REFRESH_COOLDOWN";
pub const FETCH_BUDGET_EXCEEDED_ERR_CODE: &str = "NHIS_FETCH_BUDGET_EXCEEDED";
pub const AUTH_EXPIRED_CODE: &str = "NHIS_AUTH_EXPIRED";

const TARGET_POLICY_BLOCKED_MESSAGE: &str = "현재 비용 정책에서는 요약 대상만 조회할 수 있어요.";
pub(crate) const INIT_REQUIRED_MESSAGE: &str =
    "연동이 완료되지 않았습니다. 카카오 인증 요청(init)부터 진행해 주세요.";
const SESSION_MISSING_MESSAGE: &str =
    "인증 세션이 만료되어 조회를 진행할 수 없습니다. 인증을 다시 진행해 주세요.";
const AUTH_EXPIRED_MESSAGE: &str = "인증 세션이 만료됐거나 인증 요청이 유효하지 않습니다. 카카오 인증 요청(init)부터 다시 진행해 주세요.";
const FORCE_REFRESH_COOLDOWN_MESSAGE: &str =
    "방금 조회한 데이터가 있어요. 잠시 후 다시 새로고침해 주세요.";
const FETCH_BUDGET_EXCEEDED_MESSAGE: &str =
    "조회 가능한 횟수를 모두 사용했어요. 잠시 후 다시 시도해 주세요.";
const FETCH_FAILED_FALLBACK: &str = "Fetch failed";

/// Request dates follow the relay's calendar (KST).
const RELAY_UTC_OFFSET_HOURS: i64 = 9;

/// A fetch as requested by the caller, before any policy is applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchRequest {
    pub app_user_id: String,
    pub targets: Option<Vec<FetchTarget>>,
    pub year_limit: Option<f64>,
    pub force_refresh: bool,
}

/// HTTP status and JSON body of a fetch, rejections included.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub status_code: u16,
    pub payload: Value,
}

impl FetchOutcome {
    pub(crate) fn rejected(status_code: u16, error: &str, err_cd: &str, extra: &[(&str, Value)]) -> Self {
        let base = json!({"ok": false, "error": error, "errCd": err_cd});
        Self {
            status_code,
            payload: with_fields(&base, extra),
        }
    }
}

/// Where a cached response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheSource {
    /// In-process copy, checked before the database.
    Memory(MemorySource),
    /// Exact request fingerprint.
    Db,
    /// Newest valid entry for the same identity and request shape.
    DbIdentity,
    /// Newest entry for the identity, expired or not; forced refreshes only.
    DbHistory,
}

impl CacheSource {
    fn as_str(self) -> &'static str {
        match self {
            CacheSource::Memory(source) => source.as_str(),
            CacheSource::Db => "db",
            CacheSource::DbIdentity => "db-identity",
            CacheSource::DbHistory => "db-history",
        }
    }
}

/// Everything resolved by the gates that the execution needs.
#[derive(Debug, Clone)]
struct FetchContext {
    app_user_id: String,
    provider: String,
    identity_hash: String,
    identity_changed: bool,
    request: RequestHashMeta,
    targets: Vec<FetchTarget>,
    effective_year_limit: u32,
    subject_type: String,
    force_refresh: bool,
}

impl FetchContext {
    fn attempt(&self, cached: bool, status_code: u16, ok: bool, at: DateTime<Utc>) -> FetchAttempt {
        FetchAttempt {
            app_user_id: self.app_user_id.clone(),
            provider: self.provider.clone(),
            identity_hash: self.identity_hash.clone(),
            request_hash: self.request.request_hash.clone(),
            request_key: self.request.request_key.clone(),
            force_refresh: self.force_refresh,
            cached,
            status_code,
            ok,
            created_at: at,
        }
    }

    fn identity_lookup(&self) -> IdentityCacheLookup {
        IdentityCacheLookup {
            app_user_id: self.app_user_id.clone(),
            identity_hash: self.identity_hash.clone(),
            targets: self.request.normalized_targets.clone(),
            year_limit: self.effective_year_limit,
            subject_type: Some(self.subject_type.clone()),
        }
    }
}

pub(crate) fn from_inflight(err: InFlightError<NhisError>) -> NhisError {
    match err {
        InFlightError::Failed(shared) => NhisError::Shared(shared),
        InFlightError::Aborted(msg) => NhisError::Internal(format!("execution aborted: {msg}")),
    }
}

/// True when a failed fetch should send the caller back through login.
fn is_auth_expired(payload: &Value, first_failed: Option<&FetchFailure>) -> bool {
    let expired = |code: &str| {
        let code = code.trim().to_uppercase();
        code == SESSION_EXPIRED_ERR_CODE || code == INIT_REQUIRED_ERR_CODE
    };
    if first_failed.and_then(|f| f.err_cd.as_deref()).is_some_and(expired) {
        return true;
    }
    payload
        .get("failed")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.get("errCd").and_then(Value::as_str))
        .any(expired)
}

pub(crate) fn relay_today(now: DateTime<Utc>) -> chrono::NaiveDate {
    (now + Duration::hours(RELAY_UTC_OFFSET_HOURS)).date_naive()
}

/// Orchestrates NHIS fetches for app users.
///
/// Cheap to clone; all state is behind `Arc`s.
#[derive(Clone)]
pub struct NhisFetchService {
    pub(crate) store: Arc<dyn NhisStore>,
    pub(crate) upstream: Arc<dyn NhisUpstream>,
    pub(crate) inflight: Arc<InFlightRegistry<FetchOutcome, NhisError>>,
    memory: Arc<FetchMemoryCache>,
    /// Identities of easy-auth requests awaiting `sign`, by app user.
    pub(crate) pending: Arc<DashMap<String, EasyAuthIdentity>>,
    pub(crate) config: Arc<NhisConfig>,
}

impl NhisFetchService {
    pub fn new(
        store: Arc<dyn NhisStore>,
        upstream: Arc<dyn NhisUpstream>,
        config: Arc<NhisConfig>,
    ) -> Self {
        Self {
            store,
            upstream,
            inflight: Arc::new(InFlightRegistry::new()),
            memory: Arc::new(FetchMemoryCache::from_config(&config.cache)),
            pending: Arc::new(DashMap::new()),
            config,
        }
    }

    /// Share an in-flight registry with other services of this process.
    pub fn with_inflight(mut self, inflight: Arc<InFlightRegistry<FetchOutcome, NhisError>>) -> Self {
        self.inflight = inflight;
        self
    }

    pub fn config(&self) -> &NhisConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn NhisStore> {
        &self.store
    }

    /// Status payload for the user's link.
    pub async fn status(&self, app_user_id: &str) -> Result<Value, NhisError> {
        crate::status::build_status_payload(self.store.as_ref(), &self.config, app_user_id, Utc::now())
            .await
    }

    /// Unlink the user and drop their cached fetches and pending auth.
    pub async fn unlink(&self, app_user_id: &str) -> Result<Value, NhisError> {
        self.store.clear_link(app_user_id).await?;
        self.memory.clear_user(app_user_id);
        self.pending.remove(app_user_id);
        info!(app_user_id, "NHIS link cleared");
        Ok(json!({"ok": true}))
    }

    /// Run a fetch through every gate, then execute it once per identical
    /// concurrent request.
    ///
    /// Gate rejections are `Ok` outcomes with a 4xx status; `Err` is reserved
    /// for storage and internal failures.
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchOutcome, NhisError> {
        let fetch_config = &self.config.fetch;
        let app_user_id = request.app_user_id.as_str();
        let targets = dedupe_fetch_targets(request.targets.as_deref());

        let blocked = resolve_blocked_targets(fetch_config, &targets);
        if !blocked.is_empty() {
            let names: Vec<&str> = blocked.iter().map(|t| t.as_str()).collect();
            info!(app_user_id, blocked = ?names, "fetch blocked by target policy");
            return Ok(FetchOutcome::rejected(
                400,
                TARGET_POLICY_BLOCKED_MESSAGE,
                TARGET_POLICY_BLOCKED_ERR_CODE,
                &[
                    ("errMsg", json!(format!("Blocked targets: {}", names.join(", ")))),
                    ("blockedTargets", json!(names)),
                ],
            ));
        }

        let Some(link) = self.store.get_link(app_user_id).await?.filter(|l| l.linked) else {
            debug!(app_user_id, "fetch rejected, link not initialized");
            return Ok(FetchOutcome::rejected(
                409,
                INIT_REQUIRED_MESSAGE,
                INIT_REQUIRED_ERR_CODE,
                &[],
            ));
        };

        let now = Utc::now();
        let effective_year_limit =
            resolve_effective_year_limit(&targets, request.year_limit, fetch_config);
        let (identity_hash, identity_source) = resolve_identity_hash(
            &IdentityInput {
                app_user_id,
                login_org_cd: link.login_org_cd.as_deref(),
                stored_identity_hash: link.last_identity_hash.as_deref(),
                ..Default::default()
            },
            &self.config.cache.hash_salt,
        );
        let subject_type = fetch_config.subject_type.clone();
        let meta = build_request_hash(
            &self.config.cache.hash_salt,
            &identity_hash,
            &targets,
            effective_year_limit,
            Some(&subject_type),
        );
        debug!(
            app_user_id,
            request_hash = %meta.request_hash,
            identity_source = ?identity_source,
            "resolved fetch request"
        );

        let ctx = FetchContext {
            app_user_id: app_user_id.to_string(),
            provider: link.provider.clone(),
            identity_changed: link.last_identity_hash.as_deref() != Some(identity_hash.as_str()),
            identity_hash,
            request: meta,
            targets,
            effective_year_limit,
            subject_type,
            force_refresh: request.force_refresh,
        };

        if let Some(served) = self.serve_from_cache(&ctx, now).await? {
            return Ok(served);
        }

        if ctx.force_refresh {
            let latest = self.store.latest_attempt_at(app_user_id).await?;
            let cooldown = compute_force_refresh_cooldown(
                fetch_config,
                pick_most_recent(link.last_attempt_at, latest),
                now,
            );
            if !cooldown.available {
                info!(app_user_id, remaining = cooldown.remaining_seconds, "force refresh cooling down");
                return Ok(FetchOutcome::rejected(
                    409,
                    FORCE_REFRESH_COOLDOWN_MESSAGE,
                    FORCE_REFRESH_COOLDOWN_ERR_CODE,
                    &[
                        ("remainingSeconds", json!(cooldown.remaining_seconds)),
                        ("availableAt", json!(cooldown.available_at.map(to_iso))),
                        ("cooldownSeconds", json!(cooldown.cooldown_seconds)),
                    ],
                ));
            }
        }

        if !link.has_cookie_data() {
            info!(app_user_id, "fetch rejected, no upstream session");
            return Ok(FetchOutcome::rejected(
                401,
                SESSION_MISSING_MESSAGE,
                SESSION_EXPIRED_ERR_CODE,
                &[("errMsg", json!("Missing NHIS cookie session."))],
            ));
        }

        let attempts = self
            .store
            .attempts_since(app_user_id, budget_window_start(&self.config.budget, now))
            .await?;
        if let BudgetDecision::Blocked {
            reason,
            retry_after_secs,
            snapshot,
        } = evaluate_fetch_budget(&self.config.budget, &attempts, ctx.force_refresh, now)
        {
            info!(app_user_id, reason = ?reason, retry_after_secs, "fetch budget exhausted");
            return Ok(FetchOutcome::rejected(
                429,
                FETCH_BUDGET_EXCEEDED_MESSAGE,
                FETCH_BUDGET_EXCEEDED_ERR_CODE,
                &[
                    ("retryAfterSec", json!(retry_after_secs)),
                    ("reason", json!(reason)),
                    ("fetchBudget", json!(snapshot)),
                ],
            ));
        }

        let defaults = RequestDefaults::for_day(fetch_config, relay_today(now));
        let base_payload = build_base_payload(&link, &defaults);
        let input = ExecuteInput {
            targets: ctx.targets.clone(),
            effective_year_limit: ctx.effective_year_limit,
            detail_payload: build_detail_payload(&base_payload),
            base_payload,
            defaults,
        };

        let key = format!("{}|{}", ctx.app_user_id, ctx.request.request_hash);
        let this = self.clone();
        self.inflight
            .run(FETCH_INFLIGHT_NAMESPACE, &key, move || async move {
                this.execute_and_persist(ctx, input).await
            })
            .await
            .map_err(from_inflight)
    }

    /// Serve a stored result instead of calling the relay.
    ///
    /// The in-process cache is consulted first, then the database. Plain
    /// requests take a valid exact-fingerprint entry, else the newest valid
    /// entry of the same identity and shape. Forced requests take a
    /// successful entry only while it is younger than the cache guard.
    async fn serve_from_cache(
        &self,
        ctx: &FetchContext,
        now: DateTime<Utc>,
    ) -> Result<Option<FetchOutcome>, NhisError> {
        let guard_secs = i64::try_from(self.config.fetch.force_refresh_cache_guard_secs)
            .unwrap_or(i64::MAX);
        if ctx.force_refresh && guard_secs <= 0 {
            return Ok(None);
        }

        let lookup = if ctx.force_refresh {
            MemoryLookup {
                allow_history: true,
                max_age_secs: Some(guard_secs),
            }
        } else {
            MemoryLookup::default()
        };
        let memory_hit = self
            .memory
            .read(&ctx.request.request_hash, &ctx.identity_lookup(), lookup, now)
            .filter(|hit| !ctx.force_refresh || hit.entry.ok);

        let (entry, source, guarded_age) = match memory_hit {
            Some(hit) => (
                hit.entry,
                CacheSource::Memory(hit.source),
                ctx.force_refresh.then_some(hit.age_secs),
            ),
            None => match self.lookup_stored(ctx, now, guard_secs).await? {
                Some(found) => found,
                None => return Ok(None),
            },
        };

        let Some(stored) = entry
            .payload
            .as_object()
            .filter(|p| p.get("ok").is_some_and(Value::is_boolean))
        else {
            warn!(app_user_id = %ctx.app_user_id, cache_id = %entry.id, "ignoring malformed cached payload");
            return Ok(None);
        };

        let mut payload: Map<String, Value> = stored.clone();
        payload.insert("cached".into(), Value::Bool(true));
        payload.insert(
            "cache".into(),
            json!({
                "source": source.as_str(),
                "stale": !entry.is_valid_at(now),
                "fetchedAt": to_iso(entry.fetched_at),
                "expiresAt": to_iso(entry.expires_at),
            }),
        );
        if let Some(age) = guarded_age {
            payload.insert("forceRefreshGuarded".into(), Value::Bool(true));
            payload.insert("forceRefreshAgeSeconds".into(), json!(age));
            payload.insert("forceRefreshGuardSeconds".into(), json!(guard_secs));
        }

        if !matches!(source, CacheSource::Memory(_)) {
            self.memory.write(entry.clone(), now);
        }
        self.store.mark_cache_hit(&entry.id, now).await?;

        let mut patch = LinkPatch::default();
        if ctx.identity_changed {
            patch.last_identity_hash = Some(ctx.identity_hash.clone());
        }
        if entry.ok {
            patch.last_error = Some(None);
        }
        if patch != LinkPatch::default() {
            self.store.upsert_link(&ctx.app_user_id, patch).await?;
        }

        self.record_attempt(&ctx.attempt(true, entry.status_code, entry.ok, now))
            .await;
        info!(
            app_user_id = %ctx.app_user_id,
            request_hash = %ctx.request.request_hash,
            source = source.as_str(),
            status = entry.status_code,
            "served fetch from cache"
        );
        Ok(Some(FetchOutcome {
            status_code: entry.status_code,
            payload: Value::Object(payload),
        }))
    }

    async fn lookup_stored(
        &self,
        ctx: &FetchContext,
        now: DateTime<Utc>,
        guard_secs: i64,
    ) -> Result<Option<(FetchCacheEntry, CacheSource, Option<i64>)>, NhisError> {
        if ctx.force_refresh {
            let Some(entry) = self.store.latest_cache_for_identity(&ctx.identity_lookup()).await?
            else {
                return Ok(None);
            };
            let age = (now - entry.fetched_at).num_seconds().max(0);
            if age > guard_secs {
                return Ok(None);
            }
            let source = if entry.is_valid_at(now) {
                CacheSource::DbIdentity
            } else {
                CacheSource::DbHistory
            };
            return Ok(Some((entry, source, Some(age))));
        }

        if let Some(entry) = self
            .store
            .get_valid_cache(&ctx.app_user_id, &ctx.request.request_hash, now)
            .await?
        {
            return Ok(Some((entry, CacheSource::Db, None)));
        }
        Ok(self
            .store
            .latest_cache_for_identity(&ctx.identity_lookup())
            .await?
            .filter(|e| e.is_valid_at(now))
            .map(|entry| (entry, CacheSource::DbIdentity, None)))
    }

    async fn execute_and_persist(
        &self,
        ctx: FetchContext,
        input: ExecuteInput,
    ) -> Result<FetchOutcome, NhisError> {
        let output = match execute_nhis_fetch(
            self.upstream.as_ref(),
            &self.config.hyphen.endpoints,
            &self.config.fetch,
            &input,
        )
        .await
        {
            Ok(output) => output,
            Err(err) => {
                error!(app_user_id = %ctx.app_user_id, "fetch execution failed: {err}");
                self.record_attempt(&ctx.attempt(false, 500, false, Utc::now()))
                    .await;
                return Err(err);
            }
        };

        let now = Utc::now();
        let mut payload = output.payload;
        let ok = payload.get("ok").and_then(Value::as_bool).unwrap_or(false);
        let partial = payload.get("partial").and_then(Value::as_bool).unwrap_or(false);
        let auth_expired = !ok && is_auth_expired(&payload, output.first_failed.as_ref());
        let status_code = match (ok, auth_expired) {
            (true, _) => 200,
            (false, true) => 401,
            (false, false) => 502,
        };
        if auth_expired {
            payload = with_fields(
                &payload,
                &[
                    ("code", json!(AUTH_EXPIRED_CODE)),
                    ("reason", json!("nhis_auth_expired")),
                    ("nextAction", json!("init")),
                    ("error", json!(AUTH_EXPIRED_MESSAGE)),
                ],
            );
        }

        let ttl = resolve_cache_ttl(&self.config.cache, &ctx.request.normalized_targets, ok, partial);
        let entry = FetchCacheEntry {
            id: Uuid::new_v4().to_string(),
            app_user_id: ctx.app_user_id.clone(),
            provider: ctx.provider.clone(),
            identity_hash: ctx.identity_hash.clone(),
            request_hash: ctx.request.request_hash.clone(),
            request_key: ctx.request.request_key.clone(),
            targets: ctx.request.normalized_targets.clone(),
            year_limit: ctx.effective_year_limit,
            subject_type: Some(ctx.subject_type.clone()),
            status_code,
            ok,
            partial,
            payload: payload.clone(),
            fetched_at: now,
            expires_at: now + ttl,
            hit_count: 0,
            last_hit_at: None,
        };
        let mut patch = LinkPatch {
            last_identity_hash: Some(ctx.identity_hash.clone()),
            last_attempt_at: Some(now),
            ..Default::default()
        };
        if ok {
            let artifacts = extract_session_artifacts(&payload);
            patch.last_fetched_at = Some(now);
            patch.last_error = Some(None);
            patch.cached_payload = payload.pointer("/data/normalized").cloned();
            patch.cookie_data = artifacts.cookie_data;
            patch.step_data = artifacts.step_data;
        } else {
            let first = output.first_failed.as_ref();
            let message = first
                .and_then(|f| f.err_msg.clone())
                .unwrap_or_else(|| FETCH_FAILED_FALLBACK.to_string());
            patch.last_error = Some(Some(LinkError::new(
                first.and_then(|f| f.err_cd.clone()),
                Some(message),
            )));
        }

        if let Err(err) = self.persist_outcome(&ctx, &entry, patch).await {
            error!(app_user_id = %ctx.app_user_id, "failed to persist fetch outcome: {err}");
            self.record_failed_persist(&ctx, now).await;
            return Err(err);
        }
        self.memory.write(entry, now);
        self.record_attempt(&ctx.attempt(false, status_code, ok, now))
            .await;

        info!(
            app_user_id = %ctx.app_user_id,
            request_hash = %ctx.request.request_hash,
            status = status_code,
            ok,
            partial,
            "fetch executed"
        );
        Ok(FetchOutcome {
            status_code,
            payload,
        })
    }

    /// Store the cache entry and apply the link patch with fresh cache stats.
    async fn persist_outcome(
        &self,
        ctx: &FetchContext,
        entry: &FetchCacheEntry,
        mut patch: LinkPatch,
    ) -> Result<(), NhisError> {
        self.store.save_cache(entry).await?;
        let stats = self.store.cache_stats(&ctx.app_user_id, entry.fetched_at).await?;
        patch.cache_entry_count = Some(stats.total_entries);
        self.store.upsert_link(&ctx.app_user_id, patch).await?;
        Ok(())
    }

    /// The relay was called even though nothing was stored, so the attempt
    /// still counts toward cooldown and budget.
    async fn record_failed_persist(&self, ctx: &FetchContext, now: DateTime<Utc>) {
        self.record_attempt(&ctx.attempt(false, 500, false, now)).await;
        let patch = LinkPatch {
            last_attempt_at: Some(now),
            ..Default::default()
        };
        if let Err(err) = self.store.upsert_link(&ctx.app_user_id, patch).await {
            warn!(app_user_id = %ctx.app_user_id, "failed to stamp last attempt: {err}");
        }
    }

    async fn record_attempt(&self, attempt: &FetchAttempt) {
        if let Err(err) = self.store.record_attempt(attempt).await {
            warn!(app_user_id = %attempt.app_user_id, "failed to record fetch attempt: {err}");
        }
    }
}
