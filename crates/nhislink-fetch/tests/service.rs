// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fetch service flows over a temp SQLite store and a scripted relay.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use nhislink_config::NhisConfig;
use nhislink_core::{FetchTarget, LinkPatch, NhisStore};
use nhislink_fetch::{FetchRequest, NhisFetchService};
use nhislink_test_utils::{FailingStore, MockUpstream, TestStore, relay_error, relay_ok};

const USER: &str = "user-1";

struct Harness {
    service: NhisFetchService,
    upstream: MockUpstream,
    store: Arc<dyn NhisStore>,
    _db: TestStore,
}

impl Harness {
    async fn new(config: NhisConfig, upstream: MockUpstream) -> Self {
        let db = TestStore::new().await.unwrap();
        let store: Arc<dyn NhisStore> = db.store.clone();
        Self::over(store, db, config, upstream)
    }

    fn over(store: Arc<dyn NhisStore>, db: TestStore, config: NhisConfig, upstream: MockUpstream) -> Self {
        let service = NhisFetchService::new(
            store.clone(),
            Arc::new(upstream.clone()),
            Arc::new(config),
        );
        Self {
            service,
            upstream,
            store,
            _db: db,
        }
    }

    async fn with_defaults() -> Self {
        Self::new(NhisConfig::default(), MockUpstream::new()).await
    }

    async fn link(&self, with_cookie: bool) {
        self.store
            .upsert_link(
                USER,
                LinkPatch {
                    linked: Some(true),
                    login_method: Some("EASY".into()),
                    login_org_cd: Some("kakao".into()),
                    cookie_data: with_cookie.then(|| json!({"session": "abc"})),
                    last_linked_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    /// A new service over the same store and relay, with nothing in memory.
    fn restarted(&self) -> NhisFetchService {
        NhisFetchService::new(
            self.store.clone(),
            Arc::new(self.upstream.clone()),
            Arc::new(self.service.config().clone()),
        )
    }

    fn endpoints(&self) -> &nhislink_config::model::EndpointConfig {
        &self.service.config().hyphen.endpoints
    }
}

fn request(targets: Option<Vec<FetchTarget>>, force_refresh: bool) -> FetchRequest {
    FetchRequest {
        app_user_id: USER.into(),
        targets,
        year_limit: None,
        force_refresh,
    }
}

fn overview_with_rows() -> Value {
    relay_ok(json!({"list": [{
        "year": "2025",
        "chkResult": [{"inspectItem": "혈압", "result": "120/80"}]
    }]}))
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

#[tokio::test]
async fn high_cost_targets_are_blocked_by_default() {
    let h = Harness::with_defaults().await;

    let out = h
        .service
        .fetch(request(Some(vec![FetchTarget::Medical, FetchTarget::CheckupOverview]), false))
        .await
        .unwrap();

    assert_eq!(out.status_code, 400);
    assert_eq!(out.payload["errCd"], json!("NHIS_TARGET_POLICY_BLOCKED"));
    assert_eq!(out.payload["blockedTargets"], json!(["medical"]));
    assert_eq!(out.payload["errMsg"], json!("Blocked targets: medical"));
    assert_eq!(h.upstream.call_count().await, 0);
}

#[tokio::test]
async fn unlinked_user_must_init_first() {
    let h = Harness::with_defaults().await;

    let out = h.service.fetch(request(None, false)).await.unwrap();

    assert_eq!(out.status_code, 409);
    assert_eq!(out.payload["ok"], json!(false));
    assert_eq!(out.payload["errCd"], json!("NHIS_INIT_REQUIRED"));
    assert_eq!(h.upstream.call_count().await, 0);
}

#[tokio::test]
async fn missing_cookie_session_is_rejected() {
    let h = Harness::with_defaults().await;
    h.link(false).await;

    let out = h.service.fetch(request(None, false)).await.unwrap();

    assert_eq!(out.status_code, 401);
    assert_eq!(out.payload["errCd"], json!("NHIS_LOGIN_SESSION_EXPIRED"));
    assert_eq!(out.payload["errMsg"], json!("Missing NHIS cookie session."));
    assert_eq!(h.upstream.call_count().await, 0);
}

#[tokio::test]
async fn successful_fetch_persists_then_serves_from_cache() {
    let h = Harness::with_defaults().await;
    h.link(true).await;
    let overview = h.endpoints().checkup_overview.clone();
    h.upstream.push_ok(&overview, overview_with_rows()).await;

    let first = h.service.fetch(request(None, false)).await.unwrap();
    assert_eq!(first.status_code, 200);
    assert_eq!(first.payload["ok"], json!(true));
    assert!(first.payload.get("cached").is_none());

    let calls = h.upstream.calls_to(&overview).await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].payload["cookieData"], json!({"session": "abc"}));
    assert_eq!(calls[0].payload["loginOrgCd"], json!("kakao"));

    let link = h.store.get_link(USER).await.unwrap().unwrap();
    assert!(link.last_fetched_at.is_some());
    assert!(link.last_attempt_at.is_some());
    assert!(link.last_identity_hash.is_some());
    assert!(link.last_error().is_none());
    assert_eq!(link.cache_entry_count, 1);
    assert_eq!(link.cached_payload, Some(first.payload["data"]["normalized"].clone()));

    let second = h.service.fetch(request(None, false)).await.unwrap();
    assert_eq!(second.status_code, 200);
    assert_eq!(second.payload["cached"], json!(true));
    assert_eq!(second.payload["cache"]["source"], json!("memory"));
    assert_eq!(second.payload["cache"]["stale"], json!(false));
    assert_eq!(second.payload["data"], first.payload["data"]);
    assert_eq!(h.upstream.call_count().await, 1);

    let uncached = h.store.attempts_since(USER, epoch()).await.unwrap();
    assert_eq!(uncached.len(), 1);
    assert!(!uncached[0].cached);

    let recent = h.store.recent_attempts(USER, 10).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert!(recent[0].cached);
    assert_eq!(recent[0].status_code, 200);
    assert_eq!(recent[0].request_hash, recent[1].request_hash);

    let stats = h.store.cache_stats(USER, Utc::now()).await.unwrap();
    assert_eq!(stats.latest_hit_count, Some(1));
}

#[tokio::test]
async fn forced_refresh_right_after_success_is_guarded() {
    let h = Harness::with_defaults().await;
    h.link(true).await;
    let overview = h.endpoints().checkup_overview.clone();
    h.upstream.push_ok(&overview, overview_with_rows()).await;

    h.service.fetch(request(None, false)).await.unwrap();
    let forced = h.service.fetch(request(None, true)).await.unwrap();

    assert_eq!(forced.status_code, 200);
    assert_eq!(forced.payload["cached"], json!(true));
    assert_eq!(forced.payload["forceRefreshGuarded"], json!(true));
    assert_eq!(forced.payload["forceRefreshGuardSeconds"], json!(30));
    assert_eq!(forced.payload["cache"]["source"], json!("memory"));
    assert!(forced.payload["forceRefreshAgeSeconds"].as_i64().is_some_and(|age| age <= 30));
    assert_eq!(h.upstream.call_count().await, 1);
}

#[tokio::test]
async fn stored_results_are_served_after_a_restart_then_kept_in_memory() {
    let h = Harness::with_defaults().await;
    h.link(true).await;
    let overview = h.endpoints().checkup_overview.clone();
    h.upstream.push_ok(&overview, overview_with_rows()).await;
    h.service.fetch(request(None, false)).await.unwrap();

    let restarted = h.restarted();
    let from_db = restarted.fetch(request(None, false)).await.unwrap();
    assert_eq!(from_db.status_code, 200);
    assert_eq!(from_db.payload["cache"]["source"], json!("db"));
    let from_memory = restarted.fetch(request(None, false)).await.unwrap();
    assert_eq!(from_memory.payload["cache"]["source"], json!("memory"));
    assert_eq!(from_memory.payload["data"], from_db.payload["data"]);

    let guarded = h.restarted().fetch(request(None, true)).await.unwrap();
    assert_eq!(guarded.payload["cache"]["source"], json!("db-identity"));
    assert_eq!(guarded.payload["forceRefreshGuarded"], json!(true));

    assert_eq!(h.upstream.call_count().await, 1);
    let stats = h.store.cache_stats(USER, Utc::now()).await.unwrap();
    assert_eq!(stats.latest_hit_count, Some(3));
}

#[tokio::test]
async fn failed_persistence_still_counts_the_attempt() {
    let db = TestStore::new().await.unwrap();
    let failing = Arc::new(FailingStore::new(db.store.clone()));
    let store: Arc<dyn NhisStore> = failing.clone();
    let h = Harness::over(store, db, NhisConfig::default(), MockUpstream::new());
    h.link(true).await;
    let overview = h.endpoints().checkup_overview.clone();
    h.upstream.push_ok(&overview, overview_with_rows()).await;
    failing.fail_cache_writes(true);

    let err = h.service.fetch(request(None, true)).await.unwrap_err();
    assert!(err.to_string().contains("disk full"), "got: {err}");

    let attempts = h.store.attempts_since(USER, epoch()).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status_code, 500);
    assert!(!attempts[0].ok);
    assert!(attempts[0].force_refresh);
    let link = h.store.get_link(USER).await.unwrap().unwrap();
    assert!(link.last_attempt_at.is_some());

    let retry = h.service.fetch(request(None, true)).await.unwrap();
    assert_eq!(retry.status_code, 409);
    assert_eq!(retry.payload["errCd"], json!("NHIS_FORCE_REFRESH_COOLDOWN"));
    assert_eq!(h.upstream.call_count().await, 1);
}

#[tokio::test]
async fn failed_fetch_is_recorded_and_forced_retry_cools_down() {
    let h = Harness::with_defaults().await;
    h.link(true).await;
    let overview = h.endpoints().checkup_overview.clone();
    h.upstream
        .push_err(&overview, relay_error(&overview, "E500", "시스템 점검 중입니다"))
        .await;

    let failed = h.service.fetch(request(None, false)).await.unwrap();
    assert_eq!(failed.status_code, 502);
    assert_eq!(failed.payload["ok"], json!(false));
    assert_eq!(failed.payload["errCd"], json!("E500"));

    let link = h.store.get_link(USER).await.unwrap().unwrap();
    let err = link.last_error().expect("error recorded");
    assert_eq!(err.code.as_deref(), Some("E500"));
    assert_eq!(err.message.as_deref(), Some("시스템 점검 중입니다"));
    assert!(link.last_fetched_at.is_none());
    assert!(link.last_attempt_at.is_some());

    let attempts = h.store.attempts_since(USER, epoch()).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert!(!attempts[0].ok);
    assert_eq!(attempts[0].status_code, 502);

    let forced = h.service.fetch(request(None, true)).await.unwrap();
    assert_eq!(forced.status_code, 409);
    assert_eq!(forced.payload["errCd"], json!("NHIS_FORCE_REFRESH_COOLDOWN"));
    assert_eq!(forced.payload["cooldownSeconds"], json!(120));
    let remaining = forced.payload["remainingSeconds"].as_i64().unwrap();
    assert!(remaining > 0 && remaining <= 120);
    assert!(forced.payload["availableAt"].is_string());

    let repeat = h.service.fetch(request(None, false)).await.unwrap();
    assert_eq!(repeat.status_code, 502);
    assert_eq!(repeat.payload["cached"], json!(true));
    assert_eq!(h.upstream.call_count().await, 1);
}

#[tokio::test]
async fn relay_session_expiry_asks_for_a_new_login() {
    let h = Harness::with_defaults().await;
    h.link(true).await;
    let overview = h.endpoints().checkup_overview.clone();
    h.upstream
        .push_err(
            &overview,
            relay_error(&overview, "NHIS_LOGIN_SESSION_EXPIRED", "세션이 만료되었습니다"),
        )
        .await;

    let out = h.service.fetch(request(None, false)).await.unwrap();

    assert_eq!(out.status_code, 401);
    assert_eq!(out.payload["code"], json!("NHIS_AUTH_EXPIRED"));
    assert_eq!(out.payload["reason"], json!("nhis_auth_expired"));
    assert_eq!(out.payload["nextAction"], json!("init"));
}

#[tokio::test]
async fn concurrent_identical_fetches_share_one_execution() {
    let upstream = MockUpstream::new().with_delay(Duration::from_millis(150));
    let h = Harness::new(NhisConfig::default(), upstream).await;
    h.link(true).await;
    let overview = h.endpoints().checkup_overview.clone();
    h.upstream.set_fallback(&overview, Ok(overview_with_rows())).await;

    let (a, b) = tokio::join!(
        h.service.fetch(request(None, false)),
        h.service.fetch(request(None, false)),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.status_code, 200);
    assert_eq!(a, b);
    assert_eq!(h.upstream.call_count().await, 1);
    assert_eq!(h.store.attempts_since(USER, epoch()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn exhausted_fresh_budget_blocks_uncached_fetches() {
    let mut config = NhisConfig::default();
    config.budget.max_fresh_fetches = 1;
    let h = Harness::new(config, MockUpstream::new()).await;
    h.link(true).await;
    let overview = h.endpoints().checkup_overview.clone();
    h.upstream.set_fallback(&overview, Ok(overview_with_rows())).await;

    let first = h.service.fetch(request(None, false)).await.unwrap();
    assert_eq!(first.status_code, 200);

    let other_shape = h
        .service
        .fetch(request(Some(vec![FetchTarget::CheckupOverview]), false))
        .await
        .unwrap();
    assert_eq!(other_shape.status_code, 429);
    assert_eq!(other_shape.payload["errCd"], json!("NHIS_FETCH_BUDGET_EXCEEDED"));
    assert_eq!(other_shape.payload["reason"], json!("fresh"));
    assert_eq!(other_shape.payload["fetchBudget"]["fresh"]["used"], json!(1));
    assert!(other_shape.payload["retryAfterSec"].as_i64().is_some_and(|s| s > 0));
    assert_eq!(h.upstream.call_count().await, 1);
}

#[tokio::test]
async fn partial_results_stay_successful() {
    let mut config = NhisConfig::default();
    config.fetch.high_cost_targets_enabled = true;
    let h = Harness::new(config, MockUpstream::new()).await;
    h.link(true).await;
    let endpoints = h.endpoints().clone();
    h.upstream
        .push_err(&endpoints.medical, relay_error(&endpoints.medical, "E301", "진료내역 조회 실패"))
        .await;
    h.upstream
        .push_ok(&endpoints.health_age, relay_ok(json!({"healthAge": 41, "age": 44})))
        .await;

    let out = h
        .service
        .fetch(request(Some(vec![FetchTarget::HealthAge, FetchTarget::Medical]), false))
        .await
        .unwrap();

    assert_eq!(out.status_code, 200);
    assert_eq!(out.payload["ok"], json!(true));
    assert_eq!(out.payload["partial"], json!(true));
    assert_eq!(out.payload["failed"][0]["errCd"], json!("E301"));

    let link = h.store.get_link(USER).await.unwrap().unwrap();
    assert!(link.last_fetched_at.is_some());
    assert!(link.last_error().is_none());
}

#[tokio::test]
async fn session_artifacts_from_the_relay_refresh_the_link() {
    let h = Harness::with_defaults().await;
    h.link(true).await;
    let overview = h.endpoints().checkup_overview.clone();
    h.upstream
        .push_ok(
            &overview,
            relay_ok(json!({
                "cookieData": {"session": "rotated"},
                "list": [{"year": "2025", "chkResult": [{"inspectItem": "혈압", "result": "118/76"}]}]
            })),
        )
        .await;

    h.service.fetch(request(None, false)).await.unwrap();

    let link = h.store.get_link(USER).await.unwrap().unwrap();
    assert_eq!(link.cookie_data, Some(json!({"session": "rotated"})));
}

#[tokio::test]
async fn status_reports_link_cache_and_budget() {
    let h = Harness::with_defaults().await;

    let empty = h.service.status(USER).await.unwrap();
    assert_eq!(empty["ok"], json!(true));
    assert_eq!(empty["status"]["linked"], json!(false));
    assert_eq!(empty["status"]["provider"], json!("HYPHEN_NHIS"));
    assert_eq!(empty["status"]["cache"]["totalEntries"], json!(0));
    assert_eq!(empty["status"]["cache"]["summarySource"], Value::Null);
    assert_eq!(empty["status"]["forceRefresh"]["available"], json!(true));
    assert_eq!(empty["status"]["lastError"], Value::Null);

    h.link(true).await;
    let overview = h.endpoints().checkup_overview.clone();
    h.upstream.push_ok(&overview, overview_with_rows()).await;
    h.service.fetch(request(None, false)).await.unwrap();

    let status = h.service.status(USER).await.unwrap();
    let status = &status["status"];
    assert_eq!(status["linked"], json!(true));
    assert_eq!(status["loginOrgCd"], json!("kakao"));
    assert_eq!(status["hasCookieData"], json!(true));
    assert_eq!(status["pendingAuthReady"], json!(false));
    assert_eq!(status["cache"]["totalEntries"], json!(1));
    assert_eq!(status["cache"]["validEntries"], json!(1));
    assert_eq!(status["cache"]["summaryAvailable"], json!(true));
    assert_eq!(status["cache"]["summarySource"], json!("valid"));
    assert_eq!(status["forceRefresh"]["available"], json!(false));
    assert_eq!(status["forceRefresh"]["cooldownSeconds"], json!(120));
    assert_eq!(
        status["targetPolicy"]["allowedTargets"],
        json!(["medication", "checkupOverview"])
    );
    assert_eq!(status["fetchBudget"]["fresh"]["used"], json!(1));
    assert!(status["latestFetchAttemptAt"].is_string());
}

#[tokio::test]
async fn unlink_clears_link_and_cached_fetches() {
    let h = Harness::with_defaults().await;
    h.link(true).await;
    let overview = h.endpoints().checkup_overview.clone();
    h.upstream.push_ok(&overview, overview_with_rows()).await;
    h.service.fetch(request(None, false)).await.unwrap();

    assert_eq!(h.service.unlink(USER).await.unwrap(), json!({"ok": true}));

    let status = h.service.status(USER).await.unwrap();
    assert_eq!(status["status"]["linked"], json!(false));
    assert_eq!(status["status"]["cache"]["totalEntries"], json!(0));

    let out = h.service.fetch(request(None, false)).await.unwrap();
    assert_eq!(out.status_code, 409);

    h.link(true).await;
    h.upstream.push_ok(&overview, overview_with_rows()).await;
    let relinked = h.service.fetch(request(None, false)).await.unwrap();
    assert_eq!(relinked.status_code, 200);
    assert!(relinked.payload.get("cached").is_none());
    assert_eq!(h.upstream.call_count().await, 2);
}
