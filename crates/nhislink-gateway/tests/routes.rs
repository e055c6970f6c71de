// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway routes driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use serde_json::{Value, json};
use tower::ServiceExt;

use nhislink_config::NhisConfig;
use nhislink_core::{LinkPatch, NhisStore};
use nhislink_fetch::NhisFetchService;
use nhislink_gateway::{APP_USER_ID_HEADER, AuthConfig, GatewayState, build_router};
use nhislink_test_utils::{MockUpstream, TestStore, relay_ok};

const USER: &str = "user-1";
const TOKEN: &str = "gateway-token";

struct Harness {
    router: Router,
    upstream: MockUpstream,
    store: Arc<dyn NhisStore>,
    config: Arc<NhisConfig>,
    _db: TestStore,
}

impl Harness {
    async fn new(bearer_token: Option<&str>) -> Self {
        let db = TestStore::new().await.unwrap();
        let store: Arc<dyn NhisStore> = db.store.clone();
        let upstream = MockUpstream::new();
        let config = Arc::new(NhisConfig::default());
        let service = NhisFetchService::new(store.clone(), Arc::new(upstream.clone()), config.clone());
        let auth = AuthConfig {
            bearer_token: bearer_token.map(str::to_string),
        };
        Self {
            router: build_router(GatewayState::new(service, auth)),
            upstream,
            store,
            config,
            _db: db,
        }
    }

    async fn link(&self) {
        self.store
            .upsert_link(
                USER,
                LinkPatch {
                    linked: Some(true),
                    login_method: Some("EASY".into()),
                    login_org_cd: Some("kakao".into()),
                    cookie_data: Some(json!({"session": "abc"})),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

fn api(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(APP_USER_ID_HEADER, USER)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_public_and_not_cached() {
    let h = Harness::new(Some(TOKEN)).await;

    let response = h
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store, max-age=0"
    );
    assert_eq!(response.headers().get("pragma").unwrap(), "no-cache");
    let body = json_body(response).await;
    assert_eq!(body["status"], json!("ok"));
}

#[tokio::test]
async fn api_routes_require_configured_bearer_token() {
    let h = Harness::new(Some(TOKEN)).await;

    let missing = h.send(api("GET", "/api/health/nhis/status", "")).await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let mut request = api("GET", "/api/health/nhis/status", "");
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {TOKEN}").parse().unwrap(),
    );
    let authorized = h.send(request).await;
    assert_eq!(authorized.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_app_user_id_is_unauthorized() {
    let h = Harness::new(None).await;

    let request = Request::builder()
        .uri("/api/health/nhis/status")
        .body(Body::empty())
        .unwrap();
    let response = h.send(request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["ok"], json!(false));
}

#[tokio::test]
async fn status_reports_unlinked_user() {
    let h = Harness::new(None).await;

    let response = h.send(api("GET", "/api/health/nhis/status", "")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store, max-age=0"
    );
    let body = json_body(response).await;
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["status"]["linked"], json!(false));
    assert_eq!(body["status"]["cache"]["totalEntries"], json!(0));
}

#[tokio::test]
async fn invalid_fetch_body_is_bad_request() {
    let h = Harness::new(None).await;
    h.link().await;

    for body in [
        r#"{"targets":["lifestyle"]}"#,
        r#"{"targets":[]}"#,
        r#"{"yearLimit":9}"#,
    ] {
        let response = h.send(api("POST", "/api/health/nhis/fetch", body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body}");
    }
    assert_eq!(h.upstream.call_count().await, 0);
}

#[tokio::test]
async fn fetch_without_link_returns_init_required() {
    let h = Harness::new(None).await;

    let response = h.send(api("POST", "/api/health/nhis/fetch", "")).await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["errCd"], json!("NHIS_INIT_REQUIRED"));
}

#[tokio::test]
async fn blocked_target_maps_to_bad_request() {
    let h = Harness::new(None).await;
    h.link().await;

    let response = h
        .send(api("POST", "/api/health/nhis/fetch", r#"{"targets":["healthAge"]}"#))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["blockedTargets"], json!(["healthAge"]));
}

#[tokio::test]
async fn fetch_then_unlink() {
    let h = Harness::new(None).await;
    h.link().await;
    let overview = h.config.hyphen.endpoints.checkup_overview.clone();
    h.upstream
        .push_ok(
            &overview,
            relay_ok(json!({"list": [{
                "year": "2025",
                "chkResult": [{"inspectItem": "혈압", "result": "120/80"}]
            }]})),
        )
        .await;

    let fetched = h.send(api("POST", "/api/health/nhis/fetch", "{}")).await;
    assert_eq!(fetched.status(), StatusCode::OK);
    let body = json_body(fetched).await;
    assert_eq!(body["ok"], json!(true));

    let cached = h.send(api("POST", "/api/health/nhis/fetch", "{}")).await;
    assert_eq!(cached.status(), StatusCode::OK);
    assert_eq!(json_body(cached).await["cached"], json!(true));

    let unlinked = h.send(api("POST", "/api/health/nhis/unlink", "")).await;
    assert_eq!(unlinked.status(), StatusCode::OK);
    assert_eq!(json_body(unlinked).await, json!({"ok": true}));

    let link = h.store.get_link(USER).await.unwrap();
    assert!(link.is_none_or(|l| !l.linked));
    assert_eq!(h.upstream.call_count().await, 1);
}

#[tokio::test]
async fn init_and_sign_complete_a_link() {
    let h = Harness::new(None).await;
    let medical = h.config.hyphen.endpoints.medical.clone();

    let invalid = h
        .send(api("POST", "/api/health/nhis/init", r#"{"loginOrgCd":"kakao"}"#))
        .await;
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

    let early = h.send(api("POST", "/api/health/nhis/sign", "")).await;
    assert_eq!(early.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(early).await["nextAction"], json!("init"));

    h.upstream
        .push_ok(
            &medical,
            relay_ok(json!({"stepData": {"txId": "tx-1"}, "cookieData": {"sid": "c-1"}})),
        )
        .await;
    let init = h
        .send(api(
            "POST",
            "/api/health/nhis/init",
            r#"{"loginOrgCd":"kakao","resNm":"홍길동","resNo":"19900101","mobileNo":"01012345678"}"#,
        ))
        .await;
    assert_eq!(init.status(), StatusCode::OK);
    assert_eq!(json_body(init).await["nextStep"], json!("sign"));

    h.upstream.push_ok(&medical, relay_ok(json!({}))).await;
    let sign = h.send(api("POST", "/api/health/nhis/sign", "{}")).await;
    assert_eq!(sign.status(), StatusCode::OK);
    assert_eq!(json_body(sign).await["linked"], json!(true));

    let status = json_body(h.send(api("GET", "/api/health/nhis/status", "")).await).await;
    assert_eq!(status["status"]["linked"], json!(true));
    assert_eq!(status["status"]["hasCookieData"], json!(true));
}
