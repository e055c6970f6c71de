// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Easy-auth link lifecycle.
//!
//! `init` asks the relay to push an approval request to the user's
//! authenticator app and stores the step and cookie blobs it returns.
//! `sign` confirms the approval with those blobs and marks the link usable
//! for fetches. Both run once per identical concurrent request.

use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use nhislink_core::{LinkError, LinkPatch, NhisError, UpstreamError};
use nhislink_policy::{IdentityInput, resolve_identity_hash};

use crate::helpers::{RequestDefaults, session_artifacts_from_response};
use crate::service::{
    FetchOutcome, INIT_REQUIRED_ERR_CODE, INIT_REQUIRED_MESSAGE, NhisFetchService, from_inflight,
    relay_today,
};

pub const INIT_INFLIGHT_NAMESPACE: &str = "nhis-init";
pub const SIGN_INFLIGHT_NAMESPACE: &str = "nhis-sign";
pub const INIT_FAILED_ERR_CODE: &str = "NHIS_INIT_FAILED";
pub const SIGN_FAILED_ERR_CODE: &str = "NHIS_SIGN_FAILED";

const EASY_LOGIN_METHOD: &str = "EASY";
const STEP_MODE: &str = "step";
const MISSING_STEP_DATA: &str = "Init response does not include stepData";

const INIT_FAILED_MESSAGE: &str = "인증 요청에 실패했습니다. 입력값을 확인하고 다시 시도해 주세요.";
const SIGN_FAILED_MESSAGE: &str = "인증 확인에 실패했습니다. 잠시 후 다시 시도해 주세요.";
const SIGN_EXPIRED_MESSAGE: &str =
    "인증 세션이 만료되었습니다. 카카오 인증 요청(init)부터 다시 진행해 주세요.";
const SIGN_REQUEST_MISSING_MESSAGE: &str =
    "인증 요청 정보가 없거나 만료되었습니다. 카카오 인증 요청(init)을 다시 진행해 주세요.";
const SIGN_PENDING_MESSAGE: &str =
    "카카오톡 인증 승인 대기 중입니다. 승인 후 '연동 완료 확인'을 다시 진행해 주세요.";

/// Relay codes meaning the pending step can no longer be signed.
const STALE_SIGN_ERR_CODES: [&str; 2] = ["LOGIN-999", "C0012-001"];

/// Who the relay should send the approval request to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EasyAuthIdentity {
    pub login_org_cd: String,
    pub name: String,
    /// `YYYYMMDD`.
    pub birth: String,
    pub mobile: String,
}

impl EasyAuthIdentity {
    fn identity_hash(&self, app_user_id: &str, salt: &str) -> String {
        let (hash, _) = resolve_identity_hash(
            &IdentityInput {
                app_user_id,
                login_org_cd: Some(&self.login_org_cd),
                name: Some(&self.name),
                birth: Some(&self.birth),
                mobile: Some(&self.mobile),
                stored_identity_hash: None,
            },
            salt,
        );
        hash
    }

    fn relay_payload(&self, defaults: &RequestDefaults, step: &str) -> Map<String, Value> {
        let payload = json!({
            "loginMethod": EASY_LOGIN_METHOD,
            "loginOrgCd": self.login_org_cd,
            "resNm": self.name,
            "resNo": self.birth,
            "mobileNo": self.mobile,
            "fromDate": defaults.from_date,
            "toDate": defaults.to_date,
            "subjectType": defaults.subject_type,
            "stepMode": STEP_MODE,
            "step": step,
            "showCookie": "Y",
        });
        match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// Link fields every init and sign outcome writes.
    fn link_patch(&self, identity_hash: &str) -> LinkPatch {
        LinkPatch {
            linked: Some(false),
            login_method: Some(EASY_LOGIN_METHOD.to_string()),
            login_org_cd: Some(self.login_org_cd.clone()),
            last_identity_hash: Some(identity_hash.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitRequest {
    pub app_user_id: String,
    pub identity: EasyAuthIdentity,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignRequest {
    pub app_user_id: String,
    /// Forwarded to the relay untouched when present.
    pub otp_or_auth_result: Option<Value>,
}

struct SignContext {
    app_user_id: String,
    identity: EasyAuthIdentity,
    identity_hash: String,
    step_data: Value,
    cookie_data: Option<Value>,
    otp_or_auth_result: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SignGuidance {
    next_action: &'static str,
    reason: &'static str,
    error: &'static str,
}

/// Map a failed sign to what the user should do next, when it is known.
fn resolve_sign_guidance(code: Option<&str>, message: Option<&str>) -> Option<SignGuidance> {
    let code = code.unwrap_or_default().trim().to_uppercase();
    let message = message.unwrap_or_default().trim().to_lowercase();

    if STALE_SIGN_ERR_CODES.contains(&code.as_str()) {
        return Some(SignGuidance {
            next_action: "init",
            reason: "nhis_auth_expired",
            error: SIGN_EXPIRED_MESSAGE,
        });
    }
    if message.contains("요청") && (message.contains("없") || message.contains("만료")) {
        return Some(SignGuidance {
            next_action: "init",
            reason: "nhis_sign_init_required",
            error: SIGN_REQUEST_MISSING_MESSAGE,
        });
    }
    if ["승인", "대기", "카카오톡"].iter().any(|w| message.contains(*w)) {
        return Some(SignGuidance {
            next_action: "sign",
            reason: "nhis_sign_pending",
            error: SIGN_PENDING_MESSAGE,
        });
    }
    None
}

fn upstream_link_error(err: &UpstreamError) -> LinkError {
    LinkError::new(
        err.err_cd.clone(),
        Some(err.err_msg.clone().unwrap_or_else(|| err.message.clone())),
    )
}

fn init_required() -> FetchOutcome {
    FetchOutcome::rejected(
        409,
        INIT_REQUIRED_MESSAGE,
        INIT_REQUIRED_ERR_CODE,
        &[("nextAction", json!("init")), ("linked", json!(false))],
    )
}

impl NhisFetchService {
    /// Start an easy-auth link for the user.
    ///
    /// A relay failure is an `Ok` outcome with status 502; `Err` is reserved
    /// for storage failures.
    pub async fn init(&self, request: InitRequest) -> Result<FetchOutcome, NhisError> {
        let InitRequest {
            app_user_id,
            identity,
        } = request;
        let identity_hash = identity.identity_hash(&app_user_id, &self.config.cache.hash_salt);
        let key = format!("{app_user_id}|{identity_hash}|{}", identity.login_org_cd);

        let this = self.clone();
        self.inflight
            .run(INIT_INFLIGHT_NAMESPACE, &key, move || async move {
                this.execute_init(app_user_id, identity, identity_hash).await
            })
            .await
            .map_err(from_inflight)
    }

    /// Confirm a pending easy-auth link.
    ///
    /// Without a preceding successful `init` the caller is sent back to it
    /// with a 409.
    pub async fn sign(&self, request: SignRequest) -> Result<FetchOutcome, NhisError> {
        let app_user_id = request.app_user_id;
        let pending = self.pending.get(&app_user_id).map(|p| p.value().clone());
        let link = self.store.get_link(&app_user_id).await?;
        let (Some(identity), Some(link)) = (pending, link) else {
            info!(%app_user_id, "sign rejected, no pending easy-auth request");
            return Ok(init_required());
        };
        let Some(step_data) = link.step_data.clone().filter(|v| !v.is_null()) else {
            info!(%app_user_id, "sign rejected, link has no step data");
            return Ok(init_required());
        };

        let identity_hash = identity.identity_hash(&app_user_id, &self.config.cache.hash_salt);
        let key = format!("{app_user_id}|{identity_hash}|{}", identity.login_org_cd);
        let ctx = SignContext {
            app_user_id,
            identity,
            identity_hash,
            step_data,
            cookie_data: link.cookie_data.clone().filter(|v| !v.is_null()),
            otp_or_auth_result: request.otp_or_auth_result,
        };

        let this = self.clone();
        self.inflight
            .run(SIGN_INFLIGHT_NAMESPACE, &key, move || async move {
                this.execute_sign(ctx).await
            })
            .await
            .map_err(from_inflight)
    }

    async fn execute_init(
        &self,
        app_user_id: String,
        identity: EasyAuthIdentity,
        identity_hash: String,
    ) -> Result<FetchOutcome, NhisError> {
        let defaults = RequestDefaults::for_day(&self.config.fetch, relay_today(Utc::now()));
        let payload = identity.relay_payload(&defaults, "init");
        let endpoint = &self.config.hyphen.endpoints.medical;

        let failure = match self.upstream.call(endpoint, Value::Object(payload)).await {
            Ok(response) => {
                let artifacts = session_artifacts_from_response(&response);
                match artifacts.step_data.filter(|v| !v.is_null()) {
                    Some(step_data) => {
                        let patch = LinkPatch {
                            step_mode: Some(STEP_MODE.to_string()),
                            step_data: Some(step_data),
                            cookie_data: Some(artifacts.cookie_data.unwrap_or(Value::Null)),
                            last_error: Some(None),
                            ..identity.link_patch(&identity_hash)
                        };
                        self.store.upsert_link(&app_user_id, patch).await?;
                        self.pending.insert(app_user_id.clone(), identity);
                        info!(%app_user_id, "easy-auth init requested");
                        return Ok(FetchOutcome {
                            status_code: 200,
                            payload: json!({"ok": true, "nextStep": "sign", "linked": false}),
                        });
                    }
                    None => LinkError::new(None, Some(MISSING_STEP_DATA.to_string())),
                }
            }
            Err(err) => upstream_link_error(&err),
        };

        warn!(
            %app_user_id,
            code = failure.code.as_deref().unwrap_or("-"),
            "easy-auth init failed: {}",
            failure.message.as_deref().unwrap_or_default()
        );
        let patch = LinkPatch {
            last_error: Some(Some(failure.clone())),
            ..identity.link_patch(&identity_hash)
        };
        self.store.upsert_link(&app_user_id, patch).await?;
        Ok(FetchOutcome::rejected(
            502,
            INIT_FAILED_MESSAGE,
            failure.code.as_deref().unwrap_or(INIT_FAILED_ERR_CODE),
            &[("errMsg", json!(failure.message))],
        ))
    }

    async fn execute_sign(&self, ctx: SignContext) -> Result<FetchOutcome, NhisError> {
        let defaults = RequestDefaults::for_day(&self.config.fetch, relay_today(Utc::now()));
        let mut payload = ctx.identity.relay_payload(&defaults, "sign");
        payload.insert("step_data".into(), ctx.step_data.clone());
        if let Some(cookie) = &ctx.cookie_data {
            payload.insert("cookieData".into(), cookie.clone());
        }
        if let Some(result) = &ctx.otp_or_auth_result {
            payload.insert("otpOrAuthResult".into(), result.clone());
        }
        let endpoint = &self.config.hyphen.endpoints.medical;

        let err = match self.upstream.call(endpoint, Value::Object(payload)).await {
            Ok(response) => {
                let next = session_artifacts_from_response(&response);
                let patch = LinkPatch {
                    linked: Some(true),
                    step_mode: Some(STEP_MODE.to_string()),
                    step_data: Some(next.step_data.filter(|v| !v.is_null()).unwrap_or(ctx.step_data)),
                    cookie_data: next.cookie_data.filter(|v| !v.is_null()).or(ctx.cookie_data),
                    last_linked_at: Some(Utc::now()),
                    last_error: Some(None),
                    ..ctx.identity.link_patch(&ctx.identity_hash)
                };
                self.store.upsert_link(&ctx.app_user_id, patch).await?;
                self.pending.remove(&ctx.app_user_id);
                info!(app_user_id = %ctx.app_user_id, "easy-auth link completed");
                return Ok(FetchOutcome {
                    status_code: 200,
                    payload: json!({"ok": true, "linked": true, "nextStep": "fetch"}),
                });
            }
            Err(err) => err,
        };

        let failure = upstream_link_error(&err);
        warn!(
            app_user_id = %ctx.app_user_id,
            code = failure.code.as_deref().unwrap_or("-"),
            "easy-auth sign failed: {err}"
        );
        self.store
            .save_link_error(&ctx.app_user_id, failure.clone())
            .await?;

        let outcome = match resolve_sign_guidance(err.err_cd.as_deref(), err.err_msg.as_deref()) {
            Some(guidance) => FetchOutcome {
                status_code: 409,
                payload: json!({
                    "ok": false,
                    "linked": false,
                    "nextAction": guidance.next_action,
                    "reason": guidance.reason,
                    "error": guidance.error,
                    "errCd": failure.code,
                }),
            },
            None => FetchOutcome::rejected(
                502,
                SIGN_FAILED_MESSAGE,
                failure.code.as_deref().unwrap_or(SIGN_FAILED_ERR_CODE),
                &[("errMsg", json!(failure.message))],
            ),
        };
        Ok(outcome)
    }
}
