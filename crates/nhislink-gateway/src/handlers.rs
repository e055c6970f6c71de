// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use nhislink_core::{FetchTarget, NhisError};
use nhislink_fetch::{EasyAuthIdentity, FetchOutcome, FetchRequest, InitRequest, SignRequest};

use crate::auth::AppUserId;
use crate::server::GatewayState;

/// Largest `yearLimit` a caller may request.
pub const MAX_REQUEST_YEAR_LIMIT: u32 = 5;

const INTERNAL_ERROR_MESSAGE: &str = "건강정보 처리 중 오류가 발생했어요. 잠시 후 다시 시도해 주세요.";

/// Response for GET /health.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Error body shared by every failing route.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
        }
    }
}

/// Body of POST /api/health/nhis/fetch.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchBody {
    pub targets: Option<Vec<FetchTarget>>,
    pub year_limit: Option<u32>,
    pub force_refresh: bool,
}

impl FetchBody {
    /// Parse a raw request body.
    ///
    /// An empty or non-JSON body counts as `{}`. A JSON body that does not
    /// match the schema is an error carrying the first problem found.
    pub fn parse(body: &[u8]) -> Result<Self, String> {
        let value: Value = match serde_json::from_slice(body) {
            Ok(Value::Null) | Err(_) => return Ok(Self::default()),
            Ok(value) => value,
        };
        let parsed: Self = serde_json::from_value(value).map_err(|e| e.to_string())?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<(), String> {
        if self.targets.as_ref().is_some_and(Vec::is_empty) {
            return Err("targets must contain at least one target".to_string());
        }
        if self
            .year_limit
            .is_some_and(|limit| !(1..=MAX_REQUEST_YEAR_LIMIT).contains(&limit))
        {
            return Err(format!(
                "yearLimit must be between 1 and {MAX_REQUEST_YEAR_LIMIT}"
            ));
        }
        Ok(())
    }

    fn into_request(self, app_user_id: String) -> FetchRequest {
        FetchRequest {
            app_user_id,
            targets: self.targets,
            year_limit: self.year_limit.map(f64::from),
            force_refresh: self.force_refresh,
        }
    }
}

/// Body of POST /api/health/nhis/init.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitBody {
    #[serde(default)]
    pub login_method: Option<String>,
    pub login_org_cd: String,
    pub res_nm: String,
    /// Birth date, `YYYYMMDD`.
    pub res_no: String,
    pub mobile_no: String,
}

fn all_digits(value: &str, lengths: std::ops::RangeInclusive<usize>) -> bool {
    lengths.contains(&value.len()) && value.bytes().all(|b| b.is_ascii_digit())
}

impl InitBody {
    pub fn parse(body: &[u8]) -> Result<Self, String> {
        let parsed: Self = serde_json::from_slice(body).map_err(|e| e.to_string())?;
        parsed.validate()
    }

    fn validate(self) -> Result<Self, String> {
        if self.login_method.as_deref().is_some_and(|m| m != "EASY") {
            return Err("loginMethod must be EASY".to_string());
        }
        let login_org_cd = self.login_org_cd.trim();
        if !(1..=20).contains(&login_org_cd.chars().count()) {
            return Err("loginOrgCd must be 1 to 20 characters".to_string());
        }
        let res_nm = self.res_nm.trim();
        if !(1..=60).contains(&res_nm.chars().count()) {
            return Err("resNm must be 1 to 60 characters".to_string());
        }
        let res_no = self.res_no.trim();
        if !all_digits(res_no, 8..=8) {
            return Err("resNo must be 8 digits (YYYYMMDD)".to_string());
        }
        let mobile_no = self.mobile_no.trim();
        if !all_digits(mobile_no, 10..=11) {
            return Err("mobileNo must be 10 or 11 digits".to_string());
        }
        Ok(Self {
            login_method: self.login_method.clone(),
            login_org_cd: login_org_cd.to_string(),
            res_nm: res_nm.to_string(),
            res_no: res_no.to_string(),
            mobile_no: mobile_no.to_string(),
        })
    }

    fn into_request(self, app_user_id: String) -> InitRequest {
        InitRequest {
            app_user_id,
            identity: EasyAuthIdentity {
                login_org_cd: self.login_org_cd,
                name: self.res_nm,
                birth: self.res_no,
                mobile: self.mobile_no,
            },
        }
    }
}

/// Body of POST /api/health/nhis/sign. Empty bodies are allowed.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SignBody {
    pub otp_or_auth_result: Option<Value>,
}

impl SignBody {
    pub fn parse(body: &[u8]) -> Result<Self, String> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| e.to_string())
    }
}

fn bad_request(app_user_id: &str, route: &str, message: String) -> Response {
    tracing::debug!(%app_user_id, route, %message, "invalid request body");
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message))).into_response()
}

fn internal_error(route: &str, err: &NhisError) -> Response {
    tracing::error!(route, error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(INTERNAL_ERROR_MESSAGE)),
    )
        .into_response()
}

fn outcome_response(outcome: FetchOutcome) -> Response {
    let status =
        StatusCode::from_u16(outcome.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(outcome.payload)).into_response()
}

/// GET /health
pub async fn get_public_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /api/health/nhis/status
pub async fn get_status(
    State(state): State<GatewayState>,
    AppUserId(app_user_id): AppUserId,
) -> Response {
    match state.service.status(&app_user_id).await {
        Ok(payload) => Json(payload).into_response(),
        Err(e) => internal_error("status", &e),
    }
}

/// POST /api/health/nhis/fetch
pub async fn post_fetch(
    State(state): State<GatewayState>,
    AppUserId(app_user_id): AppUserId,
    body: Bytes,
) -> Response {
    let parsed = match FetchBody::parse(&body) {
        Ok(parsed) => parsed,
        Err(message) => return bad_request(&app_user_id, "fetch", message),
    };

    match state.service.fetch(parsed.into_request(app_user_id)).await {
        Ok(outcome) => outcome_response(outcome),
        Err(e) => internal_error("fetch", &e),
    }
}

/// POST /api/health/nhis/init
pub async fn post_init(
    State(state): State<GatewayState>,
    AppUserId(app_user_id): AppUserId,
    body: Bytes,
) -> Response {
    let parsed = match InitBody::parse(&body) {
        Ok(parsed) => parsed,
        Err(message) => return bad_request(&app_user_id, "init", message),
    };

    match state.service.init(parsed.into_request(app_user_id)).await {
        Ok(outcome) => outcome_response(outcome),
        Err(e) => internal_error("init", &e),
    }
}

/// POST /api/health/nhis/sign
pub async fn post_sign(
    State(state): State<GatewayState>,
    AppUserId(app_user_id): AppUserId,
    body: Bytes,
) -> Response {
    let parsed = match SignBody::parse(&body) {
        Ok(parsed) => parsed,
        Err(message) => return bad_request(&app_user_id, "sign", message),
    };

    let request = SignRequest {
        app_user_id,
        otp_or_auth_result: parsed.otp_or_auth_result,
    };
    match state.service.sign(request).await {
        Ok(outcome) => outcome_response(outcome),
        Err(e) => internal_error("sign", &e),
    }
}

/// POST /api/health/nhis/unlink
pub async fn post_unlink(
    State(state): State<GatewayState>,
    AppUserId(app_user_id): AppUserId,
) -> Response {
    match state.service.unlink(&app_user_id).await {
        Ok(payload) => Json(payload).into_response(),
        Err(e) => internal_error("unlink", &e),
    }
}
