// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-target relay execution for one fetch request.
//!
//! Independent targets run concurrently and never abort each other. A failed
//! target is recorded in `failed` and, when the relay returned a body, under
//! `data.raw`. Only when every target fails is the result `ok: false`.

use std::collections::HashMap;

use chrono::{Datelike, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use nhislink_config::model::{EndpointConfig, FetchConfig};
use nhislink_core::{FetchFailure, FetchTarget, NhisError, NhisUpstream, UpstreamError};
use nhislink_normalize::{
    NhisPayloadInput, has_meaningful_checkup_row, normalize_nhis_payload, normalize_treatment,
};

use crate::helpers::{
    RequestDefaults, collect_detail_key_pairs, medication_search_windows, merge_list_payloads,
    parse_years, with_fields,
};

/// User-facing message of an `ok: false` fetch payload.
pub const ALL_FAILED_MESSAGE: &str = "데이터를 불러오지 못했습니다. 잠시 후 다시 시도해 주세요.";

const MEDICAL_FAILED: &str = "진료 정보를 불러오지 못했습니다.";
const HEALTH_AGE_FAILED: &str = "건강 나이 정보를 불러오지 못했습니다.";
const CHECKUP_OVERVIEW_FAILED: &str = "검진 요약을 불러오지 못했습니다.";
const CHECKUP_RESULT_FAILED: &str = "검진 결과를 불러오지 못했어요.";
const MEDICATION_FAILED: &str = "투약 정보를 불러오지 못했어요.";
const CHECKUP_LIST_FAILED: &str = "건강검진 목록을 불러오지 못했습니다.";
const CHECKUP_LIST_PARTIAL: &str = "건강검진 목록 일부 조회에 실패했습니다.";
const CHECKUP_YEARLY_FAILED: &str = "검진 상세 데이터를 불러오지 못했습니다.";
const YEAR_FAILED: &str = "조회 실패";

/// Year failures quoted in a partial checkup list message.
const QUOTED_YEAR_FAILURES: usize = 4;

/// Everything the executor needs besides the relay itself.
#[derive(Debug, Clone)]
pub struct ExecuteInput {
    pub targets: Vec<FetchTarget>,
    /// Clamped to `1..=max_year_limit` before use.
    pub effective_year_limit: u32,
    pub base_payload: Value,
    pub detail_payload: Value,
    pub defaults: RequestDefaults,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteOutput {
    /// `{ ok, partial, failed, data: { normalized, raw } }`, or
    /// `{ ok: false, error, errCd, errMsg, failed }` when every target failed.
    pub payload: Value,
    pub first_failed: Option<FetchFailure>,
}

/// Relay endpoint path for a target.
pub fn endpoint_for(endpoints: &EndpointConfig, target: FetchTarget) -> &str {
    match target {
        FetchTarget::Medical => &endpoints.medical,
        FetchTarget::Medication => &endpoints.medication,
        FetchTarget::CheckupList => &endpoints.checkup_list,
        FetchTarget::CheckupYearly => &endpoints.checkup_yearly,
        FetchTarget::CheckupOverview => &endpoints.checkup_overview,
        FetchTarget::HealthAge => &endpoints.health_age,
    }
}

fn failure_from(target: FetchTarget, err: &UpstreamError, fallback: &str) -> FetchFailure {
    let message = err.display_message().trim();
    FetchFailure {
        target,
        err_cd: err.code().map(str::to_string),
        err_msg: Some(if message.is_empty() { fallback } else { message }.to_string()),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, NhisError> {
    serde_json::to_value(value).map_err(|e| NhisError::Internal(format!("fetch payload encoding failed: {e}")))
}

/// Outcomes of one branch of the execution.
#[derive(Debug, Default)]
struct Collected {
    successful: HashMap<FetchTarget, Value>,
    failed: Vec<FetchFailure>,
    raw_failures: HashMap<FetchTarget, Value>,
}

impl Collected {
    fn succeed(&mut self, target: FetchTarget, value: Value) {
        self.successful.insert(target, value);
    }

    fn fail(&mut self, target: FetchTarget, err: &UpstreamError, fallback: &str) {
        warn!(
            fetch_target = %target,
            endpoint = %err.endpoint,
            status = ?err.status,
            err_cd = ?err.code(),
            "relay target failed: {err}"
        );
        if let Some(body) = &err.body {
            self.raw_failures.insert(target, body.clone());
        }
        self.failed.push(failure_from(target, err, fallback));
    }

    fn absorb(&mut self, other: Collected) {
        self.successful.extend(other.successful);
        self.failed.extend(other.failed);
        self.raw_failures.extend(other.raw_failures);
    }

    fn raw(&self, target: FetchTarget) -> Value {
        self.successful
            .get(&target)
            .or_else(|| self.raw_failures.get(&target))
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn payloads(&self, target: FetchTarget) -> &[Value] {
        self.successful
            .get(&target)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

struct FetchExecutor<'a> {
    upstream: &'a dyn NhisUpstream,
    endpoints: &'a EndpointConfig,
    config: &'a FetchConfig,
    input: &'a ExecuteInput,
}

impl FetchExecutor<'_> {
    fn wants(&self, target: FetchTarget) -> bool {
        self.input.targets.contains(&target)
    }

    async fn call(&self, target: FetchTarget, payload: Value) -> Result<Value, UpstreamError> {
        let endpoint = endpoint_for(self.endpoints, target);
        debug!(fetch_target = %target, endpoint, "calling relay");
        self.upstream.call(endpoint, payload).await
    }

    async fn single(&self, target: FetchTarget, payload: &Value, fallback: &str) -> Collected {
        let mut out = Collected::default();
        if self.wants(target) {
            match self.call(target, payload.clone()).await {
                Ok(value) => out.succeed(target, value),
                Err(err) => out.fail(target, &err, fallback),
            }
        }
        out
    }

    /// Try widening windows until the relay returns a medication row.
    async fn latest_medication(&self) -> Result<Value, UpstreamError> {
        let defaults = &self.input.defaults;
        let mut last = None;
        for window in medication_search_windows(&defaults.from_date, &defaults.to_date) {
            let mut fields = Vec::with_capacity(2);
            if !window.from_date.is_empty() {
                fields.push(("fromDate", json!(window.from_date)));
            }
            if !window.to_date.is_empty() {
                fields.push(("toDate", json!(window.to_date)));
            }
            let payload = self
                .call(FetchTarget::Medication, with_fields(&self.input.detail_payload, &fields))
                .await?;
            if !normalize_treatment(&payload).list.is_empty() {
                debug!(from_date = %window.from_date, "medication rows found");
                return Ok(payload);
            }
            last = Some(payload);
        }
        match last {
            Some(payload) => Ok(payload),
            None => {
                self.call(FetchTarget::Medication, self.input.detail_payload.clone())
                    .await
            }
        }
    }

    async fn medication_only(&self) -> Collected {
        let mut out = Collected::default();
        match self.latest_medication().await {
            Ok(value) => out.succeed(FetchTarget::Medication, value),
            Err(err) => out.fail(FetchTarget::Medication, &err, MEDICATION_FAILED),
        }
        out
    }

    /// Overview first; medication only when the overview has nothing to show.
    async fn overview_then_medication(&self) -> Collected {
        let mut out = Collected::default();
        let (needs_medication, pending) = match self
            .call(FetchTarget::CheckupOverview, self.input.base_payload.clone())
            .await
        {
            Ok(payload) => {
                let empty = !has_meaningful_checkup_row(&payload);
                out.succeed(FetchTarget::CheckupOverview, payload);
                (empty, None)
            }
            Err(err) => (err.has_no_data_signal(), Some(err)),
        };

        if !needs_medication {
            if let Some(err) = pending {
                out.fail(FetchTarget::CheckupOverview, &err, CHECKUP_RESULT_FAILED);
            }
            return out;
        }

        match self.latest_medication().await {
            Ok(payload) => out.succeed(FetchTarget::Medication, payload),
            Err(err) => {
                if let Some(pending) = pending {
                    out.fail(FetchTarget::CheckupOverview, &pending, CHECKUP_RESULT_FAILED);
                }
                out.fail(FetchTarget::Medication, &err, MEDICATION_FAILED);
            }
        }
        out
    }

    async fn overview_and_medication(&self) -> Collected {
        match (
            self.wants(FetchTarget::CheckupOverview),
            self.wants(FetchTarget::Medication),
        ) {
            (true, true) => self.overview_then_medication().await,
            (true, false) => {
                self.single(
                    FetchTarget::CheckupOverview,
                    &self.input.base_payload,
                    CHECKUP_OVERVIEW_FAILED,
                )
                .await
            }
            (false, true) => self.medication_only().await,
            (false, false) => Collected::default(),
        }
    }

    /// Page the checkup list by year, then fetch yearly detail per key pair.
    ///
    /// Returns the raw list payload (or error body) of every year attempted.
    async fn checkup_details(&self) -> (Collected, Map<String, Value>) {
        let mut out = Collected::default();
        let mut by_year = Map::new();
        let wants_yearly = self.wants(FetchTarget::CheckupYearly);
        if !self.wants(FetchTarget::CheckupList) && !wants_yearly {
            return (out, by_year);
        }

        let max_pairs = self.config.max_yearly_detail_requests;
        let year_limit = self
            .input
            .effective_year_limit
            .clamp(1, self.config.max_year_limit.max(1));
        let defaults = &self.input.defaults;
        let years = parse_years(
            &defaults.from_date,
            &defaults.to_date,
            year_limit as usize,
            Utc::now().year(),
        );

        let mut list_payloads = Vec::new();
        let mut year_failures = Vec::new();
        let mut pairs = Vec::new();
        for year in years {
            let payload = with_fields(&self.input.base_payload, &[("yyyy", json!(year))]);
            match self.call(FetchTarget::CheckupList, payload).await {
                Ok(payload) => {
                    by_year.insert(year, payload.clone());
                    let found = if wants_yearly {
                        collect_detail_key_pairs(&payload, max_pairs)
                    } else {
                        Vec::new()
                    };
                    list_payloads.push(payload);
                    if !found.is_empty() {
                        pairs = found;
                        break;
                    }
                }
                Err(err) => {
                    warn!(year = %year, err_cd = ?err.code(), "checkup list year failed: {err}");
                    let message = err.display_message().trim();
                    let message = if message.is_empty() { YEAR_FAILED } else { message };
                    year_failures.push(format!("{year}: {message}"));
                    if let Some(body) = err.body {
                        by_year.insert(year, body);
                    }
                }
            }
        }

        if list_payloads.is_empty() {
            out.failed.push(FetchFailure {
                target: FetchTarget::CheckupList,
                err_cd: None,
                err_msg: Some(CHECKUP_LIST_FAILED.to_string()),
            });
            out.raw_failures
                .insert(FetchTarget::CheckupList, Value::Object(by_year.clone()));
        } else if !year_failures.is_empty() {
            let quoted: Vec<&str> = year_failures
                .iter()
                .take(QUOTED_YEAR_FAILURES)
                .map(String::as_str)
                .collect();
            out.failed.push(FetchFailure {
                target: FetchTarget::CheckupList,
                err_cd: None,
                err_msg: Some(format!("{CHECKUP_LIST_PARTIAL} ({})", quoted.join(", "))),
            });
        }

        if wants_yearly {
            if pairs.is_empty() {
                pairs = collect_detail_key_pairs(&Value::Array(list_payloads.clone()), max_pairs);
            }
            out.absorb(self.yearly_details(&pairs).await);
        }
        if !list_payloads.is_empty() {
            out.succeed(FetchTarget::CheckupList, Value::Array(list_payloads));
        }
        (out, by_year)
    }

    async fn yearly_details(&self, pairs: &[crate::helpers::DetailKeyPair]) -> Collected {
        let mut out = Collected::default();
        let requests = pairs.iter().map(|pair| {
            let mut fields = vec![("detailKey", json!(pair.detail_key))];
            if let Some(key2) = &pair.detail_key2 {
                fields.push(("detailKey2", json!(key2)));
            }
            self.call(
                FetchTarget::CheckupYearly,
                with_fields(&self.input.base_payload, &fields),
            )
        });

        let mut payloads = Vec::new();
        let mut raw = Vec::new();
        let mut first_failure: Option<UpstreamError> = None;
        for result in join_all(requests).await {
            match result {
                Ok(payload) => {
                    raw.push(payload.clone());
                    payloads.push(payload);
                }
                Err(err) => {
                    warn!(err_cd = ?err.code(), "checkup yearly detail failed: {err}");
                    if let Some(body) = &err.body {
                        raw.push(body.clone());
                    }
                    first_failure.get_or_insert(err);
                }
            }
        }

        if !payloads.is_empty() || pairs.is_empty() {
            out.succeed(FetchTarget::CheckupYearly, Value::Array(payloads));
        } else {
            let failure = match &first_failure {
                Some(err) => failure_from(FetchTarget::CheckupYearly, err, CHECKUP_YEARLY_FAILED),
                None => FetchFailure {
                    target: FetchTarget::CheckupYearly,
                    err_cd: None,
                    err_msg: Some(CHECKUP_YEARLY_FAILED.to_string()),
                },
            };
            out.failed.push(failure);
            out.raw_failures
                .insert(FetchTarget::CheckupYearly, Value::Array(raw));
        }
        out
    }

    async fn run(&self) -> Result<ExecuteOutput, NhisError> {
        let (medical, overview_medication, (checkup, by_year), health_age) = futures::join!(
            self.single(FetchTarget::Medical, &self.input.detail_payload, MEDICAL_FAILED),
            self.overview_and_medication(),
            self.checkup_details(),
            self.single(FetchTarget::HealthAge, &self.input.base_payload, HEALTH_AGE_FAILED),
        );

        let mut all = Collected::default();
        for branch in [medical, overview_medication, checkup, health_age] {
            all.absorb(branch);
        }
        let first_failed = all.failed.first().cloned();

        if all.successful.is_empty() {
            let mut payload = Map::new();
            payload.insert("ok".into(), Value::Bool(false));
            payload.insert("error".into(), json!(ALL_FAILED_MESSAGE));
            if let Some(first) = &first_failed {
                if let Some(code) = &first.err_cd {
                    payload.insert("errCd".into(), json!(code));
                }
                if let Some(message) = &first.err_msg {
                    payload.insert("errMsg".into(), json!(message));
                }
            }
            payload.insert("failed".into(), to_json(&all.failed)?);
            return Ok(ExecuteOutput {
                payload: Value::Object(payload),
                first_failed,
            });
        }

        let list_payloads = all.payloads(FetchTarget::CheckupList);
        let yearly_payloads = all.payloads(FetchTarget::CheckupYearly);
        let normalized = normalize_nhis_payload(NhisPayloadInput {
            medical: all.successful.get(&FetchTarget::Medical).unwrap_or(&Value::Null),
            medication: all.successful.get(&FetchTarget::Medication).unwrap_or(&Value::Null),
            checkup_list: list_payloads,
            checkup_yearly: yearly_payloads,
            checkup_overview: all
                .successful
                .get(&FetchTarget::CheckupOverview)
                .unwrap_or(&Value::Null),
            health_age: all.successful.get(&FetchTarget::HealthAge).unwrap_or(&Value::Null),
        });

        let checkup_list_raw = if list_payloads.is_empty() {
            all.raw(FetchTarget::CheckupList)
        } else {
            merge_list_payloads(list_payloads)
        };
        let checkup_yearly_raw = if yearly_payloads.is_empty() {
            all.raw_failures
                .get(&FetchTarget::CheckupYearly)
                .cloned()
                .unwrap_or(Value::Null)
        } else {
            Value::Array(yearly_payloads.to_vec())
        };

        let mut failed_targets: Vec<&str> = Vec::new();
        for failure in &all.failed {
            if !failed_targets.contains(&failure.target.as_str()) {
                failed_targets.push(failure.target.as_str());
            }
        }

        let payload = json!({
            "ok": true,
            "partial": !all.failed.is_empty(),
            "failed": to_json(&all.failed)?,
            "failedTargets": failed_targets,
            "data": {
                "normalized": to_json(&normalized)?,
                "raw": {
                    "medical": all.raw(FetchTarget::Medical),
                    "medication": all.raw(FetchTarget::Medication),
                    "checkupList": checkup_list_raw,
                    "checkupYearly": checkup_yearly_raw,
                    "checkupOverview": all.raw(FetchTarget::CheckupOverview),
                    "healthAge": all.raw(FetchTarget::HealthAge),
                    "checkupListByYear": Value::Object(by_year),
                }
            }
        });
        Ok(ExecuteOutput {
            payload,
            first_failed,
        })
    }
}

/// Call the relay once per requested target and assemble the fetch payload.
///
/// Relay failures never surface as `Err`; they become `failed` entries. An
/// `Err` means the payload itself could not be assembled.
pub async fn execute_nhis_fetch(
    upstream: &dyn NhisUpstream,
    endpoints: &EndpointConfig,
    config: &FetchConfig,
    input: &ExecuteInput,
) -> Result<ExecuteOutput, NhisError> {
    FetchExecutor {
        upstream,
        endpoints,
        config,
        input,
    }
    .run()
    .await
}
