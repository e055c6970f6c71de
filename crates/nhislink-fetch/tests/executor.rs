// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Executor scenarios against a scripted relay.

use serde_json::{Value, json};

use nhislink_config::model::{EndpointConfig, FetchConfig};
use nhislink_core::FetchTarget;
use nhislink_fetch::helpers::build_detail_payload;
use nhislink_fetch::{ExecuteInput, RequestDefaults, execute_nhis_fetch};
use nhislink_test_utils::{MockUpstream, relay_error, relay_ok};

fn input(targets: &[FetchTarget], year_limit: u32) -> ExecuteInput {
    let defaults = RequestDefaults {
        from_date: "20240101".into(),
        to_date: "20260315".into(),
        subject_type: "00".into(),
    };
    let base = json!({
        "loginMethod": "EASY",
        "fromDate": defaults.from_date,
        "toDate": defaults.to_date,
        "subjectType": "00",
        "cookieData": {"session": "abc"},
        "showCookie": "Y"
    });
    ExecuteInput {
        targets: targets.to_vec(),
        effective_year_limit: year_limit,
        detail_payload: build_detail_payload(&base),
        base_payload: base,
        defaults,
    }
}

fn overview_with_rows() -> Value {
    relay_ok(json!({"list": [{
        "year": "2025",
        "chkResult": [{"inspectItem": "혈압", "result": "120/80"}]
    }]}))
}

fn medication_with_rows() -> Value {
    relay_ok(json!({"list": [{"medicineNm": "타이레놀", "medDate": "20260301"}]}))
}

async fn run(mock: &MockUpstream, input: &ExecuteInput) -> nhislink_fetch::ExecuteOutput {
    execute_nhis_fetch(mock, &EndpointConfig::default(), &FetchConfig::default(), input)
        .await
        .expect("payload assembles")
}

#[tokio::test]
async fn overview_with_rows_skips_medication() {
    let endpoints = EndpointConfig::default();
    let mock = MockUpstream::new();
    mock.push_ok(&endpoints.checkup_overview, overview_with_rows()).await;

    let out = run(&mock, &input(&[FetchTarget::CheckupOverview, FetchTarget::Medication], 0)).await;

    assert!(mock.calls_to(&endpoints.medication).await.is_empty());
    assert_eq!(out.payload["ok"], json!(true));
    assert_eq!(out.payload["partial"], json!(false));
    assert_eq!(out.payload["failed"], json!([]));
    assert!(out.first_failed.is_none());
    assert_eq!(out.payload["data"]["raw"]["medication"], Value::Null);
    assert_eq!(out.payload["data"]["raw"]["checkupOverview"], overview_with_rows());
    assert_eq!(
        out.payload["data"]["normalized"]["checkup"]["overview"][0]["metric"],
        json!("혈압")
    );
}

#[tokio::test]
async fn empty_overview_searches_medication_windows_until_rows_appear() {
    let endpoints = EndpointConfig::default();
    let mock = MockUpstream::new();
    mock.push_ok(&endpoints.checkup_overview, relay_ok(json!({"list": []}))).await;
    mock.push_ok(&endpoints.medication, relay_ok(json!({"list": []}))).await;
    mock.push_ok(&endpoints.medication, relay_ok(json!({"list": []}))).await;
    mock.push_ok(&endpoints.medication, medication_with_rows()).await;

    let out = run(&mock, &input(&[FetchTarget::CheckupOverview, FetchTarget::Medication], 0)).await;

    let calls = mock.calls_to(&endpoints.medication).await;
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].payload["fromDate"], json!("20260214"));
    assert_eq!(calls[0].payload["toDate"], json!("20260315"));
    assert_eq!(calls[0].payload["detailYn"], json!("Y"));
    assert_eq!(out.payload["ok"], json!(true));
    assert_eq!(out.payload["partial"], json!(false));
    assert_eq!(
        out.payload["data"]["normalized"]["medication"]["list"]
            .as_array()
            .map(Vec::len),
        Some(1)
    );
}

#[tokio::test]
async fn medication_returns_last_window_when_every_window_is_empty() {
    let endpoints = EndpointConfig::default();
    let mock = MockUpstream::new();
    mock.push_ok(&endpoints.checkup_overview, relay_ok(json!({"list": []}))).await;
    mock.set_fallback(&endpoints.medication, Ok(relay_ok(json!({"list": []}))))
        .await;

    let out = run(&mock, &input(&[FetchTarget::CheckupOverview, FetchTarget::Medication], 0)).await;

    let calls = mock.calls_to(&endpoints.medication).await;
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[3].payload["fromDate"], json!("20240101"));
    assert_eq!(out.payload["ok"], json!(true));
    assert_eq!(out.payload["data"]["raw"]["medication"], relay_ok(json!({"list": []})));
}

#[tokio::test]
async fn overview_no_data_falls_back_to_medication_without_failure() {
    let endpoints = EndpointConfig::default();
    let mock = MockUpstream::new();
    mock.push_err(
        &endpoints.checkup_overview,
        relay_error(&endpoints.checkup_overview, "E404", "조회 결과가 없습니다"),
    )
    .await;
    mock.push_ok(&endpoints.medication, medication_with_rows()).await;

    let out = run(&mock, &input(&[FetchTarget::CheckupOverview, FetchTarget::Medication], 0)).await;

    assert_eq!(mock.calls_to(&endpoints.medication).await.len(), 1);
    assert_eq!(out.payload["ok"], json!(true));
    assert_eq!(out.payload["partial"], json!(false));
    assert_eq!(out.payload["failed"], json!([]));
}

#[tokio::test]
async fn overview_hard_failure_skips_medication_and_fails_everything() {
    let endpoints = EndpointConfig::default();
    let mock = MockUpstream::new();
    mock.push_err(
        &endpoints.checkup_overview,
        relay_error(&endpoints.checkup_overview, "E500", "시스템 점검 중입니다"),
    )
    .await;

    let out = run(&mock, &input(&[FetchTarget::CheckupOverview, FetchTarget::Medication], 0)).await;

    assert!(mock.calls_to(&endpoints.medication).await.is_empty());
    assert_eq!(out.payload["ok"], json!(false));
    assert_eq!(out.payload["errCd"], json!("E500"));
    assert_eq!(out.payload["errMsg"], json!("시스템 점검 중입니다"));
    assert_eq!(
        out.payload["failed"],
        json!([{"target": "checkupOverview", "errCd": "E500", "errMsg": "시스템 점검 중입니다"}])
    );
    let first = out.first_failed.expect("first failure");
    assert_eq!(first.target, FetchTarget::CheckupOverview);
}

#[tokio::test]
async fn independent_failure_leaves_a_partial_result() {
    let endpoints = EndpointConfig::default();
    let mock = MockUpstream::new();
    mock.push_err(
        &endpoints.medical,
        relay_error(&endpoints.medical, "E301", "진료내역 조회 실패"),
    )
    .await;
    mock.push_ok(&endpoints.health_age, relay_ok(json!({"healthAge": 41, "age": 44})))
        .await;

    let out = run(&mock, &input(&[FetchTarget::Medical, FetchTarget::HealthAge], 0)).await;

    assert_eq!(out.payload["ok"], json!(true));
    assert_eq!(out.payload["partial"], json!(true));
    assert_eq!(out.payload["failed"][0]["target"], json!("medical"));
    assert_eq!(out.payload["failed"][0]["errCd"], json!("E301"));
    assert_eq!(out.payload["failedTargets"], json!(["medical"]));
    assert_eq!(out.payload["data"]["raw"]["medical"]["common"]["errCd"], json!("E301"));
    assert_eq!(out.payload["data"]["normalized"]["healthAge"]["healthAge"], json!(41));
    assert_eq!(mock.calls_to(&endpoints.medical).await[0].payload["detailYn"], json!("Y"));
    assert!(mock.calls_to(&endpoints.health_age).await[0].payload.get("detailYn").is_none());
}

#[tokio::test]
async fn every_target_failing_reports_the_first_failure() {
    let mock = MockUpstream::new();

    let out = run(&mock, &input(&[FetchTarget::Medical, FetchTarget::HealthAge], 0)).await;

    assert_eq!(out.payload["ok"], json!(false));
    assert_eq!(out.payload["error"], json!(nhislink_fetch::ALL_FAILED_MESSAGE));
    assert!(out.payload.get("errCd").is_none());
    assert_eq!(out.payload["failed"].as_array().map(Vec::len), Some(2));
    assert_eq!(out.payload["failed"][0]["target"], json!("medical"));
    assert!(out.payload.get("data").is_none());
}

#[tokio::test]
async fn checkup_list_pages_years_and_reports_partial_year_failures() {
    let endpoints = EndpointConfig::default();
    let mock = MockUpstream::new();
    mock.push_err(
        &endpoints.checkup_list,
        relay_error(&endpoints.checkup_list, "E9", "기관 응답 지연"),
    )
    .await;
    mock.push_ok(
        &endpoints.checkup_list,
        relay_ok(json!({"list": [{"name": "Kim", "inqryResList": [{"checkUpType": "일반", "result": "정상"}]}]})),
    )
    .await;
    mock.push_ok(
        &endpoints.checkup_list,
        relay_ok(json!({"list": [{"name": "Kim", "inqryResList": [
            {"checkUpType": "일반", "detailKey": "K1", "detailKey2": "K1b"}
        ]}]})),
    )
    .await;
    mock.push_ok(
        &endpoints.checkup_yearly,
        relay_ok(json!({"list": [{"itemName": "혈색소", "itemData": "13.2"}]})),
    )
    .await;

    let out = run(&mock, &input(&[FetchTarget::CheckupList, FetchTarget::CheckupYearly], 3)).await;

    let years: Vec<Value> = mock
        .calls_to(&endpoints.checkup_list)
        .await
        .into_iter()
        .map(|c| c.payload["yyyy"].clone())
        .collect();
    assert_eq!(years, vec![json!("2026"), json!("2025"), json!("2024")]);

    let yearly = mock.calls_to(&endpoints.checkup_yearly).await;
    assert_eq!(yearly.len(), 1);
    assert_eq!(yearly[0].payload["detailKey"], json!("K1"));
    assert_eq!(yearly[0].payload["detailKey2"], json!("K1b"));

    assert_eq!(out.payload["ok"], json!(true));
    assert_eq!(out.payload["partial"], json!(true));
    assert_eq!(out.payload["failed"][0]["target"], json!("checkupList"));
    assert_eq!(
        out.payload["failed"][0]["errMsg"],
        json!("건강검진 목록 일부 조회에 실패했습니다. (2026: 기관 응답 지연)")
    );

    let by_year = out.payload["data"]["raw"]["checkupListByYear"]
        .as_object()
        .expect("by-year map");
    assert_eq!(by_year.len(), 3);
    assert_eq!(by_year["2026"]["common"]["errCd"], json!("E9"));
    assert_eq!(out.payload["data"]["raw"]["checkupYearly"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn yearly_detail_stops_paging_at_first_year_with_keys() {
    let endpoints = EndpointConfig::default();
    let mock = MockUpstream::new();
    mock.push_ok(
        &endpoints.checkup_list,
        relay_ok(json!({"list": [{"inqryResList": [{"detailKey": "A"}, {"detailKey": "B"}]}]})),
    )
    .await;
    mock.set_fallback(&endpoints.checkup_yearly, Ok(relay_ok(json!({"list": []}))))
        .await;

    let out = run(&mock, &input(&[FetchTarget::CheckupList, FetchTarget::CheckupYearly], 3)).await;

    assert_eq!(mock.calls_to(&endpoints.checkup_list).await.len(), 1);
    assert_eq!(mock.calls_to(&endpoints.checkup_yearly).await.len(), 2);
    assert_eq!(out.payload["partial"], json!(false));
}

#[tokio::test]
async fn list_without_keys_counts_yearly_as_empty_success() {
    let endpoints = EndpointConfig::default();
    let mock = MockUpstream::new();
    mock.set_fallback(&endpoints.checkup_list, Ok(relay_ok(json!({"list": []}))))
        .await;

    let out = run(&mock, &input(&[FetchTarget::CheckupList, FetchTarget::CheckupYearly], 2)).await;

    assert_eq!(mock.calls_to(&endpoints.checkup_list).await.len(), 2);
    assert!(mock.calls_to(&endpoints.checkup_yearly).await.is_empty());
    assert_eq!(out.payload["ok"], json!(true));
    assert_eq!(out.payload["partial"], json!(false));
    assert_eq!(out.payload["data"]["raw"]["checkupYearly"], Value::Null);
}

#[tokio::test]
async fn list_failing_every_year_is_a_target_failure() {
    let endpoints = EndpointConfig::default();
    let mock = MockUpstream::new();
    mock.push_ok(&endpoints.health_age, relay_ok(json!({"healthAge": 50}))).await;

    let out = run(&mock, &input(&[FetchTarget::CheckupList, FetchTarget::HealthAge], 1)).await;

    assert_eq!(out.payload["ok"], json!(true));
    assert_eq!(out.payload["partial"], json!(true));
    assert_eq!(
        out.payload["failed"],
        json!([{"target": "checkupList", "errMsg": "건강검진 목록을 불러오지 못했습니다."}])
    );
    assert_eq!(out.payload["data"]["raw"]["checkupList"], json!({}));
}
