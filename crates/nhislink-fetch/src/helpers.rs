// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request shaping and payload scanning used by the fetch executor.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Duration, NaiveDate, SecondsFormat, Utc};
use serde_json::{Map, Value, json};

use nhislink_config::model::FetchConfig;
use nhislink_core::NhisLink;

const YMD_FORMAT: &str = "%Y%m%d";
const MEDICATION_SEARCH_WINDOW_DAYS: [i64; 3] = [30, 180, 365];
const MAX_SCAN_DEPTH: usize = 8;

const DETAIL_KEY_SPELLINGS: [&str; 3] = ["detailKey", "detail_key", "detailkey"];
const DETAIL_KEY2_SPELLINGS: [&str; 3] = ["detailKey2", "detail_key2", "detailkey2"];

/// Raw payload sections searched for session artifacts, in priority order.
const ARTIFACT_SOURCES: [&str; 6] = [
    "medication",
    "medical",
    "checkupOverview",
    "healthAge",
    "checkupYearly",
    "checkupList",
];

/// Date window and subject type sent with every relay request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDefaults {
    /// `YYYYMMDD`.
    pub from_date: String,
    /// `YYYYMMDD`.
    pub to_date: String,
    pub subject_type: String,
}

impl RequestDefaults {
    /// A window of `request_window_years` ending at `today`.
    pub fn for_day(config: &FetchConfig, today: NaiveDate) -> Self {
        let years = config.request_window_years.max(1);
        let from = i32::try_from(years)
            .ok()
            .and_then(|y| today.with_year(today.year() - y))
            .unwrap_or_else(|| today - Duration::days(365 * i64::from(years)));
        Self {
            from_date: from.format(YMD_FORMAT).to_string(),
            to_date: today.format(YMD_FORMAT).to_string(),
            subject_type: config.subject_type.clone(),
        }
    }
}

/// A `fromDate`/`toDate` override for one medication search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateWindow {
    pub from_date: String,
    pub to_date: String,
}

impl DateWindow {
    fn new(from_date: impl Into<String>, to_date: impl Into<String>) -> Self {
        Self {
            from_date: from_date.into(),
            to_date: to_date.into(),
        }
    }
}

/// Keys identifying one checkup detail record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailKeyPair {
    pub detail_key: String,
    pub detail_key2: Option<String>,
}

/// Login session blobs found in a fetch payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionArtifacts {
    pub cookie_data: Option<Value>,
    pub step_data: Option<Value>,
}

impl SessionArtifacts {
    fn is_complete(&self) -> bool {
        self.cookie_data.is_some() && self.step_data.is_some()
    }
}

fn non_empty_text(value: Option<&Value>) -> Option<String> {
    value?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn leading_year(date: &str) -> Option<i32> {
    let head = date.get(..4)?;
    if !head.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    head.parse().ok()
}

fn parse_ymd(value: &str) -> Option<NaiveDate> {
    if value.len() != 8 || !value.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(value, YMD_FORMAT).ok()
}

/// Checkup years to page through, newest first, at most `max_years`.
///
/// Years are taken from the first four characters of each date and bounded
/// to 1900..=2100. Unparseable input yields `[fallback_year]`.
pub fn parse_years(from_date: &str, to_date: &str, max_years: usize, fallback_year: i32) -> Vec<String> {
    let (Some(from), Some(to)) = (leading_year(from_date), leading_year(to_date)) else {
        return vec![fallback_year.to_string()];
    };
    let start = from.min(to).max(1900);
    let end = from.max(to).min(2100);
    (start..=end)
        .rev()
        .take(max_years.max(1))
        .map(|year| year.to_string())
        .collect()
}

struct DetailKeyCollector {
    max_pairs: usize,
    seen: HashSet<String>,
    out: Vec<DetailKeyPair>,
}

impl DetailKeyCollector {
    fn full(&self) -> bool {
        self.out.len() >= self.max_pairs
    }

    fn visit(&mut self, value: &Value, depth: usize) {
        if depth > MAX_SCAN_DEPTH || self.full() {
            return;
        }
        match value {
            Value::Array(items) => {
                for item in items {
                    if self.full() {
                        break;
                    }
                    self.visit(item, depth + 1);
                }
            }
            Value::Object(record) => {
                let first = |keys: &[&str]| keys.iter().find_map(|k| non_empty_text(record.get(*k)));
                if let Some(detail_key) = first(&DETAIL_KEY_SPELLINGS[..]) {
                    let detail_key2 = first(&DETAIL_KEY2_SPELLINGS[..]);
                    let signature = format!("{detail_key}|{}", detail_key2.as_deref().unwrap_or(""));
                    if self.seen.insert(signature) {
                        self.out.push(DetailKeyPair {
                            detail_key,
                            detail_key2,
                        });
                    }
                }
                for child in record.values() {
                    if self.full() {
                        break;
                    }
                    self.visit(child, depth + 1);
                }
            }
            _ => {}
        }
    }
}

/// Distinct `detailKey`/`detailKey2` pairs found anywhere in `value`, in
/// document order, scanning at most eight levels deep.
pub fn collect_detail_key_pairs(value: &Value, max_pairs: usize) -> Vec<DetailKeyPair> {
    let mut collector = DetailKeyCollector {
        max_pairs,
        seen: HashSet::new(),
        out: Vec::new(),
    };
    collector.visit(value, 0);
    collector.out
}

/// Concatenate the `data.list` arrays of per-year checkup list payloads.
pub fn merge_list_payloads(payloads: &[Value]) -> Value {
    let mut list = Vec::new();
    let mut years = Vec::new();
    for payload in payloads {
        let data = payload.get("data").and_then(Value::as_object);
        if let Some(items) = data.and_then(|d| d.get("list")).and_then(Value::as_array) {
            list.extend(items.iter().cloned());
        }
        let year = data.and_then(|d| {
            ["yyyy", "year", "businessYear"]
                .iter()
                .find_map(|key| d.get(*key).filter(|v| !v.is_null()))
        });
        if let Some(year) = non_empty_text(year) {
            years.push(year);
        }
    }
    json!({"data": {"list": list, "years": years}})
}

fn push_unique(windows: &mut Vec<DateWindow>, window: DateWindow) {
    if !windows.contains(&window) {
        windows.push(window);
    }
}

/// Medication lookup windows: the last 30, 180 and 365 days up to `to_date`
/// (never earlier than `from_date`), then the full window.
///
/// Falls back to the full window alone when `to_date` is not a `YYYYMMDD` date.
pub fn medication_search_windows(from_date: &str, to_date: &str) -> Vec<DateWindow> {
    let Some(to) = parse_ymd(to_date) else {
        return vec![DateWindow::new(from_date, to_date)];
    };
    let from = parse_ymd(from_date);

    let mut windows = Vec::new();
    for days in MEDICATION_SEARCH_WINDOW_DAYS {
        let candidate = to - Duration::days(days - 1);
        let bounded = match from {
            Some(from) if candidate < from => from,
            _ => candidate,
        };
        push_unique(
            &mut windows,
            DateWindow::new(bounded.format(YMD_FORMAT).to_string(), to_date),
        );
    }
    push_unique(&mut windows, DateWindow::new(from_date, to_date));
    windows
}

/// RFC 3339 with millisecond precision and a `Z` suffix.
pub fn to_iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A copy of `base` with `fields` set.
pub fn with_fields(base: &Value, fields: &[(&str, Value)]) -> Value {
    let mut payload = base.clone();
    if let Value::Object(map) = &mut payload {
        for (key, value) in fields {
            map.insert((*key).to_string(), value.clone());
        }
    }
    payload
}

/// Request body shared by every target.
pub fn build_base_payload(link: &NhisLink, defaults: &RequestDefaults) -> Value {
    let mut payload = Map::new();
    payload.insert(
        "loginMethod".into(),
        Value::String(link.login_method.clone().unwrap_or_else(|| "EASY".into())),
    );
    if let Some(org) = &link.login_org_cd {
        payload.insert("loginOrgCd".into(), Value::String(org.clone()));
    }
    payload.insert("fromDate".into(), Value::String(defaults.from_date.clone()));
    payload.insert("toDate".into(), Value::String(defaults.to_date.clone()));
    payload.insert("subjectType".into(), Value::String(defaults.subject_type.clone()));
    if let Some(cookie) = link.cookie_data.as_ref().filter(|v| !v.is_null()) {
        payload.insert("cookieData".into(), cookie.clone());
    }
    payload.insert("showCookie".into(), Value::String("Y".into()));
    Value::Object(payload)
}

/// Request body for targets that return itemized detail.
pub fn build_detail_payload(base: &Value) -> Value {
    with_fields(
        base,
        &[("detailYn", json!("Y")), ("imgYn", json!("N"))],
    )
}

fn first_non_null<'a>(
    record: &'a Map<String, Value>,
    data: Option<&'a Map<String, Value>>,
    keys: [&str; 2],
) -> Option<&'a Value> {
    let from_data = data.into_iter().flat_map(|d| keys.iter().map(move |k| d.get(*k)));
    let from_record = keys.iter().map(|k| record.get(*k));
    from_data
        .chain(from_record)
        .flatten()
        .find(|v| !v.is_null())
}

fn collect_artifacts(value: &Value, found: &mut SessionArtifacts, depth: usize) {
    if depth > MAX_SCAN_DEPTH {
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                collect_artifacts(item, found, depth + 1);
                if found.is_complete() {
                    return;
                }
            }
        }
        Value::Object(record) => {
            let data = record.get("data").and_then(Value::as_object);
            if found.cookie_data.is_none() {
                found.cookie_data = first_non_null(record, data, ["cookieData", "cookie_data"]).cloned();
            }
            if found.step_data.is_none() {
                found.step_data = first_non_null(record, data, ["stepData", "step_data"]).cloned();
            }
            if found.is_complete() {
                return;
            }
            for child in record.values() {
                collect_artifacts(child, found, depth + 1);
                if found.is_complete() {
                    return;
                }
            }
        }
        _ => {}
    }
}

/// Cookie and step blobs anywhere in a relay response.
pub fn session_artifacts_from_response(response: &Value) -> SessionArtifacts {
    let mut found = SessionArtifacts::default();
    collect_artifacts(response, &mut found, 0);
    found
}

/// Cookie and step blobs from `data.raw` of a fetch payload.
///
/// Sections are searched medication first, then medical, overview, health
/// age, yearly detail and list; the first non-null value of each blob wins.
pub fn extract_session_artifacts(payload: &Value) -> SessionArtifacts {
    let mut found = SessionArtifacts::default();
    let Some(raw) = payload.pointer("/data/raw").and_then(Value::as_object) else {
        return found;
    };
    for key in ARTIFACT_SOURCES {
        if let Some(section) = raw.get(key) {
            collect_artifacts(section, &mut found, 0);
        }
        if found.is_complete() {
            break;
        }
    }
    found
}
