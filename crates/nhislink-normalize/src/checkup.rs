// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Checkup list, yearly detail and overview normalizers.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::shared::{
    NhisRow, as_array, as_primitive, list_from_payload, merge_primitive_fields, payload_data,
    to_text,
};

/// Marker the relay uses on the checkup-date row of an overview.
const CHECKUP_DATE_MARKER: &str = "검진일";

/// Flattened checkup list rows with distinct person and year counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckupListRows {
    pub rows: Vec<NhisRow>,
    pub people_count: usize,
    pub year_count: usize,
}

fn guessed_year(data: &Map<String, Value>) -> Option<String> {
    ["yyyy", "year", "businessYear"]
        .iter()
        .find_map(|key| as_primitive(data.get(*key)))
        .and_then(|v| to_text(Some(v)))
}

/// One row per `list[].inqryResList[]` entry, with the person's fields merged
/// in. People without results still yield a row.
pub fn normalize_checkup_list(payloads: &[Value]) -> CheckupListRows {
    let mut rows = Vec::new();
    let mut people = BTreeSet::new();
    let mut years = BTreeSet::new();

    for payload in payloads {
        let data = payload_data(payload);
        let year = guessed_year(data);
        if let Some(year) = &year {
            years.insert(year.clone());
        }

        for person in as_array(data.get("list")).iter().filter_map(Value::as_object) {
            let name = to_text(person.get("name"));
            let biz_no = to_text(person.get("bizNo"));
            if name.is_some() || biz_no.is_some() {
                people.insert(format!(
                    "{}|{}",
                    name.unwrap_or_default(),
                    biz_no.unwrap_or_default()
                ));
            }

            let base = || {
                let mut row = NhisRow::new();
                if let Some(year) = &year {
                    row.insert("year".into(), Value::String(year.clone()));
                }
                merge_primitive_fields(&mut row, Some(person), &["inqryResList"]);
                row
            };

            let results = as_array(person.get("inqryResList"));
            if results.is_empty() {
                rows.push(base());
                continue;
            }
            for result in results {
                let mut row = base();
                merge_primitive_fields(&mut row, result.as_object(), &[]);
                rows.push(row);
            }
        }
    }

    CheckupListRows {
        rows,
        people_count: people.len(),
        year_count: years.len(),
    }
}

fn labelled_row(labels: &[(&str, Option<&Value>)]) -> NhisRow {
    let mut row = NhisRow::new();
    for (key, value) in labels {
        if let Some(value) = value {
            row.insert((*key).to_string(), (*value).clone());
        }
    }
    row
}

/// One row per `list[].checkList[].itemList[]` entry, labelled with the
/// section title, question title and the detail keys of the payload.
pub fn normalize_checkup_yearly(payloads: &[Value]) -> Vec<NhisRow> {
    let mut rows = Vec::new();

    for payload in payloads {
        let data = payload_data(payload);
        let detail_key = as_primitive(data.get("detailKey"));
        let detail_key2 = as_primitive(data.get("detailKey2"));

        for info in as_array(data.get("list")).iter().filter_map(Value::as_object) {
            let title = as_primitive(info.get("title"));
            let checks = as_array(info.get("checkList"));
            if checks.is_empty() {
                rows.push(labelled_row(&[
                    ("title", title),
                    ("detailKey", detail_key),
                    ("detailKey2", detail_key2),
                ]));
                continue;
            }

            for check in checks.iter().filter_map(Value::as_object) {
                let labels = [
                    ("title", title),
                    ("qtitle", as_primitive(check.get("qtitle"))),
                    ("detailKey", detail_key),
                    ("detailKey2", detail_key2),
                ];
                let items = as_array(check.get("itemList"));
                if items.is_empty() {
                    rows.push(labelled_row(&labels));
                    continue;
                }
                for item in items {
                    let mut row = labelled_row(&labels);
                    merge_primitive_fields(&mut row, item.as_object(), &[]);
                    rows.push(row);
                }
            }
        }
    }

    rows
}

fn is_checkup_date_row(detail: &Map<String, Value>) -> bool {
    ["type", "inspectItem"].iter().any(|key| {
        to_text(detail.get(*key)).is_some_and(|text| text.contains(CHECKUP_DATE_MARKER))
    })
}

/// One row per `chkResult[]` entry of each overview summary.
///
/// Rows carry the summary's year, checkup date, agency, overall result and
/// opinion, plus `metric`/`itemName` and `itemData`/`value` for the item.
pub fn normalize_checkup_overview(payload: &Value) -> Vec<NhisRow> {
    let mut rows = Vec::new();

    for summary in list_from_payload(payload).iter().filter_map(Value::as_object) {
        let details = as_array(summary.get("chkResult"));
        if details.is_empty() {
            let mut row = NhisRow::new();
            merge_primitive_fields(&mut row, Some(summary), &["chkResult"]);
            rows.push(row);
            continue;
        }

        let checkup_date = details
            .iter()
            .filter_map(Value::as_object)
            .filter(|detail| is_checkup_date_row(detail))
            .find_map(|detail| as_primitive(detail.get("result")));

        let header = labelled_row(&[
            ("year", as_primitive(summary.get("year"))),
            ("checkupDate", checkup_date),
            ("chkAgency", as_primitive(summary.get("chkAgency"))),
            ("overallResult", as_primitive(summary.get("result"))),
            ("opinion", as_primitive(summary.get("opinion"))),
        ]);

        for detail in details.iter().filter_map(Value::as_object) {
            let mut row = header.clone();
            let item_name = ["inspectItem", "type", "targetDis"]
                .iter()
                .find_map(|key| as_primitive(detail.get(*key)));
            if let Some(name) = item_name {
                row.insert("metric".into(), name.clone());
                row.insert("itemName".into(), name.clone());
            }
            if let Some(data) = as_primitive(detail.get("result")) {
                row.insert("itemData".into(), data.clone());
                let value = match (data, to_text(detail.get("unit"))) {
                    (Value::String(s), Some(unit)) => Value::String(format!("{s} {unit}")),
                    _ => data.clone(),
                };
                row.insert("value".into(), value);
            }
            merge_primitive_fields(&mut row, Some(detail), &[]);
            rows.push(row);
        }
    }

    rows
}

/// Whether an overview payload carries at least one row with a named metric or a value.
pub fn has_meaningful_checkup_row(payload: &Value) -> bool {
    normalize_checkup_overview(payload).iter().any(|row| {
        ["metric", "itemName", "itemData", "result"]
            .iter()
            .any(|key| to_text(row.get(*key)).is_some())
    })
}
