// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Medical and medication history normalizer.
//!
//! Treatment payloads list visits; a visit may nest its prescriptions or
//! dispensed drugs as arrays of objects. Each nested entry becomes its own row
//! with the visit's fields merged in.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::shared::{NhisRow, first_text, list_from_payload, merge_primitive_fields, summary_lines};

const RECENT_LINE_LIMIT: usize = 5;
const PERSON_KEYS: &[&str] = &["examinee", "subject", "name", "resNm"];

/// Counts and preview lines for a row list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSummary {
    pub total_count: usize,
    pub recent_lines: Vec<String>,
    pub people_count: usize,
    /// Rows that came from nested entries rather than the visit itself.
    pub detail_count: usize,
}

/// Normalized medical or medication history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TreatmentSummary {
    pub list: Vec<NhisRow>,
    pub summary: ListSummary,
}

fn nested_records(visit: &Map<String, Value>) -> Vec<&Map<String, Value>> {
    visit
        .values()
        .filter_map(Value::as_array)
        .flat_map(|items| items.iter().filter_map(Value::as_object))
        .collect()
}

pub fn normalize_treatment(payload: &Value) -> TreatmentSummary {
    let mut list = Vec::new();
    let mut detail_count = 0;

    for visit in list_from_payload(payload).iter().filter_map(Value::as_object) {
        let nested = nested_records(visit);
        if nested.is_empty() {
            let mut row = NhisRow::new();
            merge_primitive_fields(&mut row, Some(visit), &[]);
            if !row.is_empty() {
                list.push(row);
            }
            continue;
        }
        for entry in nested {
            // nested fields win over the visit's on key collisions
            let mut row = NhisRow::new();
            merge_primitive_fields(&mut row, Some(entry), &[]);
            merge_primitive_fields(&mut row, Some(visit), &[]);
            list.push(row);
            detail_count += 1;
        }
    }

    let people: BTreeSet<String> = list
        .iter()
        .filter_map(|row| first_text(row, PERSON_KEYS))
        .collect();
    let preview: Vec<Value> = list.iter().take(RECENT_LINE_LIMIT).cloned().map(Value::Object).collect();

    TreatmentSummary {
        summary: ListSummary {
            total_count: list.len(),
            recent_lines: summary_lines(&preview, RECENT_LINE_LIMIT),
            people_count: people.len(),
            detail_count,
        },
        list,
    }
}
