// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Field-probing helpers shared by the normalizers.

use serde_json::{Map, Value};

/// A flat record of primitive values (string, number, bool).
pub type NhisRow = Map<String, Value>;

static EMPTY_RECORD: std::sync::LazyLock<Map<String, Value>> =
    std::sync::LazyLock::new(Map::new);

/// The value as an object, if it is one.
pub fn as_record(value: &Value) -> Option<&Map<String, Value>> {
    value.as_object()
}

/// The value as an array, or an empty slice.
pub fn as_array(value: Option<&Value>) -> &[Value] {
    value
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// The value when it is a string, number or bool.
pub fn as_primitive(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| v.is_string() || v.is_number() || v.is_boolean())
}

/// Non-empty trimmed text for strings, numbers and bools.
pub fn to_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// The first of `keys` that holds text.
pub fn first_text(record: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| to_text(record.get(*key)))
}

/// The first of `keys` that holds a primitive.
pub fn first_primitive<'a>(record: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| as_primitive(record.get(*key)))
}

/// `payload.data` when it is an object, else the payload itself, else an empty object.
pub fn payload_data(payload: &Value) -> &Map<String, Value> {
    let Some(root) = payload.as_object() else {
        return &EMPTY_RECORD;
    };
    root.get("data").and_then(Value::as_object).unwrap_or(root)
}

/// The row list of a payload: `data.list`, `data` itself when it is an array,
/// or the payload root when it is an array.
pub fn list_from_payload(payload: &Value) -> &[Value] {
    if let Some(list) = payload.as_array() {
        return list;
    }
    if let Some(data) = payload.get("data") {
        if let Some(list) = data.as_array() {
            return list;
        }
        if let Some(list) = data.get("list").and_then(Value::as_array) {
            return list;
        }
    }
    as_array(payload.get("list"))
}

/// Copy primitive fields of `source` into `row`, skipping `skip` keys and keys
/// already present.
pub fn merge_primitive_fields(row: &mut NhisRow, source: Option<&Map<String, Value>>, skip: &[&str]) {
    let Some(source) = source else {
        return;
    };
    for (key, value) in source {
        if skip.contains(&key.as_str()) || row.contains_key(key) {
            continue;
        }
        if let Some(primitive) = as_primitive(Some(value)) {
            row.insert(key.clone(), primitive.clone());
        }
    }
}

/// `key: value | key: value` rendering of a row's text fields.
pub fn to_compact_line(value: &Value) -> Option<String> {
    let Some(record) = value.as_object() else {
        return to_text(Some(value));
    };
    let pairs: Vec<String> = record
        .iter()
        .filter_map(|(key, raw)| to_text(Some(raw)).map(|text| format!("{key}: {text}")))
        .collect();
    (!pairs.is_empty()).then(|| pairs.join(" | "))
}

/// Up to `limit` compact lines from `rows`.
pub fn summary_lines<'a>(rows: impl IntoIterator<Item = &'a Value>, limit: usize) -> Vec<String> {
    rows.into_iter()
        .filter_map(to_compact_line)
        .take(limit)
        .collect()
}
