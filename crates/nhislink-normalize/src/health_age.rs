// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Health-age normalizer.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::shared::{as_array, first_text, payload_data};

const HEALTH_AGE_KEYS: &[&str] = &["healthAge", "health_age", "hAge"];
const REAL_AGE_KEYS: &[&str] = &["realAge", "real_age", "age"];
const CHECKUP_DATE_KEYS: &[&str] = &["checkupDate", "checkup_date", "chkDate", "examDate"];
const ADVICE_KEYS: &[&str] = &["advice", "healthAdvice", "health_advice", "comment"];
const RISK_FACTOR_KEYS: &[&str] = &[
    "riskFactorTable",
    "risk_factor_table",
    "riskFactors",
    "riskFactorList",
];

/// Normalized health-age estimate. Every field is optional; an empty source
/// yields nulls and an empty risk table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthAgeSummary {
    /// String or number, as the relay sent it.
    pub health_age: Option<Value>,
    pub real_age: Option<Value>,
    pub checkup_date: Option<String>,
    pub advice: Option<String>,
    pub risk_factor_table: Value,
}

impl Default for HealthAgeSummary {
    fn default() -> Self {
        Self {
            health_age: None,
            real_age: None,
            checkup_date: None,
            advice: None,
            risk_factor_table: Value::Array(Vec::new()),
        }
    }
}

fn age_value(record: &Map<String, Value>, keys: &[&str]) -> Option<Value> {
    keys.iter()
        .find_map(|key| {
            record.get(*key).filter(|v| match v {
                Value::String(s) => !s.trim().is_empty(),
                Value::Number(_) => true,
                _ => false,
            })
        })
        .cloned()
}

fn is_well_formed(record: &Map<String, Value>) -> bool {
    age_value(record, HEALTH_AGE_KEYS).is_some() || age_value(record, REAL_AGE_KEYS).is_some()
}

/// The record to read from: the first well-formed entry of `list` when the
/// payload is a list, otherwise the payload data itself.
fn source_record(payload: &Value) -> Option<&Map<String, Value>> {
    let data = payload_data(payload);
    let list = match payload.as_array() {
        Some(list) => list.as_slice(),
        None => as_array(data.get("list")),
    };
    if list.is_empty() {
        return Some(data);
    }
    let records = || list.iter().filter_map(Value::as_object);
    records().find(|r| is_well_formed(r)).or_else(|| records().next())
}

pub fn normalize_health_age(payload: &Value) -> HealthAgeSummary {
    let Some(record) = source_record(payload) else {
        return HealthAgeSummary::default();
    };

    let risk_factor_table = RISK_FACTOR_KEYS
        .iter()
        .find_map(|key| record.get(*key).filter(|v| !v.is_null()))
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));

    HealthAgeSummary {
        health_age: age_value(record, HEALTH_AGE_KEYS),
        real_age: age_value(record, REAL_AGE_KEYS),
        checkup_date: first_text(record, CHECKUP_DATE_KEYS),
        advice: first_text(record, ADVICE_KEYS),
        risk_factor_table,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn empty_object_yields_empty_summary() {
        let out = normalize_health_age(&json!({}));
        assert_eq!(out, HealthAgeSummary::default());
        let json = serde_json::to_value(&out).unwrap();
        assert!(json["healthAge"].is_null());
        assert!(json["realAge"].is_null());
        assert!(json["checkupDate"].is_null());
        assert!(json["advice"].is_null());
        assert_eq!(json["riskFactorTable"], json!([]));
    }

    #[test]
    fn list_source_picks_first_record() {
        let out = normalize_health_age(&json!({"list": [{"healthAge": 45, "age": 50}]}));
        assert_eq!(out.health_age, Some(json!(45)));
        assert_eq!(out.real_age, Some(json!(50)));
    }

    #[test]
    fn list_source_skips_malformed_entries() {
        let out = normalize_health_age(&json!({
            "data": {"list": ["junk", {"note": "x"}, {"health_age": "41", "real_age": "44"}]}
        }));
        assert_eq!(out.health_age, Some(json!("41")));
        assert_eq!(out.real_age, Some(json!("44")));
    }

    #[test]
    fn reads_alternate_spellings() {
        let out = normalize_health_age(&json!({
            "data": {
                "hAge": 38,
                "realAge": 40,
                "chkDate": "2024.03.02",
                "advice": " 운동을 늘리세요 ",
                "riskFactors": [{"factor": "bmi"}]
            }
        }));
        assert_eq!(out.health_age, Some(json!(38)));
        assert_eq!(out.real_age, Some(json!(40)));
        assert_eq!(out.checkup_date.as_deref(), Some("2024.03.02"));
        assert_eq!(out.advice.as_deref(), Some("운동을 늘리세요"));
        assert_eq!(out.risk_factor_table, json!([{"factor": "bmi"}]));
    }

    #[test]
    fn non_scalar_ages_are_ignored() {
        let out = normalize_health_age(&json!({"healthAge": {"value": 3}, "age": true}));
        assert_eq!(out.health_age, None);
        assert_eq!(out.real_age, None);
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|n| json!(n)),
            "[a-zA-Z_]{0,8}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                proptest::collection::btree_map("[a-zA-Z_]{1,10}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn never_panics_on_arbitrary_json(payload in arb_json()) {
            let out = normalize_health_age(&payload);
            if let Some(age) = &out.health_age {
                prop_assert!(age.is_string() || age.is_number());
            }
        }
    }
}
