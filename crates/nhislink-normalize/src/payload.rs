// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Top-level composition of the per-target normalizers.

use std::str::FromStr;

use nhislink_core::FetchTarget;
use serde::Serialize;
use serde_json::Value;

use crate::checkup::{normalize_checkup_list, normalize_checkup_overview, normalize_checkup_yearly};
use crate::health_age::{HealthAgeSummary, normalize_health_age};
use crate::recommendation::{
    RecommendationInput, RecommendationSummary, normalize_recommendation_summary,
};
use crate::shared::{NhisRow, summary_lines};
use crate::treatment::{TreatmentSummary, normalize_treatment};

const CHECKUP_RECENT_LINE_LIMIT: usize = 5;

/// Raw successful payloads per target. Targets that were not fetched or
/// failed are passed as `Value::Null` / empty slices.
#[derive(Debug, Clone, Copy)]
pub struct NhisPayloadInput<'a> {
    pub medical: &'a Value,
    pub medication: &'a Value,
    pub checkup_list: &'a [Value],
    pub checkup_yearly: &'a [Value],
    pub checkup_overview: &'a Value,
    pub health_age: &'a Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckupCounts {
    pub list_count: usize,
    pub yearly_count: usize,
    pub overview_count: usize,
    pub year_count: usize,
    pub people_count: usize,
    pub recent_lines: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckupSummary {
    pub list: Vec<NhisRow>,
    pub yearly: Vec<NhisRow>,
    pub overview: Vec<NhisRow>,
    pub summary: CheckupCounts,
}

/// Stable shape returned under `data.normalized`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedNhisPayload {
    pub medical: TreatmentSummary,
    pub medication: TreatmentSummary,
    pub checkup: CheckupSummary,
    pub health_age: HealthAgeSummary,
    pub recommendation: RecommendationSummary,
}

pub fn normalize_nhis_payload(input: NhisPayloadInput<'_>) -> NormalizedNhisPayload {
    let medical = normalize_treatment(input.medical);
    let medication = normalize_treatment(input.medication);
    let list = normalize_checkup_list(input.checkup_list);
    let yearly = normalize_checkup_yearly(input.checkup_yearly);
    let overview = normalize_checkup_overview(input.checkup_overview);

    let preview: Vec<Value> = overview
        .iter()
        .chain(&list.rows)
        .take(CHECKUP_RECENT_LINE_LIMIT)
        .cloned()
        .map(Value::Object)
        .collect();

    let recommendation = normalize_recommendation_summary(RecommendationInput {
        medical: &medical.list,
        medication: &medication.list,
        checkup_list: &list.rows,
        checkup_yearly: &yearly,
        checkup_overview: &overview,
    });

    let summary = CheckupCounts {
        list_count: list.rows.len(),
        yearly_count: yearly.len(),
        overview_count: overview.len(),
        year_count: list.year_count,
        people_count: list.people_count,
        recent_lines: summary_lines(&preview, CHECKUP_RECENT_LINE_LIMIT),
    };

    NormalizedNhisPayload {
        medical,
        medication,
        checkup: CheckupSummary {
            list: list.rows,
            yearly,
            overview,
            summary,
        },
        health_age: normalize_health_age(input.health_age),
        recommendation,
    }
}

/// Target names listed under `failed` in a fetch payload, deduplicated.
///
/// Entries may be `{ "target": "..." }` objects or bare strings; unknown
/// names are skipped.
pub fn extract_failed_targets(payload: &Value) -> Vec<FetchTarget> {
    let mut out = Vec::new();
    let Some(failed) = payload.get("failed").and_then(Value::as_array) else {
        return out;
    };
    for entry in failed {
        let name = match entry {
            Value::String(s) => Some(s.as_str()),
            Value::Object(obj) => obj.get("target").and_then(Value::as_str),
            _ => None,
        };
        let Some(target) = name.and_then(|n| FetchTarget::from_str(n.trim()).ok()) else {
            continue;
        };
        if !out.contains(&target) {
            out.push(target);
        }
    }
    out
}
