// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recommendation summary: compact timelines and keyword digests built from
//! already-normalized rows.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

use crate::shared::{NhisRow, first_text, to_text};

const DIAGNOSIS_LIMIT: usize = 40;
const MEDICATION_LIMIT: usize = 60;
const INGREDIENT_LIMIT: usize = 120;
const CAUTION_LIMIT: usize = 80;
const FINDING_LIMIT: usize = 80;

const INGREDIENT_KEYWORDS: &[&str] = &["cmpn_nm", "ingredient"];
const CAUTION_KEYWORDS: &[&str] = &["기기", "주의", "caution", "dur", "age_incp", "prgw_grde"];

const DIAGNOSIS_KEYS: &[&str] = &[
    "diagNm",
    "diseaseNm",
    "sickNm",
    "mainSickNm",
    "diagType",
    "medicineEffect",
    "detail_MOHW_CLSF",
];
const DATE_KEYS: &[&str] = &["diagDate", "medDate"];
const PLACE_KEYS: &[&str] = &["hospitalNm", "hspNm", "pharmNm"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationSummary {
    pub diagnosis_timeline: Vec<NhisRow>,
    pub medication_timeline: Vec<NhisRow>,
    pub active_ingredients: Vec<String>,
    pub cautions: Vec<String>,
    pub checkup_findings: Vec<NhisRow>,
}

/// Normalized row sets the summary draws from.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecommendationInput<'a> {
    pub medical: &'a [NhisRow],
    pub medication: &'a [NhisRow],
    pub checkup_list: &'a [NhisRow],
    pub checkup_yearly: &'a [NhisRow],
    pub checkup_overview: &'a [NhisRow],
}

fn put(row: &mut NhisRow, key: &str, value: Option<String>) {
    if let Some(value) = value {
        row.insert(key.to_string(), Value::String(value));
    }
}

fn diagnosis_timeline(rows: &[NhisRow]) -> Vec<NhisRow> {
    rows.iter()
        .filter_map(|row| {
            let diagnosis = first_text(row, DIAGNOSIS_KEYS);
            let date = first_text(row, DATE_KEYS);
            let place = first_text(row, PLACE_KEYS);
            if diagnosis.is_none() && date.is_none() && place.is_none() {
                return None;
            }
            let mut out = NhisRow::new();
            put(&mut out, "date", date);
            put(&mut out, "diagnosis", diagnosis);
            put(&mut out, "place", place);
            put(&mut out, "subject", first_text(row, &["subject"]));
            put(&mut out, "examinee", first_text(row, &["examinee"]));
            Some(out)
        })
        .take(DIAGNOSIS_LIMIT)
        .collect()
}

fn medication_timeline(rows: &[NhisRow]) -> Vec<NhisRow> {
    rows.iter()
        .filter_map(|row| {
            let medicine = first_text(row, &["medicineNm", "drug_MEDI_PRDC_NM", "MEDI_PRDC_NM"]);
            let ingredient = first_text(row, &["drug_CMPN_NM", "CMPN_NM", "drug_CMPN_NM_2"]);
            let effect = first_text(row, &["medicineEffect", "drug_EFFT_EFT_CNT", "EFFT_EFT_CNT"]);
            if medicine.is_none() && ingredient.is_none() && effect.is_none() {
                return None;
            }
            let mut out = NhisRow::new();
            put(&mut out, "date", first_text(row, DATE_KEYS));
            put(&mut out, "medicine", medicine);
            put(&mut out, "ingredient", ingredient);
            put(&mut out, "effect", effect);
            put(&mut out, "dosageDay", first_text(row, &["dosageDay"]));
            Some(out)
        })
        .take(MEDICATION_LIMIT)
        .collect()
}

/// Distinct text values of fields whose lowercased key contains a keyword.
fn collect_by_keywords(rows: &[NhisRow], keywords: &[&str], max: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for row in rows {
        for (key, value) in row {
            let key = key.to_lowercase();
            if !keywords.iter().any(|kw| key.contains(kw)) {
                continue;
            }
            let Some(text) = to_text(Some(value)) else {
                continue;
            };
            if seen.insert(text.clone()) {
                out.push(text);
                if out.len() >= max {
                    return out;
                }
            }
        }
    }
    out
}

fn checkup_findings(input: &RecommendationInput<'_>) -> Vec<NhisRow> {
    input
        .checkup_overview
        .iter()
        .chain(input.checkup_list)
        .chain(input.checkup_yearly)
        .filter_map(|row| {
            let mut finding = NhisRow::new();
            put(&mut finding, "year", first_text(row, &["year"]));
            put(&mut finding, "category", first_text(row, &["checkUpType", "title", "qtitle"]));
            put(
                &mut finding,
                "result",
                first_text(row, &["result", "chkResult", "total", "itemData"]),
            );
            put(&mut finding, "note", first_text(row, &["opinion", "chkAgency", "itemName"]));
            (!finding.is_empty()).then_some(finding)
        })
        .take(FINDING_LIMIT)
        .collect()
}

pub fn normalize_recommendation_summary(input: RecommendationInput<'_>) -> RecommendationSummary {
    RecommendationSummary {
        diagnosis_timeline: diagnosis_timeline(input.medical),
        medication_timeline: medication_timeline(input.medication),
        active_ingredients: collect_by_keywords(input.medication, INGREDIENT_KEYWORDS, INGREDIENT_LIMIT),
        cautions: collect_by_keywords(input.medication, CAUTION_KEYWORDS, CAUTION_LIMIT),
        checkup_findings: checkup_findings(&input),
    }
}
