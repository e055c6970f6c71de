// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Normalizers for NHIS relay payloads.
//!
//! Relay responses have no stable schema, so every function here works on
//! [`serde_json::Value`], tries several field spellings, and degrades to an
//! empty but well-typed result instead of failing. Nothing in this crate
//! returns an error or panics on malformed input.

pub mod checkup;
pub mod health_age;
pub mod payload;
pub mod recommendation;
pub mod shared;
pub mod treatment;

pub use checkup::{
    has_meaningful_checkup_row, normalize_checkup_list, normalize_checkup_overview,
    normalize_checkup_yearly, CheckupListRows,
};
pub use health_age::{normalize_health_age, HealthAgeSummary};
pub use payload::{
    extract_failed_targets, normalize_nhis_payload, CheckupCounts, CheckupSummary,
    NhisPayloadInput, NormalizedNhisPayload,
};
pub use recommendation::{normalize_recommendation_summary, RecommendationInput, RecommendationSummary};
pub use shared::NhisRow;
pub use treatment::{normalize_treatment, ListSummary, TreatmentSummary};
