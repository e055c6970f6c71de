// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hyphen relay adapter for the NHIS fetch orchestrator.
//!
//! Implements [`nhislink_core::NhisUpstream`] over HTTP. Every call is a JSON
//! POST to one endpoint path; the relay reports failures either through the
//! HTTP status or through `common.errYn = "Y"` on a 200 response.

pub mod client;

pub use client::HyphenClient;
