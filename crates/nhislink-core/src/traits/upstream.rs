// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Upstream relay trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::UpstreamError;
use crate::traits::adapter::PluginAdapter;

/// A client for the NHIS data relay.
///
/// Each call posts a JSON payload to one endpoint path and returns the
/// decoded response document. Response shapes vary per endpoint and are
/// not contractually stable, so they stay untyped.
#[async_trait]
pub trait NhisUpstream: PluginAdapter {
    /// Posts `payload` to `endpoint` and returns the decoded body.
    async fn call(&self, endpoint: &str, payload: Value) -> Result<Value, UpstreamError>;
}
