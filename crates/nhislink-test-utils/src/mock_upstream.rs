// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted relay for deterministic fetch tests.
//!
//! `MockUpstream` implements [`NhisUpstream`] with responses queued per
//! endpoint. Each queue pops in FIFO order; once an endpoint's queue is
//! empty, its fallback (if any) repeats, otherwise the call fails with a
//! transport error.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use nhislink_core::{
    AdapterType, HealthStatus, NhisError, NhisUpstream, PluginAdapter, UpstreamError,
};

type Scripted = Result<Value, UpstreamError>;

/// One call received by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub endpoint: String,
    pub payload: Value,
}

#[derive(Default)]
struct Script {
    queued: HashMap<String, VecDeque<Scripted>>,
    fallback: HashMap<String, Scripted>,
    calls: Vec<RecordedCall>,
}

/// A relay double with per-endpoint scripted responses.
#[derive(Clone, Default)]
pub struct MockUpstream {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

/// A successful relay body wrapping `data`.
pub fn relay_ok(data: Value) -> Value {
    json!({"common": {"errYn": "N"}, "data": data})
}

/// A relay failure as the HTTP client would report it.
pub fn relay_error(endpoint: &str, err_cd: &str, err_msg: &str) -> UpstreamError {
    let body = json!({"common": {"errYn": "Y", "errCd": err_cd, "errMsg": err_msg}});
    UpstreamError {
        message: err_msg.to_string(),
        status: Some(200),
        endpoint: endpoint.to_string(),
        err_cd: Some(err_cd.to_string()),
        err_msg: Some(err_msg.to_string()),
        body: Some(body),
    }
}

impl MockUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue one response for `endpoint`.
    pub async fn push(&self, endpoint: &str, response: Scripted) {
        self.script
            .lock()
            .await
            .queued
            .entry(endpoint.to_string())
            .or_default()
            .push_back(response);
    }

    /// Queue a successful body for `endpoint`.
    pub async fn push_ok(&self, endpoint: &str, body: Value) {
        self.push(endpoint, Ok(body)).await;
    }

    /// Queue a failure for `endpoint`.
    pub async fn push_err(&self, endpoint: &str, err: UpstreamError) {
        self.push(endpoint, Err(err)).await;
    }

    /// Response repeated for `endpoint` once its queue is drained.
    pub async fn set_fallback(&self, endpoint: &str, response: Scripted) {
        self.script
            .lock()
            .await
            .fallback
            .insert(endpoint.to_string(), response);
    }

    /// Every call received so far, in order.
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.script.lock().await.calls.clone()
    }

    /// Calls received for one endpoint, in order.
    pub async fn calls_to(&self, endpoint: &str) -> Vec<RecordedCall> {
        self.script
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.endpoint == endpoint)
            .cloned()
            .collect()
    }

    pub async fn call_count(&self) -> usize {
        self.script.lock().await.calls.len()
    }
}

#[async_trait]
impl PluginAdapter for MockUpstream {
    fn name(&self) -> &str {
        "mock-upstream"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Upstream
    }

    async fn health_check(&self) -> Result<HealthStatus, NhisError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), NhisError> {
        Ok(())
    }
}

#[async_trait]
impl NhisUpstream for MockUpstream {
    async fn call(&self, endpoint: &str, payload: Value) -> Result<Value, UpstreamError> {
        let response = {
            let mut script = self.script.lock().await;
            script.calls.push(RecordedCall {
                endpoint: endpoint.to_string(),
                payload,
            });
            let queued = script.queued.get_mut(endpoint).and_then(VecDeque::pop_front);
            queued.or_else(|| script.fallback.get(endpoint).cloned())
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        response.unwrap_or_else(|| {
            Err(UpstreamError::transport(
                endpoint,
                format!("no scripted response for {endpoint}"),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_responses_pop_in_order_then_fallback_repeats() {
        let mock = MockUpstream::new();
        mock.push_ok("/a", json!({"n": 1})).await;
        mock.push_err("/a", relay_error("/a", "E1", "bad")).await;
        mock.set_fallback("/a", Ok(json!({"n": 0}))).await;

        assert_eq!(mock.call("/a", json!({})).await.unwrap(), json!({"n": 1}));
        assert_eq!(mock.call("/a", json!({})).await.unwrap_err().code(), Some("E1"));
        assert_eq!(mock.call("/a", json!({})).await.unwrap(), json!({"n": 0}));
        assert_eq!(mock.call("/a", json!({})).await.unwrap(), json!({"n": 0}));
        assert_eq!(mock.call_count().await, 4);
    }

    #[tokio::test]
    async fn unscripted_endpoint_fails_and_is_recorded() {
        let mock = MockUpstream::new();
        let err = mock.call("/missing", json!({"x": 1})).await.unwrap_err();
        assert_eq!(err.endpoint, "/missing");
        let calls = mock.calls_to("/missing").await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].payload, json!({"x": 1}));
    }
}
