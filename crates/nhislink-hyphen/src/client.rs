// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Hyphen relay.
//!
//! Provides [`HyphenClient`] which handles authentication headers, relay
//! error envelopes and transient error retry.

use std::time::Duration;

use async_trait::async_trait;
use nhislink_config::model::{AuthMode, HyphenConfig};
use nhislink_core::{
    AdapterType, HealthStatus, NhisError, NhisUpstream, PluginAdapter, UpstreamError,
};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// HTTP client for relay communication.
///
/// Manages authentication headers, connection pooling, and retry logic
/// for transient errors (429, 500, 503).
#[derive(Debug, Clone)]
pub struct HyphenClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, NhisError> {
    HeaderValue::from_str(value)
        .map_err(|e| NhisError::Config(format!("invalid {name} header value: {e}")))
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

impl HyphenClient {
    /// Creates a client from the relay configuration.
    ///
    /// Fails when the credentials required by the configured auth mode are missing.
    pub fn new(config: &HyphenConfig) -> Result<Self, NhisError> {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        match config.auth_mode {
            AuthMode::Oauth => {
                let token = non_empty(config.access_token.as_ref()).ok_or_else(|| {
                    NhisError::Config("hyphen.access_token must be set when auth_mode = \"oauth\"".into())
                })?;
                headers.insert("authorization", header_value("authorization", &format!("Bearer {token}"))?);
            }
            AuthMode::Header => {
                let (Some(user_id), Some(hkey)) =
                    (non_empty(config.user_id.as_ref()), non_empty(config.hkey.as_ref()))
                else {
                    return Err(NhisError::Config(
                        "hyphen.user_id and hyphen.hkey must be set when auth_mode = \"header\"".into(),
                    ));
                };
                headers.insert("user-id", header_value("user-id", user_id)?);
                headers.insert("hkey", header_value("hkey", hkey)?);
            }
        }
        if config.use_gustation {
            headers.insert("hyphen-gustation", HeaderValue::from_static("Y"));
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NhisError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: 1,
            retry_delay: Duration::from_secs(1),
        })
    }

    /// Overrides the delay between retries.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Returns the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Posts `payload` to `endpoint`, retrying once on transient statuses.
    pub async fn post(&self, endpoint: &str, payload: &Value) -> Result<Value, UpstreamError> {
        let url = format!("{}{endpoint}", self.base_url);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, endpoint, "retrying relay request after transient error");
                tokio::time::sleep(self.retry_delay).await;
            }

            let response = self
                .client
                .post(&url)
                .json(payload)
                .send()
                .await
                .map_err(|e| UpstreamError::transport(endpoint, format!("HTTP request failed: {e}")))?;

            let status = response.status();
            debug!(status = %status, attempt, endpoint, "relay response received");

            let text = response.text().await.map_err(|e| {
                UpstreamError::transport(endpoint, format!("failed to read response body: {e}"))
            })?;

            match decode_response(endpoint, status, &text) {
                Ok(body) => return Ok(body),
                Err(err) if is_transient_error(status) && attempt < self.max_retries => {
                    warn!(status = %status, endpoint, "transient relay error, will retry");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            UpstreamError::transport(endpoint, "relay request failed after retries")
        }))
    }
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 503 | 529)
}

fn common_field(common: Option<&Map<String, Value>>, key: &str) -> Option<String> {
    common?
        .get(key)?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Interprets a relay response. An empty body decodes as `{}`.
fn decode_response(
    endpoint: &str,
    status: reqwest::StatusCode,
    text: &str,
) -> Result<Value, UpstreamError> {
    let http_status = status.as_u16();

    let body: Value = if text.trim().is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_str(text).map_err(|_| UpstreamError {
            message: "relay returned invalid JSON".into(),
            status: Some(http_status),
            endpoint: endpoint.to_string(),
            err_cd: None,
            err_msg: None,
            body: Some(Value::String(text.to_string())),
        })?
    };

    let common = body.get("common").and_then(Value::as_object);
    let relay_error = common_field(common, "errYn").as_deref() == Some("Y");
    if status.is_success() && !relay_error {
        return Ok(body);
    }

    let err_cd = common_field(common, "errCd");
    let err_msg = common_field(common, "errMsg");
    let message = err_msg
        .clone()
        .unwrap_or_else(|| format!("relay endpoint {endpoint} failed"));
    Err(UpstreamError {
        message,
        status: Some(http_status),
        endpoint: endpoint.to_string(),
        err_cd,
        err_msg,
        body: Some(body),
    })
}

#[async_trait]
impl PluginAdapter for HyphenClient {
    fn name(&self) -> &str {
        "hyphen"
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
impl NhisUpstream for HyphenClient {
    async fn call(&self, endpoint: &str, payload: Value) -> Result<Value, UpstreamError> {
        let result = self.post(endpoint, &payload).await;
        if let Err(err) = &result {
            warn!(
                endpoint,
                status = ?err.status,
                err_cd = err.code().unwrap_or(""),
                "relay call failed: {}",
                err.display_message()
            );
        }
        result
    }
}
