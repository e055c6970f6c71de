// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the NHIS fetch orchestrator.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

/// Error code attached to fetches that failed because the upstream login session is gone.
pub const SESSION_EXPIRED_ERR_CODE: &str = "NHIS_LOGIN_SESSION_EXPIRED";

/// The primary error type used across the orchestrator's traits and core operations.
#[derive(Debug, Error)]
pub enum NhisError {
    /// Configuration errors (invalid TOML, missing credentials, bad endpoint paths).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A call to the upstream NHIS relay failed.
    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// A requested record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),

    /// An error observed by several callers of one deduplicated execution.
    #[error(transparent)]
    Shared(#[from] Arc<NhisError>),
}

impl NhisError {
    /// Wraps any error as a storage failure.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        NhisError::Storage {
            source: Box::new(err),
        }
    }
}

/// Failure reported by the upstream relay for a single endpoint call.
///
/// Carries the relay's own `errCd`/`errMsg` pair when the response had one,
/// and the decoded body so callers can surface it as raw failure data.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct UpstreamError {
    /// Human-readable summary.
    pub message: String,
    /// HTTP status, when a response was received.
    pub status: Option<u16>,
    /// Endpoint path that was called.
    pub endpoint: String,
    /// Relay error code (`common.errCd`).
    pub err_cd: Option<String>,
    /// Relay error message (`common.errMsg`).
    pub err_msg: Option<String>,
    /// Decoded response body, when one was readable.
    pub body: Option<Value>,
}

impl UpstreamError {
    /// A failure before any usable response arrived (connect, timeout, decode).
    pub fn transport(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            endpoint: endpoint.into(),
            err_cd: None,
            err_msg: None,
            body: None,
        }
    }

    /// The relay's error code, if any.
    pub fn code(&self) -> Option<&str> {
        self.err_cd.as_deref().filter(|c| !c.trim().is_empty())
    }

    /// The relay's error message, falling back to the summary message.
    pub fn display_message(&self) -> &str {
        self.err_msg
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&self.message)
    }

    fn merged_lowercase(&self) -> String {
        format!("{} {}", self.code().unwrap_or(""), self.display_message()).to_lowercase()
    }

    /// True when the relay signalled an empty result rather than a real failure.
    pub fn has_no_data_signal(&self) -> bool {
        let merged = self.merged_lowercase();
        ["no data", "조회 결과", "조회결과", "내역이 없습니다", "데이터가 없습니다"]
            .iter()
            .any(|needle| merged.contains(needle))
    }

    /// True when the relay rejected the stored login session.
    pub fn is_session_expired(&self) -> bool {
        if self.code() == Some(SESSION_EXPIRED_ERR_CODE) {
            return true;
        }
        let merged = self.merged_lowercase();
        merged.contains("session expired")
            || merged.contains("세션이 만료")
            || (merged.contains("세션") && merged.contains("만료"))
    }
}
