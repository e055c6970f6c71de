// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `nhislink status` and `nhislink unlink` commands.
//!
//! Both work on the local store only; the relay is never contacted.

use chrono::Utc;
use serde_json::Value;

use nhislink_config::NhisConfig;
use nhislink_core::{NhisError, NhisStore, PluginAdapter};
use nhislink_fetch::build_status_payload;

use crate::serve::open_store;

/// Status payload of `app_user_id` as served by the gateway.
pub async fn status_json(config: &NhisConfig, app_user_id: &str) -> Result<Value, NhisError> {
    let store = open_store(config).await?;
    let payload = build_status_payload(store.as_ref(), config, app_user_id, Utc::now()).await;
    store.shutdown().await?;
    payload
}

pub async fn run_status(config: &NhisConfig, app_user_id: &str) -> Result<(), NhisError> {
    let payload = status_json(config, app_user_id).await?;
    let rendered = serde_json::to_string_pretty(&payload)
        .map_err(|e| NhisError::Internal(format!("failed to render status: {e}")))?;
    println!("{rendered}");
    Ok(())
}

pub async fn run_unlink(config: &NhisConfig, app_user_id: &str) -> Result<(), NhisError> {
    let store = open_store(config).await?;
    let cleared = store.clear_link(app_user_id).await;
    store.shutdown().await?;
    cleared?;
    println!("nhislink: unlinked {app_user_id}");
    Ok(())
}
