// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for the NHIS fetch orchestrator.
//!
//! Exposes the operations of
//! [`NhisFetchService`](nhislink_fetch::NhisFetchService) as JSON routes,
//! from the easy-auth `init`/`sign` steps through fetch and unlink.

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::{APP_USER_ID_HEADER, AppUserId, AuthConfig};
pub use server::{GatewayState, ServerConfig, build_router, start_server};
