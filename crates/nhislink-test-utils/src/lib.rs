// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for NHIS orchestrator integration tests.
//!
//! # Components
//!
//! - [`MockUpstream`] - scripted relay with per-endpoint responses and a call log
//! - [`TestStore`] - SQLite store in a temp directory
//! - [`FailingStore`] - store wrapper whose cache writes can be made to fail

pub mod failing_store;
pub mod mock_upstream;
pub mod store;

pub use failing_store::FailingStore;
pub use mock_upstream::{MockUpstream, RecordedCall, relay_error, relay_ok};
pub use store::TestStore;
