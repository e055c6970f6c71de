// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resilience primitives for the NHIS fetch orchestrator.
//!
//! Currently a single component: the [`InFlightRegistry`], which collapses
//! concurrent identical requests into one upstream execution.

pub mod inflight;

pub use inflight::{InFlightError, InFlightRegistry};
