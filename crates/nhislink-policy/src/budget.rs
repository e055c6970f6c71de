// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rolling-window fetch budget.
//!
//! Only uncached attempts count. Fresh and forced fetches have separate
//! allowances; an exhausted fresh allowance blocks forced refreshes too.

use chrono::{DateTime, Duration, Utc};
use nhislink_config::model::BudgetConfig;
use nhislink_core::FetchAttempt;
use serde::Serialize;

/// Fallback wait when no counted attempt remains in the window.
const DEFAULT_RETRY_AFTER_SECS: i64 = 60;

/// Which allowance blocked a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BudgetReason {
    Fresh,
    ForceRefresh,
}

/// Usage of a single allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BudgetUsage {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
}

impl BudgetUsage {
    fn new(used: u32, limit: u32) -> Self {
        Self {
            used,
            limit,
            remaining: limit.saturating_sub(used),
        }
    }
}

/// Budget usage reported on the status payload and on blocked fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSnapshot {
    pub window_hours: u32,
    pub fresh: BudgetUsage,
    pub force_refresh: BudgetUsage,
}

/// Result of a budget check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetDecision {
    Available {
        snapshot: BudgetSnapshot,
    },
    Blocked {
        reason: BudgetReason,
        retry_after_secs: i64,
        snapshot: BudgetSnapshot,
    },
}

impl BudgetDecision {
    pub fn snapshot(&self) -> &BudgetSnapshot {
        match self {
            BudgetDecision::Available { snapshot } | BudgetDecision::Blocked { snapshot, .. } => {
                snapshot
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, BudgetDecision::Available { .. })
    }
}

/// Start of the rolling window ending at `now`.
pub fn budget_window_start(config: &BudgetConfig, now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::hours(i64::from(config.window_hours.max(1)))
}

fn counted<'a>(
    attempts: &'a [FetchAttempt],
    window_start: DateTime<Utc>,
    force_refresh: bool,
) -> impl Iterator<Item = &'a FetchAttempt> {
    attempts.iter().filter(move |a| {
        !a.cached && a.force_refresh == force_refresh && a.created_at >= window_start
    })
}

/// Usage snapshot without making a decision.
pub fn budget_snapshot(
    config: &BudgetConfig,
    attempts: &[FetchAttempt],
    now: DateTime<Utc>,
) -> BudgetSnapshot {
    let window_start = budget_window_start(config, now);
    let fresh_used = counted(attempts, window_start, false).count();
    let force_used = counted(attempts, window_start, true).count();
    BudgetSnapshot {
        window_hours: config.window_hours.max(1),
        fresh: BudgetUsage::new(
            u32::try_from(fresh_used).unwrap_or(u32::MAX),
            config.max_fresh_fetches.max(1),
        ),
        force_refresh: BudgetUsage::new(
            u32::try_from(force_used).unwrap_or(u32::MAX),
            config.max_force_refreshes.max(1),
        ),
    }
}

/// Decide whether another uncached fetch may run.
///
/// `attempts` may include rows outside the window or cached rows; both are
/// ignored.
pub fn evaluate_fetch_budget(
    config: &BudgetConfig,
    attempts: &[FetchAttempt],
    force_refresh: bool,
    now: DateTime<Utc>,
) -> BudgetDecision {
    let snapshot = budget_snapshot(config, attempts, now);

    let reason = if snapshot.fresh.used >= snapshot.fresh.limit {
        BudgetReason::Fresh
    } else if force_refresh && snapshot.force_refresh.used >= snapshot.force_refresh.limit {
        BudgetReason::ForceRefresh
    } else {
        return BudgetDecision::Available { snapshot };
    };

    let window_start = budget_window_start(config, now);
    let earliest = counted(attempts, window_start, reason == BudgetReason::ForceRefresh)
        .map(|a| a.created_at)
        .min();
    let retry_after_secs = match earliest {
        Some(at) => {
            let reopens = at + Duration::hours(i64::from(snapshot.window_hours));
            let millis = (reopens - now).num_milliseconds();
            // ceil to whole seconds, at least one
            ((millis + 999) / 1000).max(1)
        }
        None => DEFAULT_RETRY_AFTER_SECS,
    };
    tracing::debug!(
        ?reason,
        retry_after_secs,
        fresh_used = snapshot.fresh.used,
        force_used = snapshot.force_refresh.used,
        "fetch budget exhausted"
    );

    BudgetDecision::Blocked {
        reason,
        retry_after_secs,
        snapshot,
    }
}
