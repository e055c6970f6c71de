// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Which fetch targets the current cost policy permits.

use nhislink_config::model::FetchConfig;
use nhislink_core::{FetchTarget, TargetCost};

/// Whether high-cost targets are enabled.
pub fn is_high_cost_targets_enabled(config: &FetchConfig) -> bool {
    config.high_cost_targets_enabled
}

/// Targets a caller may request: low-cost only, unless high-cost targets are enabled.
pub fn resolve_allowed_targets(config: &FetchConfig) -> Vec<FetchTarget> {
    let high_cost = is_high_cost_targets_enabled(config);
    FetchTarget::ALL
        .into_iter()
        .filter(|t| high_cost || t.cost() == TargetCost::Low)
        .collect()
}

/// Requested targets outside the allowed set, deduplicated in request order.
pub fn resolve_blocked_targets(config: &FetchConfig, requested: &[FetchTarget]) -> Vec<FetchTarget> {
    let allowed = resolve_allowed_targets(config);
    let mut blocked = Vec::new();
    for target in requested {
        if !allowed.contains(target) && !blocked.contains(target) {
            blocked.push(*target);
        }
    }
    blocked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(high_cost: bool) -> FetchConfig {
        FetchConfig {
            high_cost_targets_enabled: high_cost,
            ..Default::default()
        }
    }

    #[test]
    fn low_cost_only_by_default() {
        let allowed = resolve_allowed_targets(&config(false));
        assert_eq!(
            allowed,
            vec![FetchTarget::Medication, FetchTarget::CheckupOverview]
        );
    }

    #[test]
    fn flag_enables_every_target() {
        assert_eq!(resolve_allowed_targets(&config(true)), FetchTarget::ALL.to_vec());
    }

    #[test]
    fn blocked_targets_keep_request_order_without_duplicates() {
        let requested = [
            FetchTarget::HealthAge,
            FetchTarget::Medication,
            FetchTarget::Medical,
            FetchTarget::HealthAge,
        ];
        assert_eq!(
            resolve_blocked_targets(&config(false), &requested),
            vec![FetchTarget::HealthAge, FetchTarget::Medical]
        );
        assert!(resolve_blocked_targets(&config(true), &requested).is_empty());
    }
}
