// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Force-refresh cooldown arithmetic.
//!
//! The cooldown gates only forced (cache-bypassing) refreshes. Plain reads are
//! never throttled here.

use chrono::{DateTime, Duration, Utc};
use nhislink_config::model::FetchConfig;
use serde::Serialize;

/// Cooldown snapshot at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownState {
    pub cooldown_seconds: i64,
    pub remaining_seconds: i64,
    /// Always `remaining_seconds <= 0`.
    pub available: bool,
    /// `last_attempt_at + cooldown_seconds` while unavailable.
    pub available_at: Option<DateTime<Utc>>,
}

/// Pure cooldown computation.
///
/// Elapsed time is floored to whole seconds and never negative, so a
/// `last_attempt_at` in the future leaves the full cooldown remaining.
pub fn compute_cooldown_state(
    cooldown_seconds: i64,
    last_attempt_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> CooldownState {
    let cooldown_seconds = cooldown_seconds.max(0);
    let Some(last) = last_attempt_at else {
        return CooldownState {
            cooldown_seconds,
            remaining_seconds: 0,
            available: true,
            available_at: None,
        };
    };

    let elapsed = (now - last).num_seconds().max(0);
    let remaining_seconds = (cooldown_seconds - elapsed).max(0);
    let available = remaining_seconds <= 0;
    CooldownState {
        cooldown_seconds,
        remaining_seconds,
        available,
        available_at: (!available).then(|| last + Duration::seconds(cooldown_seconds)),
    }
}

/// Cooldown for forced refreshes using the configured threshold.
pub fn compute_force_refresh_cooldown(
    config: &FetchConfig,
    last_attempt_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> CooldownState {
    let secs = i64::try_from(config.force_refresh_cooldown_secs).unwrap_or(i64::MAX);
    compute_cooldown_state(secs, last_attempt_at, now)
}

/// The later of two optional instants.
pub fn pick_most_recent(
    a: Option<DateTime<Utc>>,
    b: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn no_previous_attempt_is_available() {
        let state = compute_cooldown_state(120, None, now());
        assert!(state.available);
        assert_eq!(state.remaining_seconds, 0);
        assert_eq!(state.available_at, None);
    }

    #[test]
    fn ninety_second_cooldown_thirty_seconds_in() {
        let last = now() - Duration::seconds(30);
        let state = compute_cooldown_state(90, Some(last), now());
        assert!(!state.available);
        assert_eq!(state.remaining_seconds, 60);
        assert_eq!(state.available_at, Some(last + Duration::seconds(90)));
    }

    #[test]
    fn elapsed_is_floored() {
        let last = now() - Duration::milliseconds(30_900);
        let state = compute_cooldown_state(90, Some(last), now());
        assert_eq!(state.remaining_seconds, 60);
    }

    #[test]
    fn future_attempt_keeps_full_cooldown() {
        let last = now() + Duration::seconds(10);
        let state = compute_cooldown_state(90, Some(last), now());
        assert_eq!(state.remaining_seconds, 90);
        assert!(!state.available);
    }

    #[test]
    fn configured_threshold_is_applied() {
        let config = FetchConfig::default();
        let last = now() - Duration::seconds(20);
        let state = compute_force_refresh_cooldown(&config, Some(last), now());
        assert_eq!(state.cooldown_seconds, 120);
        assert_eq!(state.remaining_seconds, 100);
    }

    #[test]
    fn serializes_camel_case() {
        let state = compute_cooldown_state(10, None, now());
        let json = serde_json::to_value(state).unwrap();
        assert_eq!(json["cooldownSeconds"], 10);
        assert_eq!(json["remainingSeconds"], 0);
        assert_eq!(json["available"], true);
        assert!(json["availableAt"].is_null());
    }

    #[test]
    fn most_recent_of_two() {
        let earlier = now() - Duration::seconds(5);
        assert_eq!(pick_most_recent(Some(earlier), Some(now())), Some(now()));
        assert_eq!(pick_most_recent(None, Some(earlier)), Some(earlier));
        assert_eq!(pick_most_recent(None, None), None);
    }

    proptest! {
        #[test]
        fn availability_tracks_elapsed(cooldown in 0i64..10_000, elapsed in 0i64..20_000) {
            let last = now() - Duration::seconds(elapsed);
            let state = compute_cooldown_state(cooldown, Some(last), now());
            prop_assert_eq!(state.available, state.remaining_seconds <= 0);
            if elapsed >= cooldown {
                prop_assert!(state.available);
                prop_assert_eq!(state.available_at, None);
            } else {
                prop_assert!(!state.available);
                prop_assert_eq!(state.remaining_seconds, cooldown - elapsed);
            }
        }
    }
}
