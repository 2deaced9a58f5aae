//! Persisted throttle counters
//!
//! One `ThrottleState` exists per browser-profile-equivalent (per state
//! file). Every operation takes the current local wall-clock time as an
//! explicit parameter, so the logic stays pure and deterministic under test.
//! Wall-clock reconciliation is lazy: an expired block or a day rollover is
//! discovered on the next call, never by a background timer.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::policy::ThrottlePolicy;

/// Storage format version
pub const STATE_VERSION: u32 = 1;

/// Mutable throttle counters, reconciled against the local calendar day
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleState {
    /// Attempts since the last temporary block was entered or cleared
    pub attempt_count: u32,

    /// When the current temporary block began (local wall clock)
    pub block_started_at: Option<NaiveDateTime>,

    /// Number of temporary blocks triggered today, capped at the cooldown
    /// table length. The active block's duration is `cooldown_secs[level - 1]`.
    /// Reset only by day rollover (or success under a lenient policy).
    pub block_escalation_level: u32,

    /// Total attempts since local midnight
    pub daily_attempts: u32,

    /// Subset of daily attempts that failed the credential check
    pub daily_failed_password_attempts: u32,

    /// The local calendar date the daily counters apply to
    pub last_attempt_date: NaiveDate,

    /// Version for future migrations
    pub version: u32,
}

impl ThrottleState {
    /// Create a fresh state for the given local date
    pub fn new(today: NaiveDate) -> Self {
        Self {
            attempt_count: 0,
            block_started_at: None,
            block_escalation_level: 0,
            daily_attempts: 0,
            daily_failed_password_attempts: 0,
            last_attempt_date: today,
            version: STATE_VERSION,
        }
    }

    /// Reconcile the counters against the current wall clock.
    ///
    /// Crossing local midnight zeroes every mutable counter and re-dates the
    /// state. An elapsed temporary block clears the burst counter and the
    /// block start, but the escalation level survives until the next day.
    pub fn reconcile(&mut self, policy: &ThrottlePolicy, now: NaiveDateTime) {
        let today = now.date();
        if today != self.last_attempt_date {
            tracing::debug!(
                from = %self.last_attempt_date,
                to = %today,
                "day rollover, resetting throttle counters"
            );
            self.attempt_count = 0;
            self.block_started_at = None;
            self.block_escalation_level = 0;
            self.daily_attempts = 0;
            self.daily_failed_password_attempts = 0;
            self.last_attempt_date = today;
        }

        if let Some(started) = self.block_started_at {
            let elapsed = (now - started).num_seconds();
            let cooldown = self.active_cooldown(policy);
            if elapsed >= cooldown.as_secs() as i64 {
                self.attempt_count = 0;
                self.block_started_at = None;
            }
        }
    }

    /// Duration of the block at the current escalation level. Level `n`
    /// means the n-th block of the day, served by table entry `n - 1`.
    fn active_cooldown(&self, policy: &ThrottlePolicy) -> std::time::Duration {
        policy.cooldown_duration(self.block_escalation_level.saturating_sub(1))
    }

    /// Seconds left on the active temporary block, if one is running.
    ///
    /// Callers must reconcile first; an un-reconciled state may report a
    /// block that has already expired.
    pub fn cooldown_remaining_secs(&self, policy: &ThrottlePolicy, now: NaiveDateTime) -> Option<u64> {
        let started = self.block_started_at?;
        let cooldown = self.active_cooldown(policy);
        let remaining = cooldown.as_secs() as i64 - (now - started).num_seconds();
        Some(remaining.max(0) as u64)
    }

    /// Whether either daily quota is exhausted
    pub fn daily_limit_reached(&self, policy: &ThrottlePolicy) -> bool {
        self.daily_attempts >= policy.daily_attempt_limit
            || self.daily_failed_password_attempts >= policy.max_daily_failed_password
    }
}

/// Seconds from `now` until the next local midnight
pub fn seconds_until_midnight(now: NaiveDateTime) -> u64 {
    let next_midnight = now
        .date()
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(now); // calendar overflow, far beyond any representable session
    (next_midnight - now).num_seconds().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        date(y, m, d).and_hms_opt(h, min, s).unwrap()
    }

    #[test]
    fn test_day_rollover_zeroes_all_counters() {
        let policy = ThrottlePolicy::default();
        let mut state = ThrottleState::new(date(2024, 3, 1));
        state.attempt_count = 3;
        state.block_started_at = Some(at(2024, 3, 1, 23, 50, 0));
        state.block_escalation_level = 2;
        state.daily_attempts = 5;
        state.daily_failed_password_attempts = 4;

        state.reconcile(&policy, at(2024, 3, 2, 0, 0, 1));

        assert_eq!(state.attempt_count, 0);
        assert_eq!(state.block_started_at, None);
        assert_eq!(state.block_escalation_level, 0);
        assert_eq!(state.daily_attempts, 0);
        assert_eq!(state.daily_failed_password_attempts, 0);
        assert_eq!(state.last_attempt_date, date(2024, 3, 2));
    }

    #[test]
    fn test_expired_block_clears_but_keeps_escalation_level() {
        let policy = ThrottlePolicy::default();
        let mut state = ThrottleState::new(date(2024, 3, 1));
        state.block_started_at = Some(at(2024, 3, 1, 10, 0, 0));
        state.block_escalation_level = 2;
        state.attempt_count = 2;

        // Second block of the day runs for 300 seconds
        state.reconcile(&policy, at(2024, 3, 1, 10, 5, 0));

        assert_eq!(state.block_started_at, None);
        assert_eq!(state.attempt_count, 0);
        assert_eq!(state.block_escalation_level, 2);
    }

    #[test]
    fn test_running_block_is_untouched() {
        let policy = ThrottlePolicy::default();
        let mut state = ThrottleState::new(date(2024, 3, 1));
        state.block_started_at = Some(at(2024, 3, 1, 10, 0, 0));
        state.block_escalation_level = 1;

        state.reconcile(&policy, at(2024, 3, 1, 10, 0, 30));

        assert_eq!(state.block_started_at, Some(at(2024, 3, 1, 10, 0, 0)));
        assert_eq!(
            state.cooldown_remaining_secs(&policy, at(2024, 3, 1, 10, 0, 30)),
            Some(30)
        );
    }

    #[test]
    fn test_seconds_until_midnight() {
        assert_eq!(seconds_until_midnight(at(2024, 3, 1, 23, 59, 0)), 60);
        assert_eq!(seconds_until_midnight(at(2024, 3, 1, 0, 0, 0)), 86400);
    }

    #[test]
    fn test_daily_limit_reached_on_either_quota() {
        let policy = ThrottlePolicy::default();
        let mut state = ThrottleState::new(date(2024, 3, 1));
        assert!(!state.daily_limit_reached(&policy));

        state.daily_attempts = 5;
        assert!(state.daily_limit_reached(&policy));

        state.daily_attempts = 2;
        state.daily_failed_password_attempts = 5;
        assert!(state.daily_limit_reached(&policy));
    }

    #[test]
    fn test_state_round_trips_through_json() {
        let mut state = ThrottleState::new(date(2024, 3, 1));
        state.attempt_count = 2;
        state.block_started_at = Some(at(2024, 3, 1, 9, 30, 0));

        let json = serde_json::to_string(&state).unwrap();
        let loaded: ThrottleState = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, state);
    }
}
