//! Throttle policy for brute-force mitigation
//!
//! The cooldown durations escalate each time a burst of failures trips a
//! temporary block within the same day:
//!
//! - 5 failures: 60 second cooldown
//! - next 5 failures: 5 minute cooldown
//! - every burst after that: 10 minute cooldown
//!
//! Independently of the bursts, a rolling daily quota caps total attempts
//! and failed-password attempts per calendar day.

use std::time::Duration;

/// Escalating throttle policy
#[derive(Clone, Debug)]
pub struct ThrottlePolicy {
    /// Attempts allowed before a temporary cooldown triggers
    pub max_burst_attempts: u32,
    /// Total attempts allowed per calendar day
    pub daily_attempt_limit: u32,
    /// Failed-password attempts allowed per calendar day
    pub max_daily_failed_password: u32,
    /// Cooldown durations per escalation level (in seconds)
    pub cooldown_secs: Vec<u64>,
    /// Whether a successful login also resets the escalation level.
    /// The observed portal behavior keeps the level until the next day.
    pub reset_escalation_on_success: bool,
    /// Whether precondition failures (missing fields, bad email format,
    /// missing or failed human-verification token) consume attempt quota.
    pub count_precondition_failures: bool,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            max_burst_attempts: 5,
            daily_attempt_limit: 5,
            max_daily_failed_password: 5,
            cooldown_secs: vec![
                60,  // first block: 1 minute
                300, // second block: 5 minutes
                600, // third and later blocks: 10 minutes
            ],
            reset_escalation_on_success: false,
            count_precondition_failures: true,
        }
    }
}

impl ThrottlePolicy {
    /// Create a strict policy (fewer attempts, longer cooldowns)
    pub fn strict() -> Self {
        Self {
            max_burst_attempts: 3,
            daily_attempt_limit: 5,
            max_daily_failed_password: 3,
            cooldown_secs: vec![
                300,  // first block: 5 minutes
                1800, // second block: 30 minutes
                3600, // third and later blocks: 1 hour
            ],
            ..Default::default()
        }
    }

    /// Create a lenient policy (more attempts, forgiving resets)
    pub fn lenient() -> Self {
        Self {
            max_burst_attempts: 8,
            daily_attempt_limit: 20,
            max_daily_failed_password: 10,
            cooldown_secs: vec![
                30,  // first block: 30 seconds
                60,  // second block: 1 minute
                300, // third and later blocks: 5 minutes
            ],
            reset_escalation_on_success: true,
            count_precondition_failures: false,
        }
    }

    /// Get the cooldown duration for the given escalation level,
    /// clamped to the last table entry for all higher levels
    pub fn cooldown_duration(&self, level: u32) -> Duration {
        let index = (level as usize).min(self.cooldown_secs.len() - 1);
        Duration::from_secs(self.cooldown_secs[index])
    }

    /// Highest escalation level the cooldown table distinguishes
    pub fn max_escalation_level(&self) -> u32 {
        (self.cooldown_secs.len() - 1) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cooldown_table() {
        let policy = ThrottlePolicy::default();

        assert_eq!(policy.cooldown_duration(0).as_secs(), 60);
        assert_eq!(policy.cooldown_duration(1).as_secs(), 300);
        assert_eq!(policy.cooldown_duration(2).as_secs(), 600);
    }

    #[test]
    fn test_cooldown_clamps_at_table_end() {
        let policy = ThrottlePolicy::default();

        // Even at level 100, should clamp to the last entry
        assert_eq!(policy.cooldown_duration(100).as_secs(), 600);
    }

    #[test]
    fn test_max_escalation_level() {
        let policy = ThrottlePolicy::default();
        assert_eq!(policy.max_escalation_level(), 2);
    }

    #[test]
    fn test_default_flags_preserve_observed_behavior() {
        let policy = ThrottlePolicy::default();
        assert!(!policy.reset_escalation_on_success);
        assert!(policy.count_precondition_failures);
    }

    #[test]
    fn test_strict_is_tighter_than_default() {
        let strict = ThrottlePolicy::strict();
        let default = ThrottlePolicy::default();

        assert!(strict.max_burst_attempts < default.max_burst_attempts);
        assert!(strict.cooldown_duration(0) > default.cooldown_duration(0));
    }
}
