//! Login attempt gate
//!
//! [`LoginThrottle`] wraps a login attempt: callers ask [`check_allowed`]
//! before contacting the identity provider and report the classified result
//! through [`record_outcome`]. Every outcome is persisted through the
//! injected [`StateStore`] before the call returns; a persistence failure is
//! logged and otherwise ignored, since the in-memory counters still govern
//! the current session and the real enforcement boundary is server-side.
//!
//! [`check_allowed`]: LoginThrottle::check_allowed
//! [`record_outcome`]: LoginThrottle::record_outcome

use chrono::NaiveDateTime;
use tracing::warn;

use crate::policy::ThrottlePolicy;
use crate::state::{seconds_until_midnight, ThrottleState};
use crate::store::StateStore;

/// Why an attempt was pre-empted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockReason {
    /// A temporary cooldown from a burst of failures is still running
    TemporaryCooldown,
    /// A daily quota (total or failed-password) is exhausted until midnight
    DailyLimit,
}

/// Gate decision for a prospective login attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// The attempt may proceed to the identity provider
    Allowed,
    /// The attempt is pre-empted; retry after the given number of seconds
    Blocked {
        reason: BlockReason,
        retry_after_secs: u64,
    },
}

/// Classified result of a completed login attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Identity provider accepted the credentials
    Success,
    /// Identity provider rejected the password/credential
    InvalidCredential,
    /// Provider or network failure unrelated to the credential
    OtherFailure,
    /// Client-detectable failure before the provider was reached
    /// (missing fields, malformed email, missing or failed human check)
    PreconditionFailure,
}

/// Stateful guard around login attempts.
///
/// Single-threaded by design: the host calls it from one submission handler
/// at a time, and a countdown display polls the derived reads only.
pub struct LoginThrottle<S: StateStore> {
    policy: ThrottlePolicy,
    store: S,
    state: ThrottleState,
}

impl<S: StateStore> LoginThrottle<S> {
    /// Create a guard over the given store, loading persisted counters.
    ///
    /// Unreadable or corrupt stored state degrades to a fresh state: the
    /// throttle is advisory and must never lock a user out of the form
    /// because of a bad file.
    pub fn new(policy: ThrottlePolicy, store: S, now: NaiveDateTime) -> Self {
        let state = match store.load() {
            Ok(Some(state)) => state,
            Ok(None) => ThrottleState::new(now.date()),
            Err(e) => {
                warn!("failed to load throttle state, starting fresh: {e}");
                ThrottleState::new(now.date())
            }
        };
        Self {
            policy,
            store,
            state,
        }
    }

    /// Decide whether an attempt may proceed right now.
    ///
    /// Reconciles first, so an expired cooldown or a crossed midnight is
    /// picked up lazily here. Daily quotas take precedence over a running
    /// temporary cooldown.
    pub fn check_allowed(&mut self, now: NaiveDateTime) -> Decision {
        self.state.reconcile(&self.policy, now);

        if self.state.daily_limit_reached(&self.policy) {
            return Decision::Blocked {
                reason: BlockReason::DailyLimit,
                retry_after_secs: seconds_until_midnight(now),
            };
        }

        if let Some(retry_after_secs) = self.state.cooldown_remaining_secs(&self.policy, now) {
            return Decision::Blocked {
                reason: BlockReason::TemporaryCooldown,
                retry_after_secs,
            };
        }

        Decision::Allowed
    }

    /// Record the outcome of a completed (or pre-empted-client-side) attempt
    /// and persist the updated counters.
    pub fn record_outcome(&mut self, outcome: AttemptOutcome, now: NaiveDateTime) {
        self.state.reconcile(&self.policy, now);

        match outcome {
            AttemptOutcome::Success => {
                self.state.attempt_count = 0;
                self.state.block_started_at = None;
                if self.policy.reset_escalation_on_success {
                    self.state.block_escalation_level = 0;
                }
                // Daily counters are deliberately untouched: a successful
                // login does not refund daily quota.
            }
            AttemptOutcome::PreconditionFailure if !self.policy.count_precondition_failures => {
                // Policy opted out of charging quota for client-side input
                // mistakes; nothing to count.
            }
            failure => self.record_failure(failure, now),
        }

        self.persist();
    }

    fn record_failure(&mut self, outcome: AttemptOutcome, now: NaiveDateTime) {
        self.state.daily_attempts = self.state.daily_attempts.saturating_add(1);
        if outcome == AttemptOutcome::InvalidCredential {
            self.state.daily_failed_password_attempts =
                self.state.daily_failed_password_attempts.saturating_add(1);
        }

        self.state.attempt_count = self.state.attempt_count.saturating_add(1);
        if self.state.attempt_count >= self.policy.max_burst_attempts {
            self.state.attempt_count = 0;
            self.state.block_started_at = Some(now);
            self.state.block_escalation_level = (self.state.block_escalation_level + 1)
                .min(self.policy.cooldown_secs.len() as u32);
            warn!(
                level = self.state.block_escalation_level,
                cooldown_secs = self
                    .policy
                    .cooldown_duration(self.state.block_escalation_level - 1)
                    .as_secs(),
                "temporary login cooldown triggered"
            );
        }
    }

    /// Seconds left on the active cooldown, for a countdown display.
    ///
    /// Pure derivation from the block start, never a separate ticking
    /// counter, so repeated polling cannot drift.
    pub fn remaining_cooldown_secs(&mut self, now: NaiveDateTime) -> Option<u64> {
        self.state.reconcile(&self.policy, now);
        self.state.cooldown_remaining_secs(&self.policy, now)
    }

    /// Attempts left before the next temporary cooldown would trigger
    pub fn attempts_remaining(&mut self, now: NaiveDateTime) -> u32 {
        self.state.reconcile(&self.policy, now);
        self.policy
            .max_burst_attempts
            .saturating_sub(self.state.attempt_count)
    }

    /// Attempts left in today's quota (the tighter of the two daily limits)
    pub fn daily_attempts_remaining(&mut self, now: NaiveDateTime) -> u32 {
        self.state.reconcile(&self.policy, now);
        let general = self
            .policy
            .daily_attempt_limit
            .saturating_sub(self.state.daily_attempts);
        let failed = self
            .policy
            .max_daily_failed_password
            .saturating_sub(self.state.daily_failed_password_attempts);
        general.min(failed)
    }

    /// Discard all counters, in memory and in the store
    pub fn reset(&mut self, now: NaiveDateTime) -> crate::error::Result<()> {
        self.state = ThrottleState::new(now.date());
        self.store.clear()
    }

    /// Current counters (reconcile first for a wall-clock-accurate view)
    pub fn state(&self) -> &ThrottleState {
        &self.state
    }

    /// The policy this guard enforces
    pub fn policy(&self) -> &ThrottlePolicy {
        &self.policy
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.save(&self.state) {
            warn!("failed to persist throttle state: {e}");
        }
    }
}
