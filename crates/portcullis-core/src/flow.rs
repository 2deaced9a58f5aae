//! Login orchestration over the throttle gate
//!
//! The identity provider and the human-verification service are external
//! collaborators behind traits, so hosts wire in their real backends and
//! tests wire in fakes. [`LoginFlow`] owns the ordering contract: the
//! throttle gate runs before any external call, precondition failures are
//! classified and counted client-side, and every path - including
//! social-provider logins reported through [`attempt_external`] - shares
//! the same counters.
//!
//! [`attempt_external`]: LoginFlow::attempt_external

use chrono::NaiveDateTime;

use crate::error::LoginError;
use crate::guard::{AttemptOutcome, BlockReason, Decision, LoginThrottle};
use crate::store::StateStore;

/// Classified failure from the identity provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyFailure {
    /// The password/credential was rejected
    InvalidCredential,
    /// The account exists but its email is not verified
    UnverifiedAccount,
    /// Provider or network error unrelated to the credential
    Service(String),
}

/// Email + password identity verification (external collaborator)
pub trait IdentityVerifier {
    fn verify(&self, email: &str, password: &str) -> Result<(), VerifyFailure>;
}

/// Human-verification challenge check (external collaborator)
pub trait HumanVerifier {
    /// Whether the given challenge token passes verification
    fn check(&self, token: &str) -> bool;
}

/// A login form submission
#[derive(Clone, Copy, Debug)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    /// Token from the completed human-verification challenge, if any
    pub human_token: Option<&'a str>,
}

/// Login attempt orchestration: gate, verify, record
pub struct LoginFlow<S: StateStore, I: IdentityVerifier, H: HumanVerifier> {
    throttle: LoginThrottle<S>,
    identity: I,
    human: H,
}

impl<S: StateStore, I: IdentityVerifier, H: HumanVerifier> LoginFlow<S, I, H> {
    pub fn new(throttle: LoginThrottle<S>, identity: I, human: H) -> Self {
        Self {
            throttle,
            identity,
            human,
        }
    }

    /// Run a full login attempt for a form submission.
    ///
    /// The throttle is consulted before anything else; a blocked state
    /// pre-empts the attempt without touching the collaborators or the
    /// counters. Precondition failures are reported to the user immediately
    /// but still consume quota under the default policy.
    pub fn attempt(&mut self, req: &LoginRequest, now: NaiveDateTime) -> Result<(), LoginError> {
        self.gate(now)?;

        if let Err(e) = self.check_preconditions(req) {
            self.throttle
                .record_outcome(AttemptOutcome::PreconditionFailure, now);
            return Err(e);
        }

        let result = self.identity.verify(req.email, req.password);
        self.record_verify_result(result, now)
    }

    /// Record a login attempt whose verification ran elsewhere (for example
    /// a social-provider popup). Shares the gate and the counters with the
    /// password path, so no provider bypasses the throttle.
    pub fn attempt_external(
        &mut self,
        result: Result<(), VerifyFailure>,
        now: NaiveDateTime,
    ) -> Result<(), LoginError> {
        self.gate(now)?;
        self.record_verify_result(result, now)
    }

    /// Access the underlying throttle, for countdown displays and status
    pub fn throttle(&mut self) -> &mut LoginThrottle<S> {
        &mut self.throttle
    }

    fn gate(&mut self, now: NaiveDateTime) -> Result<(), LoginError> {
        match self.throttle.check_allowed(now) {
            Decision::Allowed => Ok(()),
            Decision::Blocked {
                reason: BlockReason::TemporaryCooldown,
                retry_after_secs,
            } => Err(LoginError::TemporaryCooldown { retry_after_secs }),
            Decision::Blocked {
                reason: BlockReason::DailyLimit,
                retry_after_secs,
            } => Err(LoginError::DailyLimit { retry_after_secs }),
        }
    }

    fn check_preconditions(&self, req: &LoginRequest) -> Result<(), LoginError> {
        if req.email.trim().is_empty() {
            return Err(LoginError::MissingEmail);
        }
        if req.password.is_empty() {
            return Err(LoginError::MissingPassword);
        }
        if !is_valid_email(req.email) {
            return Err(LoginError::InvalidEmailFormat);
        }
        let token = req.human_token.ok_or(LoginError::MissingHumanToken)?;
        if !self.human.check(token) {
            return Err(LoginError::HumanCheckFailed);
        }
        Ok(())
    }

    fn record_verify_result(
        &mut self,
        result: Result<(), VerifyFailure>,
        now: NaiveDateTime,
    ) -> Result<(), LoginError> {
        match result {
            Ok(()) => {
                self.throttle.record_outcome(AttemptOutcome::Success, now);
                Ok(())
            }
            Err(VerifyFailure::InvalidCredential) => {
                self.throttle
                    .record_outcome(AttemptOutcome::InvalidCredential, now);
                Err(LoginError::InvalidCredential {
                    attempts_remaining: self.throttle.attempts_remaining(now),
                })
            }
            Err(VerifyFailure::UnverifiedAccount) => {
                // Counts against the general quota only: the password was
                // not judged wrong
                self.throttle
                    .record_outcome(AttemptOutcome::OtherFailure, now);
                Err(LoginError::UnverifiedAccount)
            }
            Err(VerifyFailure::Service(msg)) => {
                self.throttle
                    .record_outcome(AttemptOutcome::OtherFailure, now);
                Err(LoginError::Service(msg))
            }
        }
    }
}

/// Minimal structural email check: one `@` with a dotted domain after it
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((name, tld)) => !name.is_empty() && !tld.is_empty(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ThrottlePolicy;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use std::cell::Cell;
    use std::rc::Rc;

    fn at(h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    /// Verifier accepting exactly one password, counting its invocations
    struct FakeVerifier {
        password: &'static str,
        calls: Rc<Cell<u32>>,
    }

    impl IdentityVerifier for FakeVerifier {
        fn verify(&self, _email: &str, password: &str) -> Result<(), VerifyFailure> {
            self.calls.set(self.calls.get() + 1);
            if password == self.password {
                Ok(())
            } else {
                Err(VerifyFailure::InvalidCredential)
            }
        }
    }

    /// Human check accepting any token except "expired"
    struct FakeHuman;

    impl HumanVerifier for FakeHuman {
        fn check(&self, token: &str) -> bool {
            token != "expired"
        }
    }

    fn flow(
        policy: ThrottlePolicy,
    ) -> (
        LoginFlow<MemoryStore, FakeVerifier, FakeHuman>,
        Rc<Cell<u32>>,
    ) {
        let calls = Rc::new(Cell::new(0));
        let throttle = LoginThrottle::new(policy, MemoryStore::new(), at(9, 0, 0));
        let verifier = FakeVerifier {
            password: "hunter2",
            calls: calls.clone(),
        };
        (LoginFlow::new(throttle, verifier, FakeHuman), calls)
    }

    fn req<'a>(email: &'a str, password: &'a str, token: Option<&'a str>) -> LoginRequest<'a> {
        LoginRequest {
            email,
            password,
            human_token: token,
        }
    }

    #[test]
    fn test_successful_login() {
        let (mut flow, calls) = flow(ThrottlePolicy::default());
        let r = flow.attempt(&req("ana@example.com", "hunter2", Some("tok")), at(9, 0, 0));
        assert!(r.is_ok());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_wrong_password_reports_remaining_attempts() {
        let (mut flow, _) = flow(ThrottlePolicy::default());
        let r = flow.attempt(&req("ana@example.com", "nope", Some("tok")), at(9, 0, 0));
        match r {
            Err(LoginError::InvalidCredential { attempts_remaining }) => {
                assert_eq!(attempts_remaining, 4)
            }
            other => panic!("expected invalid credential, got {other:?}"),
        }
    }

    #[test]
    fn test_preconditions_consume_quota_without_calling_verifier() {
        let (mut flow, calls) = flow(ThrottlePolicy::default());
        let now = at(9, 0, 0);

        assert!(matches!(
            flow.attempt(&req("", "pw", Some("tok")), now),
            Err(LoginError::MissingEmail)
        ));
        assert!(matches!(
            flow.attempt(&req("ana@example.com", "", Some("tok")), now),
            Err(LoginError::MissingPassword)
        ));
        assert!(matches!(
            flow.attempt(&req("not-an-email", "pw", Some("tok")), now),
            Err(LoginError::InvalidEmailFormat)
        ));
        assert!(matches!(
            flow.attempt(&req("ana@example.com", "pw", None), now),
            Err(LoginError::MissingHumanToken)
        ));
        assert!(matches!(
            flow.attempt(&req("ana@example.com", "pw", Some("expired")), now),
            Err(LoginError::HumanCheckFailed)
        ));

        assert_eq!(calls.get(), 0);
        assert_eq!(flow.throttle().state().daily_attempts, 5);
        // Five precondition failures exhausted the default daily quota
        assert!(matches!(
            flow.attempt(&req("ana@example.com", "hunter2", Some("tok")), now),
            Err(LoginError::DailyLimit { .. })
        ));
    }

    #[test]
    fn test_blocked_state_short_circuits_before_verifier() {
        let (mut flow, calls) = flow(ThrottlePolicy {
            daily_attempt_limit: 100,
            max_daily_failed_password: 100,
            ..Default::default()
        });
        let now = at(9, 0, 0);

        for _ in 0..5 {
            let _ = flow.attempt(&req("ana@example.com", "nope", Some("tok")), now);
        }
        assert_eq!(calls.get(), 5);

        let r = flow.attempt(&req("ana@example.com", "hunter2", Some("tok")), now);
        assert!(matches!(r, Err(LoginError::TemporaryCooldown { .. })));
        assert_eq!(calls.get(), 5); // verifier never reached
    }

    #[test]
    fn test_external_provider_shares_counters() {
        let (mut flow, _) = flow(ThrottlePolicy::default());
        let now = at(9, 0, 0);

        for _ in 0..5 {
            let _ = flow.attempt_external(
                Err(VerifyFailure::Service("popup closed".into())),
                now,
            );
        }

        // The password path is now blocked by quota the social path spent
        assert!(matches!(
            flow.attempt(&req("ana@example.com", "hunter2", Some("tok")), now),
            Err(LoginError::DailyLimit { .. })
        ));
    }

    #[test]
    fn test_unverified_account_spares_failed_password_quota() {
        struct Unverified;
        impl IdentityVerifier for Unverified {
            fn verify(&self, _: &str, _: &str) -> Result<(), VerifyFailure> {
                Err(VerifyFailure::UnverifiedAccount)
            }
        }

        let throttle = LoginThrottle::new(
            ThrottlePolicy::default(),
            MemoryStore::new(),
            at(9, 0, 0),
        );
        let mut flow = LoginFlow::new(throttle, Unverified, FakeHuman);

        let r = flow.attempt(&req("ana@example.com", "pw", Some("tok")), at(9, 0, 0));
        assert!(matches!(r, Err(LoginError::UnverifiedAccount)));
        assert_eq!(flow.throttle().state().daily_attempts, 1);
        assert_eq!(flow.throttle().state().daily_failed_password_attempts, 0);
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("ana@example.com"));
        assert!(is_valid_email("a.b+c@mail.example.co"));

        assert!(!is_valid_email("ana"));
        assert!(!is_valid_email("ana@"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("ana@example"));
        assert!(!is_valid_email("ana@.com"));
        assert!(!is_valid_email("ana@example."));
        assert!(!is_valid_email("ana@ex@ample.com"));
    }
}
