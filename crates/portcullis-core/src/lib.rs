//! Portcullis Core - Client-side login throttling
//!
//! This crate implements the advisory brute-force mitigation used in front
//! of a login form:
//! - Burst detection with escalating temporary cooldowns
//! - Rolling daily quotas for total and failed-password attempts
//! - Lazy reconciliation against local calendar-day boundaries
//! - Pluggable persistence and collaborator seams for testing
//!
//! It is advisory by design: the throttle improves UX and cuts provider
//! load, while the authoritative enforcement boundary stays server-side.

pub mod error;
pub mod flow;
pub mod guard;
pub mod policy;
pub mod state;
pub mod store;

pub use error::{LoginError, Result, ThrottleError};
pub use flow::{is_valid_email, HumanVerifier, IdentityVerifier, LoginFlow, LoginRequest, VerifyFailure};
pub use guard::{AttemptOutcome, BlockReason, Decision, LoginThrottle};
pub use policy::ThrottlePolicy;
pub use state::{seconds_until_midnight, ThrottleState, STATE_VERSION};
pub use store::{JsonFileStore, MemoryStore, StateStore};
