//! Error types for the throttle core

use thiserror::Error;

/// Result type alias for throttle operations
pub type Result<T> = std::result::Result<T, ThrottleError>;

/// Errors that can occur while loading or persisting throttle state
#[derive(Debug, Error)]
pub enum ThrottleError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Storage adapter error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<serde_json::Error> for ThrottleError {
    fn from(e: serde_json::Error) -> Self {
        ThrottleError::Serialization(e.to_string())
    }
}

/// Classified login failures surfaced to the caller.
///
/// Everything here is recoverable: precondition failures by fixing the
/// input, credential failures by retrying, blocks by waiting.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("Email is required")]
    MissingEmail,

    #[error("Password is required")]
    MissingPassword,

    #[error("Email address is not valid")]
    InvalidEmailFormat,

    #[error("Complete the verification challenge first")]
    MissingHumanToken,

    #[error("Verification challenge failed - please try again")]
    HumanCheckFailed,

    #[error("Incorrect email or password ({attempts_remaining} attempts remaining)")]
    InvalidCredential { attempts_remaining: u32 },

    #[error("Account email is not verified")]
    UnverifiedAccount,

    #[error("Sign-in service error: {0}")]
    Service(String),

    #[error("Too many attempts - try again in {retry_after_secs} seconds")]
    TemporaryCooldown { retry_after_secs: u64 },

    #[error("Daily attempt limit reached - try again in {retry_after_secs} seconds")]
    DailyLimit { retry_after_secs: u64 },

    #[error("Throttle storage error: {0}")]
    Storage(#[from] ThrottleError),
}
