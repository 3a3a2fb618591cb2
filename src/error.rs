//! Error types for tierswitch.

use thiserror::Error;

use crate::tier::Tier;

/// Result type alias using tierswitch's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during escalation handling.
#[derive(Error, Debug)]
pub enum Error {
    /// The session control surface could not be reached or returned
    /// unparsable output. Decision-making continues on the cached tier.
    #[error("session adapter unavailable: {0}")]
    Adapter(String),

    /// The attempted tier change was rejected or errored.
    #[error("tier switch to '{tier}' failed: {reason}")]
    SwitchFailed { tier: Tier, reason: String },

    /// Malformed thresholds or rules supplied at construction.
    #[error("configuration error: {0}")]
    Config(String),

    /// A user-supplied rule implementation panicked during evaluation.
    #[error("rule '{rule}' evaluation failed: {message}")]
    RuleEvaluation { rule: String, message: String },

    /// Adapter call exceeded the configured timeout.
    #[error("adapter call timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
}

impl Error {
    /// Create an adapter error.
    pub fn adapter(message: impl Into<String>) -> Self {
        Self::Adapter(message.into())
    }

    /// Create a switch failure error.
    pub fn switch_failed(tier: Tier, reason: impl Into<String>) -> Self {
        Self::SwitchFailed {
            tier,
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }
}
