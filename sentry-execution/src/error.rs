use sentry_integration::Unrecoverable;
use thiserror::Error;

/// Errors an [`crate::client::ExchangeClient`] call can fail with (spec
/// §4.A / §6): `{transient, auth, validation, rate_limited}`.
#[derive(Debug, Clone, Error)]
pub enum ExchangeError {
    #[error("transient exchange error: {0}")]
    Transient(String),
    #[error("auth error: {0}")]
    Auth(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("rate limited")]
    RateLimited,
}

impl ExchangeError {
    /// `true` for errors the next evaluation cycle will retry
    /// organically with no state mutation (spec §7: transient exchange
    /// error / rate-limited).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExchangeError::Transient(_) | ExchangeError::RateLimited)
    }
}

impl Unrecoverable for ExchangeError {
    fn is_unrecoverable(&self) -> bool {
        matches!(self, ExchangeError::Auth(_) | ExchangeError::Validation(_))
    }
}

/// Raised when the [`crate::order::OrderTracker`] is asked to do
/// something that violates its invariants (spec §7: "bugs, not
/// operating conditions"). The daemon treats these as fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrderTrackerError {
    #[error("bot {bot_id} already has a pending trade record {existing_id}")]
    AlreadyPending { bot_id: i64, existing_id: i64 },
    #[error("trade record {id} is already terminal ({status}) and cannot be mutated")]
    AlreadyTerminal { id: i64, status: &'static str },
    #[error("trade record {id} not found")]
    NotFound { id: i64 },
}
