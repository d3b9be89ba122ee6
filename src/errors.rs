// src/errors.rs

// error handling for the token bucket

// dependencies
use thiserror::Error;

use crate::clock::ClockError;

/// Error type for token bucket configuration and admission failures.
///
/// Every variant is terminal for the request it is reported on: a rejected or
/// cancelled request never turns into a grant later.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TokenBucketError {
    /// Granting the request would push the balance past the credit limit.
    /// The balance is left untouched.
    #[error("token credit exceeded")]
    CreditExceeded,
    /// A deferred request was cancelled before it fired.
    #[error("request was cancelled before it was granted")]
    Cancelled,
    #[error("rate must be positive and finite")]
    InvalidRate,
    #[error("token capacity must be non-negative and finite")]
    InvalidCapacity,
    #[error("token credit must be non-negative and finite")]
    InvalidCredit,
    #[error("initial balance must be finite")]
    InvalidInitialBalance,
    #[error("clock error occurred: {0}")]
    Clock(#[from] ClockError),
    /// Deferred grants need a tokio runtime to dispatch them.
    #[error("no tokio runtime available to dispatch deferred grants")]
    RuntimeUnavailable,
    /// The refill rate is so slow that the wait for the next token cannot be
    /// represented. The balance is left untouched.
    #[error("delay until the next token is out of range")]
    DelayOutOfRange,
}

impl TokenBucketError {
    /// Whether this error was raised while validating a configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TokenBucketError::InvalidRate
                | TokenBucketError::InvalidCapacity
                | TokenBucketError::InvalidCredit
                | TokenBucketError::InvalidInitialBalance
        )
    }
}
