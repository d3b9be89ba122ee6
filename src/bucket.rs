// src/bucket.rs

// balance bookkeeping and the admit/defer/reject decision

// dependencies
use crate::config::TokenBucketConfig;
use crate::errors::TokenBucketError;
use std::time::Duration;

/// How an admission request is served.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Admission {
    /// A whole token is available right now.
    Immediate,
    /// The token is granted on credit and becomes available after the delay.
    Deferred(Duration),
}

/// Token balance with lazy refill.
///
/// The balance is only written by [`refill`](BucketState::refill) and
/// [`reserve`](BucketState::reserve). Refill never pushes it above the
/// capacity, but an explicit initial balance may start above it; such an
/// overfill is only worn down by consumption.
#[derive(Debug, Clone)]
pub(crate) struct BucketState {
    balance: f64,
    capacity: f64,
    credit: f64,
    rate: f64,
    last_update_nanos: u64,
}

impl BucketState {
    // the config is expected to be validated already
    pub(crate) fn new(config: &TokenBucketConfig, now_nanos: u64) -> Self {
        Self {
            balance: config.starting_balance(),
            capacity: config.tokens,
            credit: config.token_credit,
            rate: config.rate,
            last_update_nanos: now_nanos,
        }
    }

    pub(crate) fn balance(&self) -> f64 {
        self.balance
    }

    pub(crate) fn capacity(&self) -> f64 {
        self.capacity
    }

    pub(crate) fn credit(&self) -> f64 {
        self.credit
    }

    pub(crate) fn rate(&self) -> f64 {
        self.rate
    }

    /// Balance the bucket would hold after a refill at `now_nanos`, without
    /// recording it.
    pub(crate) fn projected(&self, now_nanos: u64) -> f64 {
        if self.balance >= self.capacity {
            return self.balance;
        }

        // signed so that a clock that went backwards yields negative accrual
        let elapsed_secs =
            (now_nanos as i128 - self.last_update_nanos as i128) as f64 / 1_000_000_000.0;
        let refilled = (self.balance + elapsed_secs * self.rate).min(self.capacity);

        // a clock regression may not take the balance below the credit floor,
        // nor below where it already was if it started deeper than that
        refilled.max(self.balance.min(-self.credit))
    }

    /// Accrue tokens for the time elapsed since the last update.
    pub(crate) fn refill(&mut self, now_nanos: u64) {
        self.balance = self.projected(now_nanos);
        self.last_update_nanos = now_nanos;
    }

    /// Decide how the next token is served, without consuming it.
    ///
    /// A request is deferred as long as the balance after reserving its token
    /// stays at or above `-credit`; at exactly `balance == 1 - credit` it is
    /// still deferred.
    ///
    /// A delay too long to represent as a [`Duration`] is reported as
    /// [`TokenBucketError::DelayOutOfRange`].
    pub(crate) fn decide(&self) -> Result<Admission, TokenBucketError> {
        if self.balance >= 1.0 {
            return Ok(Admission::Immediate);
        }
        if self.balance < 1.0 - self.credit {
            return Err(TokenBucketError::CreditExceeded);
        }

        let missing_tokens = 1.0 - self.balance;
        let delay = Duration::try_from_secs_f64(missing_tokens / self.rate)
            .map_err(|_| TokenBucketError::DelayOutOfRange)?;
        Ok(Admission::Deferred(delay))
    }

    /// Consume one token, possibly going into debt.
    pub(crate) fn reserve(&mut self) {
        self.balance -= 1.0;
    }

    /// Refill, decide and reserve in one step.
    #[cfg(test)]
    pub(crate) fn admit(&mut self, now_nanos: u64) -> Result<Admission, TokenBucketError> {
        self.refill(now_nanos);
        let admission = self.decide()?;
        self.reserve();
        Ok(admission)
    }
}
