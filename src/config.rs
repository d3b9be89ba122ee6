// src/config.rs

//! Configuration types for the token bucket

// dependencies
use crate::errors::TokenBucketError;

/// Configuration for token bucket behavior
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucketConfig {
    pub(crate) tokens: f64,
    pub(crate) rate: f64,
    pub(crate) token_credit: f64,
    pub(crate) initial_balance: Option<f64>,
}

impl TokenBucketConfig {
    /// Create a new configuration with capacity and refill rate settings.
    ///
    /// The credit limit defaults to the capacity and the bucket starts full.
    pub fn new(tokens: f64, rate: f64) -> Self {
        Self {
            tokens,
            rate,
            token_credit: tokens,
            initial_balance: None,
        }
    }

    /// Builder-style: set the capacity reached through natural refill
    pub fn tokens(mut self, tokens: f64) -> Self {
        self.tokens = tokens;
        self
    }

    /// Builder-style: set the refill rate in tokens per second
    pub fn rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// Builder-style: set how far into debt the bucket may defer requests
    pub fn token_credit(mut self, token_credit: f64) -> Self {
        self.token_credit = token_credit;
        self
    }

    /// Builder-style: set the starting balance.
    ///
    /// Any finite value is accepted, including values above the capacity or
    /// below the credit limit.
    pub fn initial_balance(mut self, initial_balance: f64) -> Self {
        self.initial_balance = Some(initial_balance);
        self
    }

    /// Balance the bucket starts with.
    pub(crate) fn starting_balance(&self) -> f64 {
        self.initial_balance.unwrap_or(self.tokens)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), TokenBucketError> {
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return Err(TokenBucketError::InvalidRate);
        }
        if !self.tokens.is_finite() || self.tokens < 0.0 {
            return Err(TokenBucketError::InvalidCapacity);
        }
        if !self.token_credit.is_finite() || self.token_credit < 0.0 {
            return Err(TokenBucketError::InvalidCredit);
        }
        if self.initial_balance.is_some_and(|b| !b.is_finite()) {
            return Err(TokenBucketError::InvalidInitialBalance);
        }
        Ok(())
    }
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self::new(10.0, 10.0)
    }
}
