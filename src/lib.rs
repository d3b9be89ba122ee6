// src/lib.rs

//! # Credit Bucket
//!
//! A token bucket rate limiter that refills lazily and lets callers run into
//! a bounded amount of debt. A request is either granted right away, granted
//! on credit after a computed delay, or rejected once the credit limit would
//! be exceeded. Pending grants can be cancelled by handle or all at once.
//!
//! ## Quick Example
//!
//! ```rust
//! use credit_bucket::{SystemClock, TokenBucket, TokenBucketConfig, TokenBucketError};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), TokenBucketError> {
//! // 2 tokens of burst, 10 tokens per second, up to 2 tokens of debt
//! let config = TokenBucketConfig::new(2.0, 10.0).token_credit(2.0);
//! let bucket = TokenBucket::<String, _>::with_config(config, SystemClock)?;
//!
//! for _ in 0..4 {
//!     let grant = bucket.request_token(Some("batch-1".to_string()))?;
//!     println!("granted in {:?}", grant.delay());
//!     grant.await?;
//! }
//!
//! match bucket.request_token(None) {
//!     Err(TokenBucketError::CreditExceeded) => println!("over credit, try later"),
//!     other => println!("admitted: {}", other.is_ok()),
//! }
//! # Ok(())
//! # }
//! ```

// private modules
mod bucket;
mod clock;
mod config;
mod dispatch;
mod errors;
mod grant;
mod pool;
mod registry;
mod token_bucket;

// public API exports
pub use clock::{Clock, ClockError, MonotonicClock, SystemClock};
pub use config::TokenBucketConfig;
pub use errors::TokenBucketError;
pub use grant::Grant;
pub use pool::BucketPool;
pub use token_bucket::TokenBucket;
