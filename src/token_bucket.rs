// src/token_bucket.rs

// credit-bucket: a lazily refilled token bucket that defers admissions on credit.

// dependencies
use crate::bucket::{Admission, BucketState};
use crate::clock::{Clock, SystemClock};
use crate::config::TokenBucketConfig;
use crate::dispatch::{DispatchSource, Dispatcher};
use crate::errors::TokenBucketError;
use crate::grant::Grant;
use crate::registry::{Completion, PendingRequest, Registry};
use parking_lot::Mutex;
use std::hash::Hash;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, trace};

/// The main TokenBucket model.
/// H is the type of the cancellation handles callers attach to requests
/// (e.g., String, u64, etc.); many requests may share one handle.
/// C is the clock type used for the lazy refill, defaulting to SystemClock.
///
/// `TokenBucket` is a cheap handle: clones share the same bucket. Dropping
/// the last clone cancels every pending deferred grant.
#[derive(Debug)]
pub struct TokenBucket<H = String, C = SystemClock>
where
    H: Hash + Eq + Clone + Send + Sync + 'static,
    C: Clock + 'static,
{
    shared: Arc<Shared<H, C>>,
}

#[derive(Debug)]
struct Shared<H, C>
where
    H: Hash + Eq,
{
    core: Mutex<Core<H>>,
    clock: C,
}

// everything that must change together under one lock
#[derive(Debug)]
struct Core<H> {
    state: BucketState,
    registry: Registry<H>,
    dispatcher: Dispatcher,
}

// methods for the TokenBucket type
impl<H, C> TokenBucket<H, C>
where
    H: Hash + Eq + Clone + Send + Sync + 'static,
    C: Clock + 'static,
{
    // method to create a new token bucket from a config object
    pub fn with_config(config: TokenBucketConfig, clock: C) -> Result<Self, TokenBucketError> {
        config.validate()?;
        let now = clock.now()?;

        Ok(Self {
            shared: Arc::new(Shared {
                core: Mutex::new(Core {
                    state: BucketState::new(&config, now),
                    registry: Registry::new(),
                    dispatcher: Dispatcher::new(),
                }),
                clock,
            }),
        })
    }

    // accessor method to return the capacity reached through refill
    pub fn tokens(&self) -> f64 {
        self.shared.core.lock().state.capacity()
    }

    // accessor method to return the refill rate in tokens per second
    pub fn rate(&self) -> f64 {
        self.shared.core.lock().state.rate()
    }

    // accessor method to return the credit limit
    pub fn token_credit(&self) -> f64 {
        self.shared.core.lock().state.credit()
    }

    /// Ask for one token.
    ///
    /// Returns a [`Grant`] that is either already resolved or completes once
    /// the token has accrued. Fails synchronously with
    /// [`TokenBucketError::CreditExceeded`] when the request would take the
    /// bucket past its credit limit; the balance is not charged in that case.
    ///
    /// Deferred grants are dispatched on the current tokio runtime, so taking
    /// a token on credit outside of one fails with
    /// [`TokenBucketError::RuntimeUnavailable`], again without charging the
    /// balance.
    ///
    /// A rate so slow that the wait cannot be represented fails with
    /// [`TokenBucketError::DelayOutOfRange`], also without charging it.
    ///
    /// `handle` groups the request for [`cancel`](TokenBucket::cancel); a
    /// request without one can only be cancelled by
    /// [`cancel_all`](TokenBucket::cancel_all).
    pub fn request_token(&self, handle: Option<H>) -> Result<Grant, TokenBucketError> {
        let mut core = self.shared.core.lock();
        let now_nanos = self.shared.clock.now()?;
        core.state.refill(now_nanos);

        let admission = core.state.decide().inspect_err(|err| {
            debug!(balance = core.state.balance(), %err, "token request rejected");
        })?;

        match admission {
            Admission::Immediate => {
                core.state.reserve();
                trace!(balance = core.state.balance(), "token granted");
                Ok(Grant::immediate())
            }
            Admission::Deferred(delay) => {
                let Core {
                    state,
                    registry,
                    dispatcher,
                } = &mut *core;

                let deadline = Instant::now()
                    .checked_add(delay)
                    .ok_or(TokenBucketError::DelayOutOfRange)?;
                dispatcher.ensure_running(Arc::downgrade(&self.shared))?;
                state.reserve();
                let (receiver, is_next) = registry.schedule(deadline, handle);
                if is_next {
                    dispatcher.wake();
                }

                trace!(
                    balance = state.balance(),
                    delay_ms = delay.as_secs_f64() * 1000.0,
                    "token granted on credit"
                );
                Ok(Grant::deferred(delay, receiver))
            }
        }
    }

    /// Cancel every pending deferred grant registered under `handle`.
    ///
    /// Each cancelled grant has resolved to [`TokenBucketError::Cancelled`]
    /// by the time this returns. Returns how many were cancelled; an unknown
    /// handle is not an error.
    pub fn cancel(&self, handle: &H) -> usize {
        let cancelled = {
            let mut core = self.shared.core.lock();
            let cancelled = core.registry.cancel(handle);
            if !cancelled.is_empty() {
                core.dispatcher.wake();
            }
            cancelled
        };
        reject(cancelled)
    }

    /// Cancel every pending deferred grant, with or without a handle.
    pub fn cancel_all(&self) -> usize {
        let cancelled = {
            let mut core = self.shared.core.lock();
            let cancelled = core.registry.cancel_all();
            if !cancelled.is_empty() {
                core.dispatcher.wake();
            }
            cancelled
        };
        reject(cancelled)
    }

    /// Point-in-time balance, including tokens accrued since the last request.
    ///
    /// Informational only: a concurrent request may change it right away.
    pub fn balance(&self) -> Result<f64, TokenBucketError> {
        let core = self.shared.core.lock();
        let now_nanos = self.shared.clock.now()?;
        Ok(core.state.projected(now_nanos))
    }

    /// Number of deferred grants that have neither fired nor been cancelled.
    pub fn pending(&self) -> usize {
        self.shared.core.lock().registry.len()
    }

    /// Number of pending deferred grants registered under `handle`.
    pub fn pending_for(&self, handle: &H) -> usize {
        self.shared.core.lock().registry.len_for(handle)
    }

    // a bucket with nothing pending that has refilled to capacity behaves
    // exactly like a freshly built one
    pub(crate) fn is_idle(&self) -> Result<bool, TokenBucketError> {
        let core = self.shared.core.lock();
        if !core.registry.is_empty() {
            return Ok(false);
        }
        let now_nanos = self.shared.clock.now()?;
        Ok(core.state.projected(now_nanos) >= core.state.capacity())
    }
}

impl<H, C> Clone for TokenBucket<H, C>
where
    H: Hash + Eq + Clone + Send + Sync + 'static,
    C: Clock + 'static,
{
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<H, C> DispatchSource for Shared<H, C>
where
    H: Hash + Eq + Clone + Send + Sync + 'static,
    C: Clock + 'static,
{
    fn take_due(&self, now: Instant) -> (Vec<Completion>, Option<Instant>) {
        let mut core = self.core.lock();
        let due = core
            .registry
            .pop_due(now)
            .into_iter()
            .map(PendingRequest::into_completion)
            .collect();
        let next = core.registry.next_deadline();
        if next.is_none() {
            core.dispatcher.stop();
        }
        (due, next)
    }
}

impl<H, C> Drop for Shared<H, C>
where
    H: Hash + Eq,
{
    fn drop(&mut self) {
        let core = self.core.get_mut();
        let cancelled = core.registry.cancel_all();
        core.dispatcher.wake();
        reject(cancelled);
    }
}

// fail cancelled grants, outside of the bucket lock
fn reject<H>(cancelled: Vec<PendingRequest<H>>) -> usize {
    let count = cancelled.len();
    for request in cancelled {
        let _ = request.into_completion().send(Err(TokenBucketError::Cancelled));
    }
    if count > 0 {
        debug!(count, "cancelled pending grants");
    }
    count
}
