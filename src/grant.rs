// src/grant.rs

// the caller-facing side of an admission

// dependencies
use crate::errors::TokenBucketError;
use crate::registry::CompletionReceiver;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

/// An admitted request.
///
/// Resolves to `Ok(())` once the token is available: immediately for a grant
/// served from the current balance, after [`delay`](Grant::delay) for a grant
/// taken on credit. A deferred grant resolves to
/// [`TokenBucketError::Cancelled`] if it is cancelled, or if its bucket is
/// dropped, before it fires.
#[must_use = "a grant does nothing unless awaited or inspected"]
#[derive(Debug)]
pub struct Grant {
    delay: Duration,
    inner: GrantInner,
}

#[derive(Debug)]
enum GrantInner {
    Ready,
    Deferred(CompletionReceiver),
}

impl Grant {
    pub(crate) fn immediate() -> Self {
        Self {
            delay: Duration::ZERO,
            inner: GrantInner::Ready,
        }
    }

    pub(crate) fn deferred(delay: Duration, receiver: CompletionReceiver) -> Self {
        Self {
            delay,
            inner: GrantInner::Deferred(receiver),
        }
    }

    /// Whether the token was available at request time.
    pub fn is_immediate(&self) -> bool {
        matches!(self.inner, GrantInner::Ready)
    }

    /// How long after the request the token becomes available.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Future for Grant {
    type Output = Result<(), TokenBucketError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            GrantInner::Ready => Poll::Ready(Ok(())),
            // a dropped sender means the bucket went away with the grant
            GrantInner::Deferred(receiver) => Pin::new(receiver)
                .poll(cx)
                .map(|result| result.unwrap_or(Err(TokenBucketError::Cancelled))),
        }
    }
}
