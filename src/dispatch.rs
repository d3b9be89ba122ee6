// src/dispatch.rs

// the shared timer task that completes deferred grants

// dependencies
use crate::errors::TokenBucketError;
use crate::registry::Completion;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

/// Something that holds deferred grants for the dispatcher to complete.
pub(crate) trait DispatchSource: Send + Sync + 'static {
    /// Take every grant due at `now` and report the next deadline.
    ///
    /// When nothing is left the source must mark its [`Dispatcher`] as
    /// stopped while still holding the lock that guards its registry, so a
    /// concurrent schedule either sees the running task or starts a new one.
    fn take_due(&self, now: Instant) -> (Vec<Completion>, Option<Instant>);
}

/// Lifecycle of the dispatcher task of one bucket.
///
/// At most one task runs per bucket, and only while the registry is not
/// empty. A task that went away with its runtime counts as stopped, so the
/// next deferral respawns it on the caller's runtime and it picks up whatever
/// the old one left behind.
#[derive(Debug)]
pub(crate) struct Dispatcher {
    task: Option<JoinHandle<()>>,
    wake: Arc<Notify>,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self {
            task: None,
            wake: Arc::new(Notify::new()),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Start the task on the current tokio runtime unless it is running.
    pub(crate) fn ensure_running<S: DispatchSource>(
        &mut self,
        source: Weak<S>,
    ) -> Result<(), TokenBucketError> {
        if self.is_running() {
            return Ok(());
        }
        if self.task.take().is_some() {
            debug!("dispatcher was shut down with its runtime, restarting");
        }

        let runtime = Handle::try_current().map_err(|_| TokenBucketError::RuntimeUnavailable)?;
        self.task = Some(runtime.spawn(run(source, Arc::clone(&self.wake))));
        debug!("dispatcher started");
        Ok(())
    }

    /// Make the task re-read the registry, e.g. after an earlier deadline was
    /// queued or entries were cancelled.
    pub(crate) fn wake(&self) {
        self.wake.notify_one();
    }

    // the task exits right after this, dropping the handle detaches it
    pub(crate) fn stop(&mut self) {
        self.task = None;
    }
}

async fn run<S: DispatchSource>(source: Weak<S>, wake: Arc<Notify>) {
    loop {
        let (due, next) = {
            let Some(source) = source.upgrade() else {
                debug!("bucket dropped, dispatcher exiting");
                return;
            };
            source.take_due(Instant::now())
        };

        for completion in due {
            // the caller may have stopped waiting for its grant
            let _ = completion.send(Ok(()));
        }

        let Some(deadline) = next else {
            debug!("no pending grants, dispatcher exiting");
            return;
        };

        tokio::select! {
            _ = sleep_until(deadline) => {}
            _ = wake.notified() => {}
        }
    }
}
