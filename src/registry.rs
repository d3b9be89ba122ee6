// src/registry.rs

// pending deferred grants, their dispatch order and the handle index

// dependencies
use crate::errors::TokenBucketError;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::Hash;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Sending half of a deferred grant.
pub(crate) type Completion = oneshot::Sender<Result<(), TokenBucketError>>;

/// Receiving half of a deferred grant.
pub(crate) type CompletionReceiver = oneshot::Receiver<Result<(), TokenBucketError>>;

/// A deferred grant waiting for its deadline.
#[derive(Debug)]
pub(crate) struct PendingRequest<H> {
    deadline: Instant,
    handle: Option<H>,
    completion: Completion,
}

impl<H> PendingRequest<H> {
    pub(crate) fn into_completion(self) -> Completion {
        self.completion
    }
}

/// Set of deferred grants owned by one bucket.
///
/// `pending` is authoritative. `queue` orders the same ids by deadline, with
/// the monotonically assigned id breaking ties in arrival order, and
/// `by_handle` indexes them by caller handle. Both are kept in step with
/// `pending` on every insert and removal.
#[derive(Debug)]
pub(crate) struct Registry<H> {
    next_id: u64,
    pending: HashMap<u64, PendingRequest<H>>,
    queue: BTreeSet<(Instant, u64)>,
    by_handle: HashMap<H, HashSet<u64>>,
}

impl<H> Registry<H>
where
    H: Hash + Eq,
{
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            pending: HashMap::new(),
            queue: BTreeSet::new(),
            by_handle: HashMap::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub(crate) fn len_for(&self, handle: &H) -> usize {
        self.by_handle.get(handle).map_or(0, HashSet::len)
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.queue.first().map(|(deadline, _)| *deadline)
    }

    /// Register a grant that completes at `deadline`.
    ///
    /// Returns the receiving half and whether the new entry is now the
    /// earliest one, in which case a sleeping dispatcher has to be woken.
    pub(crate) fn schedule(
        &mut self,
        deadline: Instant,
        handle: Option<H>,
    ) -> (CompletionReceiver, bool)
    where
        H: Clone,
    {
        let id = self.next_id;
        self.next_id += 1;

        let (completion, receiver) = oneshot::channel();
        if let Some(handle) = &handle {
            self.by_handle.entry(handle.clone()).or_default().insert(id);
        }
        self.queue.insert((deadline, id));
        self.pending.insert(
            id,
            PendingRequest {
                deadline,
                handle,
                completion,
            },
        );

        let is_next = self.queue.first() == Some(&(deadline, id));
        (receiver, is_next)
    }

    /// Remove every request whose deadline is at or before `now`, earliest
    /// first.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Vec<PendingRequest<H>> {
        let mut due = Vec::new();
        while let Some(&(deadline, id)) = self.queue.first() {
            if deadline > now {
                break;
            }
            self.queue.pop_first();
            if let Some(request) = self.take(id) {
                due.push(request);
            }
        }
        due
    }

    /// Remove every request registered under `handle`, in dispatch order.
    pub(crate) fn cancel(&mut self, handle: &H) -> Vec<PendingRequest<H>> {
        let Some(ids) = self.by_handle.remove(handle) else {
            return Vec::new();
        };

        let mut cancelled: Vec<(u64, PendingRequest<H>)> = ids
            .into_iter()
            .filter_map(|id| {
                let request = self.pending.remove(&id)?;
                self.queue.remove(&(request.deadline, id));
                Some((id, request))
            })
            .collect();
        cancelled.sort_by_key(|(id, request)| (request.deadline, *id));
        cancelled.into_iter().map(|(_, request)| request).collect()
    }

    /// Remove every request, in dispatch order. The id sequence is kept.
    pub(crate) fn cancel_all(&mut self) -> Vec<PendingRequest<H>> {
        self.by_handle.clear();
        let queue = std::mem::take(&mut self.queue);
        queue
            .into_iter()
            .filter_map(|(_, id)| self.pending.remove(&id))
            .collect()
    }

    // removes a record from `pending` and the handle index; the caller owns
    // the queue entry
    fn take(&mut self, id: u64) -> Option<PendingRequest<H>> {
        let request = self.pending.remove(&id)?;
        if let Some(handle) = &request.handle {
            if let Some(ids) = self.by_handle.get_mut(handle) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.by_handle.remove(handle);
                }
            }
        }
        Some(request)
    }
}
