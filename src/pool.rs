// src/pool.rs

// independent token buckets keyed by caller, e.g. one per tenant

// dependencies
use crate::clock::{Clock, SystemClock};
use crate::config::TokenBucketConfig;
use crate::errors::TokenBucketError;
use crate::grant::Grant;
use crate::token_bucket::TokenBucket;
use dashmap::DashMap;
use std::hash::Hash;
use tracing::debug;

/// A set of independent token buckets, one per key, created on first use.
/// K is the type used to identify bucket owners (e.g., String, u64, etc.).
/// H is the cancellation handle type of each bucket.
/// C is the clock type shared by all buckets, defaulting to SystemClock.
/// We use `DashMap` for thread-safe concurrent access to the buckets; the
/// buckets themselves share nothing.
#[derive(Debug)]
pub struct BucketPool<K, H = String, C = SystemClock>
where
    K: Hash + Eq + Clone,
    H: Hash + Eq + Clone + Send + Sync + 'static,
    C: Clock + Clone + 'static,
{
    config: TokenBucketConfig,
    clock: C,
    buckets: DashMap<K, TokenBucket<H, C>>,
}

impl<K, H, C> BucketPool<K, H, C>
where
    K: Hash + Eq + Clone,
    H: Hash + Eq + Clone + Send + Sync + 'static,
    C: Clock + Clone + 'static,
{
    /// Create a pool whose buckets all follow `config`.
    pub fn with_config(config: TokenBucketConfig, clock: C) -> Result<Self, TokenBucketError> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            buckets: DashMap::new(),
        })
    }

    /// The bucket for `key`, creating a full one if there is none yet.
    ///
    /// The returned handle shares state with the pooled bucket only while the
    /// pool holds it. Once [`cleanup_idle`](BucketPool::cleanup_idle) removes
    /// the bucket, the next use of `key` creates a new one, and requests made
    /// through a handle kept from before are no longer counted against `key`.
    /// Hold handles briefly, or go through [`request_token`](BucketPool::request_token).
    pub fn bucket(&self, key: K) -> Result<TokenBucket<H, C>, TokenBucketError> {
        if let Some(bucket) = self.buckets.get(&key) {
            return Ok(bucket.value().clone());
        }

        let bucket = TokenBucket::with_config(self.config.clone(), self.clock.clone())?;
        Ok(self.buckets.entry(key).or_insert(bucket).value().clone())
    }

    /// Ask the bucket for `key` for one token.
    pub fn request_token(&self, key: K, handle: Option<H>) -> Result<Grant, TokenBucketError> {
        // the map shard is released before the bucket is locked
        self.bucket(key)?.request_token(handle)
    }

    /// Cancel the grants registered under `handle` in the bucket for `key`.
    pub fn cancel(&self, key: &K, handle: &H) -> usize {
        let bucket = self.buckets.get(key).map(|bucket| bucket.value().clone());
        bucket.map_or(0, |bucket| bucket.cancel(handle))
    }

    /// Cancel every pending grant in every bucket.
    pub fn cancel_all(&self) -> usize {
        let buckets: Vec<_> = self
            .buckets
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        buckets.iter().map(TokenBucket::cancel_all).sum()
    }

    /// Number of buckets currently held.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drop buckets that have nothing pending and have refilled to capacity.
    ///
    /// Such a bucket is recreated full on its next use, so removing it is not
    /// observable. Returns how many buckets were removed.
    pub fn cleanup_idle(&self) -> Result<usize, TokenBucketError> {
        let mut idle = Vec::new();
        for entry in self.buckets.iter() {
            if entry.value().is_idle()? {
                idle.push(entry.key().clone());
            }
        }

        // re-checked under the shard lock in case a request came in meanwhile
        let removed = idle
            .iter()
            .filter(|key| {
                self.buckets
                    .remove_if(*key, |_, bucket| bucket.is_idle().unwrap_or(false))
                    .is_some()
            })
            .count();
        if removed > 0 {
            debug!(removed, "removed idle buckets");
        }
        Ok(removed)
    }
}
