//! Fixed-window rate limiting keyed by arbitrary strings.
//!
//! Each key (typically `action:identity`) owns one [`RateBucket`]. The first
//! request of a window creates the bucket; later requests increment it until
//! `reset_at` passes, at which point the bucket is replaced.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::http::{HeaderName, HeaderValue};

use crate::http::context::ResponseMutation;
use crate::security::clock::{Clock, SystemClock};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Counter state for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBucket {
    pub count: u32,
    /// Window end, milliseconds since the Unix epoch. Exclusive.
    pub reset_at: u64,
}

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: u64,
    pub retry_after_secs: u64,
}

impl RateLimitDecision {
    /// `X-RateLimit-Reset` value: window end in whole Unix seconds, rounded up.
    pub fn reset_epoch_secs(&self) -> u64 {
        self.reset_at.div_ceil(1000)
    }

    /// Attach the `X-RateLimit-*` headers, plus `Retry-After` when denied.
    pub fn apply_headers(&self, response: &mut ResponseMutation) {
        response.set_header(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        response.set_header(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        response.set_header(X_RATELIMIT_RESET, HeaderValue::from(self.reset_epoch_secs()));
        if !self.allowed {
            response.set_header(
                axum::http::header::RETRY_AFTER,
                HeaderValue::from(self.retry_after_secs),
            );
        }
    }
}

/// Storage backend for rate buckets.
///
/// The limiter serializes every sweep/read/write sequence behind one lock, so
/// implementations only need `&mut self` access. A networked store can be
/// swapped in without touching call sites.
pub trait BucketStore: Send {
    fn get(&self, key: &str) -> Option<RateBucket>;
    fn upsert(&mut self, key: &str, bucket: RateBucket);
    /// Drop every bucket whose window has ended. Returns how many were removed.
    fn sweep(&mut self, now_ms: u64) -> usize;
    fn clear(&mut self);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local bucket table.
#[derive(Debug, Default)]
pub struct MemoryBucketStore {
    buckets: HashMap<String, RateBucket>,
}

impl BucketStore for MemoryBucketStore {
    fn get(&self, key: &str) -> Option<RateBucket> {
        self.buckets.get(key).copied()
    }

    fn upsert(&mut self, key: &str, bucket: RateBucket) {
        match self.buckets.get_mut(key) {
            Some(existing) => *existing = bucket,
            None => {
                self.buckets.insert(key.to_string(), bucket);
            }
        }
    }

    fn sweep(&mut self, now_ms: u64) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| bucket.reset_at > now_ms);
        before - self.buckets.len()
    }

    fn clear(&mut self) {
        self.buckets.clear();
    }

    fn len(&self) -> usize {
        self.buckets.len()
    }
}

/// Fixed-window rate limiter.
pub struct RateLimiter {
    store: Mutex<Box<dyn BucketStore>>,
    clock: Arc<dyn Clock>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl RateLimiter {
    /// In-memory limiter reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_store(Box::new(MemoryBucketStore::default()), clock)
    }

    pub fn with_store(store: Box<dyn BucketStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Mutex::new(store),
            clock,
        }
    }

    /// Check `key` against the current clock.
    pub fn check(&self, key: &str, limit: u32, window_ms: u64) -> RateLimitDecision {
        self.check_at(key, limit, window_ms, self.clock.now_ms())
    }

    /// Check `key` at an explicit instant.
    pub fn check_at(&self, key: &str, limit: u32, window_ms: u64, now_ms: u64) -> RateLimitDecision {
        let mut store = self.lock();

        let swept = store.sweep(now_ms);
        if swept > 0 {
            tracing::trace!(swept, "Expired rate buckets removed");
        }

        let bucket = match store.get(key) {
            Some(existing) => RateBucket {
                count: existing.count.saturating_add(1),
                reset_at: existing.reset_at,
            },
            None => RateBucket {
                count: 1,
                reset_at: now_ms.saturating_add(window_ms),
            },
        };
        store.upsert(key, bucket);
        drop(store);

        let allowed = bucket.count <= limit;
        let retry_after_secs = bucket.reset_at.saturating_sub(now_ms).div_ceil(1000).max(1);

        if !allowed {
            tracing::debug!(key, count = bucket.count, limit, retry_after_secs, "Rate limit exceeded");
        }

        RateLimitDecision {
            allowed,
            limit,
            remaining: limit.saturating_sub(bucket.count),
            reset_at: bucket.reset_at,
            retry_after_secs,
        }
    }

    /// Forget all buckets. Intended for tests.
    pub fn reset(&self) {
        self.lock().clear();
    }

    /// Number of live buckets (expired ones linger until the next check).
    pub fn bucket_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn BucketStore>> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
