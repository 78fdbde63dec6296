//! Admission control: per-tool sliding-window rate limiting and a fail-fast concurrency gate.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

use crate::error::LimitError;

/// Length of the sliding rate window.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window rate limiter keyed by tool name.
///
/// Every key has its own budget of `max_per_minute` calls in any trailing 60 seconds.
/// Prune, check and append happen under one lock so concurrent callers on a
/// multi-threaded runtime cannot both take the last slot.
#[derive(Debug)]
pub struct RateLimiter {
    max_per_minute: usize,
    calls: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_per_minute: usize) -> Self {
        Self { max_per_minute, calls: Mutex::new(HashMap::new()) }
    }

    /// Configured calls per minute.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.max_per_minute
    }

    /// Admit one call for `key` or fail with [`LimitError::RateLimited`].
    pub async fn check(&self, key: &str) -> Result<(), LimitError> {
        self.check_at(key, Instant::now()).await
    }

    /// [`check`](Self::check) against an explicit clock reading.
    pub async fn check_at(&self, key: &str, now: Instant) -> Result<(), LimitError> {
        let mut calls = self.calls.lock().await;
        let window = calls.entry(key.to_owned()).or_default();

        while window.front().is_some_and(|&t| now.saturating_duration_since(t) >= RATE_WINDOW) {
            window.pop_front();
        }

        if window.len() >= self.max_per_minute {
            tracing::warn!(key, limit = self.max_per_minute, "Rate limit exceeded");
            return Err(LimitError::RateLimited {
                key: key.to_owned(),
                limit: self.max_per_minute,
            });
        }

        window.push_back(now);
        Ok(())
    }

    /// Calls recorded for `key` that are still inside the window as of `now`.
    pub async fn in_window(&self, key: &str, now: Instant) -> usize {
        let calls = self.calls.lock().await;
        calls.get(key).map_or(0, |window| {
            window.iter().filter(|&&t| now.saturating_duration_since(t) < RATE_WINDOW).count()
        })
    }
}

/// Fixed-capacity concurrency gate.
///
/// [`acquire`](Self::acquire) never waits: at capacity it fails immediately. This is an
/// admission decision, not a queue.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max: usize,
}

impl ConcurrencyLimiter {
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        Self { semaphore: Arc::new(Semaphore::new(max_concurrent)), max: max_concurrent }
    }

    /// Take a slot or fail with [`LimitError::ConcurrencyExhausted`].
    ///
    /// The slot is returned when the permit is dropped or [`released`](ConcurrencyPermit::release).
    pub fn acquire(&self) -> Result<ConcurrencyPermit, LimitError> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Ok(ConcurrencyPermit { _permit: permit }),
            Err(_) => {
                tracing::warn!(max = self.max, "Concurrency limit reached");
                Err(LimitError::ConcurrencyExhausted { max: self.max })
            }
        }
    }

    /// Pool capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.max
    }

    /// Slots currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// A held concurrency slot. Dropping it releases the slot exactly once.
#[must_use = "the slot is released as soon as the permit is dropped"]
#[derive(Debug)]
pub struct ConcurrencyPermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyPermit {
    /// Return the slot to the pool.
    pub fn release(self) {
        drop(self);
    }
}
