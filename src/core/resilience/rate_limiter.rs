//! Token bucket rate limiter
//!
//! Bounds the rate of outbound calls to the document service. Tokens refill
//! lazily from elapsed time whenever the bucket is inspected; callers that
//! find the bucket empty queue up in arrival order and the head of the queue
//! sleeps until the next token is due.

use crate::config::RateLimitSettings;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

// absorbs float drift from fractional refills
const TOKEN_EPSILON: f64 = 1e-9;

/// Rate limiter configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    /// Sustained refill rate
    pub requests_per_second: f64,
    /// Bucket capacity
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 2.0,
            burst_size: 5,
        }
    }
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            requests_per_second: settings.requests_per_second,
            burst_size: settings.burst_size,
        }
    }
}

/// Snapshot of the limiter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiterStatus {
    /// Tokens currently available (fractional while refilling)
    pub available_tokens: f64,
    /// Callers waiting for a token
    pub queue_length: usize,
    /// Bucket capacity
    pub burst_size: u32,
    /// Refill rate
    pub requests_per_second: f64,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, config: &RateLimitConfig) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * config.requests_per_second)
            .min(f64::from(config.burst_size));
        self.last_refill = now;
    }
}

/// Keeps the queue depth accurate even if a waiting future is dropped
struct QueuedWaiter<'a>(&'a AtomicUsize);

impl<'a> QueuedWaiter<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for QueuedWaiter<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Token bucket rate limiter
///
/// ```no_run
/// use quip_export::core::resilience::{RateLimitConfig, RateLimiter};
///
/// # async fn example() {
/// let limiter = RateLimiter::new(RateLimitConfig { requests_per_second: 2.0, burst_size: 5 });
/// limiter.wait_for_permission().await;
/// // call the remote API
/// # }
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    bucket: Mutex<Bucket>,
    // tokio's mutex is fair, so acquiring it is the FIFO queue
    queue: tokio::sync::Mutex<()>,
    waiting: AtomicUsize,
}

impl RateLimiter {
    /// Create a limiter with a full bucket
    pub fn new(config: RateLimitConfig) -> Self {
        let config = RateLimitConfig {
            requests_per_second: if config.requests_per_second > 0.0 {
                config.requests_per_second
            } else {
                1.0
            },
            burst_size: config.burst_size.max(1),
        };

        Self {
            bucket: Mutex::new(Bucket {
                tokens: f64::from(config.burst_size),
                last_refill: Instant::now(),
            }),
            config,
            queue: tokio::sync::Mutex::new(()),
            waiting: AtomicUsize::new(0),
        }
    }

    /// Limiter configuration
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Wait until a token is available, then consume it
    pub async fn wait_for_permission(&self) {
        let _waiter = QueuedWaiter::enter(&self.waiting);
        let _turn = self.queue.lock().await;

        loop {
            let wait = {
                let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
                bucket.refill(&self.config);
                if bucket.tokens + TOKEN_EPSILON >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - bucket.tokens;
                    Some(Duration::from_secs_f64(
                        deficit / self.config.requests_per_second,
                    ))
                }
            };

            match wait {
                None => break,
                Some(delay) => {
                    tracing::trace!(
                        delay_ms = delay.as_millis() as u64,
                        "Rate limiter waiting for token"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Take a token without waiting
    ///
    /// Returns false when the bucket is empty or other callers are queued.
    pub fn try_acquire(&self) -> bool {
        if self.waiting.load(Ordering::SeqCst) > 0 {
            return false;
        }
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.refill(&self.config);
        if bucket.tokens + TOKEN_EPSILON >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Current tokens and queue depth
    pub fn get_status(&self) -> RateLimiterStatus {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.refill(&self.config);
        RateLimiterStatus {
            available_tokens: bucket.tokens,
            queue_length: self.waiting.load(Ordering::SeqCst),
            burst_size: self.config.burst_size,
            requests_per_second: self.config.requests_per_second,
        }
    }
}
