/// Rate limiting for the credential endpoints
///
/// One token bucket per client address. Buckets hold `requests_per_minute`
/// tokens and refill continuously at the same rate. A limit of 0 disables
/// rate limiting.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use crate::configuration::RateLimitSettings;
use crate::error::AppError;

/// Simple token bucket rate limiter implementation
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    capacity: u32,
    refill_rate: f64, // tokens per second
}

impl TokenBucket {
    fn new(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: capacity as f64,
            last_refill: now,
            capacity,
            refill_rate: capacity as f64 / 60.0,
        }
    }

    fn try_take_token(&mut self, now: Instant) -> bool {
        let elapsed_secs = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed_secs * self.refill_rate).min(self.capacity as f64);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn is_full(&self, now: Instant) -> bool {
        let elapsed_secs = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens + elapsed_secs * self.refill_rate >= self.capacity as f64
    }
}

/// Tracks request budgets per client address
pub struct RateLimiter {
    requests_per_minute: u32,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            requests_per_minute: settings.requests_per_minute,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Take one request from the budget of `address`
    pub fn check(&self, address: &str) -> Result<(), AppError> {
        self.check_at(address, Instant::now())
    }

    fn check_at(&self, address: &str, now: Instant) -> Result<(), AppError> {
        if self.requests_per_minute == 0 {
            return Ok(());
        }

        // A poisoned lock only means another request panicked mid-update
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());

        let bucket = buckets
            .entry(address.to_string())
            .or_insert_with(|| TokenBucket::new(self.requests_per_minute, now));

        if bucket.try_take_token(now) {
            Ok(())
        } else {
            tracing::warn!(client_address = %address, "Rate limit exceeded");
            Err(AppError::RateLimited(format!(
                "Rate limit exceeded: max {} requests per minute",
                self.requests_per_minute
            )))
        }
    }

    /// Drop buckets that have refilled completely. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let before = buckets.len();
        buckets.retain(|_, bucket| !bucket.is_full(now));
        before - buckets.len()
    }
}
