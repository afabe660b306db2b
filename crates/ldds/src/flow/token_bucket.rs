// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Token bucket rate limiter.
//!
//! Tokens (bytes) refill at a fixed rate up to a burst capacity. The
//! throughput controller peeks with [`has_tokens`](TokenBucket::has_tokens)
//! during admission and consumes on actual send.

use std::time::{Duration, Instant};

/// Byte-denominated token bucket.
#[derive(Debug)]
pub struct TokenBucket {
    tokens: u64,
    capacity: u64,
    rate_bps: u64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a bucket starting full.
    ///
    /// `rate_bps` is the refill rate in bytes per second; `capacity` bounds
    /// the burst size.
    #[must_use]
    pub fn new(rate_bps: u64, capacity: u64) -> Self {
        Self {
            tokens: capacity,
            capacity,
            rate_bps,
            last_refill: Instant::now(),
        }
    }

    /// Whether `bytes` tokens are available right now.
    pub fn has_tokens(&mut self, bytes: u64) -> bool {
        self.refill();
        self.tokens >= bytes
    }

    /// Consume up to `bytes`, clamping at zero.
    pub fn consume(&mut self, bytes: u64) {
        self.refill();
        self.tokens = self.tokens.saturating_sub(bytes);
    }

    /// Current token count.
    pub fn tokens(&mut self) -> u64 {
        self.refill();
        self.tokens
    }

    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    #[must_use]
    pub fn rate(&self) -> u64 {
        self.rate_bps
    }

    /// Change the refill rate, crediting time elapsed at the old rate first.
    pub fn set_rate(&mut self, rate_bps: u64) {
        self.refill();
        self.rate_bps = rate_bps;
    }

    /// How long until `bytes` tokens will be available.
    pub fn time_until_available(&mut self, bytes: u64) -> Duration {
        self.refill();
        if self.tokens >= bytes {
            return Duration::ZERO;
        }
        if self.rate_bps == 0 {
            // Never refills; report a far-off retry rather than dividing by 0
            return Duration::from_secs(3600);
        }
        let needed = bytes - self.tokens;
        Duration::from_secs_f64(needed as f64 / self.rate_bps as f64)
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        if elapsed.is_zero() {
            return;
        }
        let add = (elapsed.as_secs_f64() * self.rate_bps as f64) as u64;
        if add > 0 {
            self.tokens = (self.tokens + add).min(self.capacity);
            self.last_refill = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_starts_full() {
        let mut bucket = TokenBucket::new(1000, 500);
        assert_eq!(bucket.tokens(), 500);
        assert!(bucket.has_tokens(500));
        assert!(!bucket.has_tokens(501));
    }

    #[test]
    fn test_consume_clamps_at_zero() {
        let mut bucket = TokenBucket::new(1000, 100);
        bucket.consume(250);
        assert_eq!(bucket.tokens(), 0);
    }

    #[test]
    fn test_refills_over_time() {
        let mut bucket = TokenBucket::new(10_000, 1000);
        bucket.consume(1000);

        thread::sleep(Duration::from_millis(50));

        let tokens = bucket.tokens();
        assert!((300..=800).contains(&tokens), "tokens={}", tokens);
    }

    #[test]
    fn test_refill_capped_at_capacity() {
        let mut bucket = TokenBucket::new(1_000_000, 100);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(bucket.tokens(), 100);
    }

    #[test]
    fn test_time_until_available() {
        let mut bucket = TokenBucket::new(1000, 100);
        assert_eq!(bucket.time_until_available(100), Duration::ZERO);

        bucket.consume(100);
        let wait = bucket.time_until_available(50);
        assert!(wait > Duration::from_millis(30) && wait <= Duration::from_millis(80));
    }

    #[test]
    fn test_zero_rate_reports_far_retry() {
        let mut bucket = TokenBucket::new(0, 10);
        bucket.consume(10);
        assert!(bucket.time_until_available(1) >= Duration::from_secs(3600));
    }
}
