//! Per-sender rate limiting for inbound consensus messages.
//!
//! Only senders whose envelope signature verified get a bucket of their own.
//! Everything else (unknown senders, forged or corrupt envelopes) shares one
//! bucket, so traffic claiming to be validator X can never drain X's bucket.

use spos_types::ValidatorId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Configuration for rate limiting.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum messages per second for each verified validator.
    pub validator_messages_per_sec: u32,
    /// Maximum messages per second across all unverified traffic.
    pub unverified_messages_per_sec: u32,
    /// Maximum burst size (bucket capacity) for each verified validator.
    pub validator_burst: u32,
    /// Maximum burst size of the shared unverified bucket.
    pub unverified_burst: u32,
    /// How long to track a sender after their last message.
    pub sender_ttl: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            // A validator sends a handful of messages per round; the burst
            // absorbs rebroadcasts during extensions.
            validator_messages_per_sec: 50,
            validator_burst: 100,
            unverified_messages_per_sec: 20,
            unverified_burst: 40,
            sender_ttl: Duration::from_secs(300),
        }
    }
}

/// Token bucket state for a single sender.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    /// Tokens added per second.
    refill_rate: f64,
    last_update: Instant,
    last_message: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, refill_rate: u32) -> Self {
        let now = Instant::now();
        Self {
            tokens: capacity as f64,
            capacity: capacity as f64,
            refill_rate: refill_rate as f64,
            last_update: now,
            last_message: now,
        }
    }

    /// Try to consume one token. Returns true if allowed.
    fn try_consume(&mut self) -> bool {
        let now = Instant::now();

        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_update = now;
        self.last_message = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn is_stale(&self, ttl: Duration) -> bool {
        self.last_message.elapsed() > ttl
    }
}

/// Per-sender rate limiter using token buckets.
pub struct SenderRateLimiter {
    config: RateLimitConfig,
    buckets: HashMap<ValidatorId, TokenBucket>,
    unverified: TokenBucket,
    last_cleanup: Instant,
}

impl SenderRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            unverified: TokenBucket::new(
                config.unverified_burst,
                config.unverified_messages_per_sec,
            ),
            config,
            buckets: HashMap::new(),
            last_cleanup: Instant::now(),
        }
    }

    /// Charge `sender`, whose envelope signature has been verified.
    pub fn check_verified(&mut self, sender: ValidatorId) -> bool {
        if self.last_cleanup.elapsed() > Duration::from_secs(60) {
            self.cleanup();
        }

        let config = &self.config;
        self.buckets
            .entry(sender)
            .or_insert_with(|| {
                TokenBucket::new(config.validator_burst, config.validator_messages_per_sec)
            })
            .try_consume()
    }

    /// Charge the bucket shared by all traffic that failed authentication.
    pub fn check_unverified(&mut self) -> bool {
        self.unverified.try_consume()
    }

    /// Remove stale entries to bound memory.
    fn cleanup(&mut self) {
        let ttl = self.config.sender_ttl;
        self.buckets.retain(|_, bucket| !bucket.is_stale(ttl));
        self.last_cleanup = Instant::now();
    }

    pub fn tracked_sender_count(&self) -> usize {
        self.buckets.len()
    }
}
