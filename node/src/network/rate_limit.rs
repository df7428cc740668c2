//! Per-peer sliding-window rate limiting: a peer exceeding either cap has
//! its message dropped, not its connection closed.
//!
//! Deliberately plain: no IP bans, subnet tracking, or circuit breaker,
//! just the rolling one-second counter a message-flood topology needs.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Caps applied to every peer's inbound traffic within a rolling one-second
/// window.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_messages_per_second: u32,
    pub max_bytes_per_second: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_messages_per_second: 10,
            max_bytes_per_second: 1024 * 1024,
        }
    }
}

const WINDOW: Duration = Duration::from_secs(1);

/// Tracks one peer's recent message arrivals to enforce [`RateLimitConfig`].
#[derive(Debug, Default)]
pub struct RateLimiter {
    arrivals: VecDeque<(Instant, u64)>,
    bytes_in_window: u64,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an arriving message of `size_bytes` and reports whether it is
    /// within the configured caps. Always records the arrival, even when it
    /// is over the cap, so a flooding peer keeps tripping the limiter rather
    /// than resetting its window by going quiet.
    pub fn check(&mut self, size_bytes: u64, config: &RateLimitConfig, now: Instant) -> bool {
        self.evict_expired(now);

        let would_be_count = self.arrivals.len() as u32 + 1;
        let would_be_bytes = self.bytes_in_window + size_bytes;

        self.arrivals.push_back((now, size_bytes));
        self.bytes_in_window += size_bytes;

        would_be_count <= config.max_messages_per_second
            && would_be_bytes <= config.max_bytes_per_second
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(&(ts, size)) = self.arrivals.front() {
            if now.duration_since(ts) > WINDOW {
                self.arrivals.pop_front();
                self.bytes_in_window = self.bytes_in_window.saturating_sub(size);
            } else {
                break;
            }
        }
    }
}
