//! Sliding per-sender rate limiter (spec §4.8).

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

const WINDOW_SECS: i64 = 60;

#[derive(Default)]
struct Window(BTreeMap<i64, u32>);

pub struct RateLimiter {
    windows: DashMap<String, Window>,
    limit_per_second: u32,
}

impl RateLimiter {
    pub fn new(limit_per_second: u32) -> Self {
        Self {
            windows: DashMap::new(),
            limit_per_second,
        }
    }

    /// `true` if the sender may proceed. Unknown senders share the
    /// `"unknown"` bucket.
    pub fn admit(&self, sender_id: &str) -> bool {
        let sender_id = if sender_id.is_empty() { "unknown" } else { sender_id };
        let now = now_secs();
        let window_start = now - WINDOW_SECS;

        let mut entry = self.windows.entry(sender_id.to_string()).or_default();
        entry.0.retain(|ts, _| *ts >= window_start);

        let total: u32 = entry.0.values().sum();
        let capacity = self.limit_per_second * WINDOW_SECS as u32;
        if total >= capacity {
            return false;
        }

        *entry.0.entry(now).or_insert(0) += 1;
        true
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_capacity_then_rejects() {
        let limiter = RateLimiter::new(2); // 2/s * 60s window = 120 capacity
        for _ in 0..120 {
            assert!(limiter.admit("u1"));
        }
        assert!(!limiter.admit("u1"));
    }

    #[test]
    fn senders_are_independent() {
        let limiter = RateLimiter::new(1);
        for _ in 0..60 {
            assert!(limiter.admit("u1"));
        }
        assert!(!limiter.admit("u1"));
        assert!(limiter.admit("u2"));
    }

    #[test]
    fn unknown_sender_shares_bucket() {
        let limiter = RateLimiter::new(1);
        for _ in 0..60 {
            assert!(limiter.admit(""));
        }
        assert!(!limiter.admit("unknown"));
    }
}
