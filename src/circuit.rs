//! Per-agent circuit breaker (spec §4.4).
//!
//! One independent breaker per agent name, sharded behind a [`DashMap`] so
//! updates to different agents never contend on the same lock.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone)]
struct BreakerState {
    failure_count: u32,
    open_until: Option<Instant>,
}

impl Default for BreakerState {
    fn default() -> Self {
        Self {
            failure_count: 0,
            open_until: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitConfig {
    pub threshold: u32,
    pub recovery: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            recovery: Duration::from_secs(30),
        }
    }
}

/// Manager holding one [`BreakerState`] per agent.
pub struct CircuitBreakerManager {
    breakers: DashMap<String, BreakerState>,
    config: CircuitConfig,
}

impl CircuitBreakerManager {
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    /// `true` iff calls to `agent` are currently rejected locally. Clears an
    /// expired open window as a side effect, per spec.
    pub fn is_open(&self, agent: &str) -> bool {
        let mut entry = self.breakers.entry(agent.to_string()).or_default();
        match entry.open_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                entry.open_until = None;
                entry.failure_count = 0;
                false
            }
            None => false,
        }
    }

    pub fn record_success(&self, agent: &str) {
        let mut entry = self.breakers.entry(agent.to_string()).or_default();
        entry.failure_count = 0;
    }

    pub fn record_failure(&self, agent: &str) {
        let mut entry = self.breakers.entry(agent.to_string()).or_default();
        entry.failure_count += 1;
        if entry.failure_count >= self.config.threshold {
            entry.open_until = Some(Instant::now() + self.config.recovery);
            warn!(agent, failures = entry.failure_count, "circuit breaker tripped");
        }
    }
}

impl Default for CircuitBreakerManager {
    fn default() -> Self {
        Self::new(CircuitConfig::default())
    }
}
