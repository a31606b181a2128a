//! Per-key exponential backoff with jitter for controller error policies.
//!
//! kube-rs controllers call their error policy with the failed object but keep
//! no failure history. [`FailureTracker`] counts consecutive failures per
//! object key so the requeue delay grows with each failed attempt and resets
//! once the object reconciles cleanly.

use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;

/// Backoff curve for failed reconciliations
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound for any delay, before jitter
    pub max_delay: Duration,
    /// Multiplier applied per consecutive failure
    pub backoff_multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            backoff_multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Delay before retrying after `failures` consecutive failures, without jitter
    ///
    /// `failures` counts the failure being handled, so the first failure maps
    /// to `initial_delay`.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }

    /// Apply jitter: 0.5x to 1.5x of the delay
    pub fn jittered(&self, delay: Duration) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_secs_f64(delay.as_secs_f64() * jitter)
    }
}

/// Consecutive failure counts keyed by object reference
#[derive(Debug, Default)]
pub struct FailureTracker {
    config: BackoffConfig,
    failures: DashMap<String, u32>,
}

impl FailureTracker {
    /// Create a tracker with the given backoff curve
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            failures: DashMap::new(),
        }
    }

    /// Record a failure for `key` and return the jittered delay before the retry
    pub fn record_failure(&self, key: &str) -> Duration {
        let count = {
            let mut entry = self.failures.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(1);
            *entry
        };
        self.config.jittered(self.config.delay_for(count))
    }

    /// Forget the failure history of `key` after a successful reconciliation
    pub fn reset(&self, key: &str) {
        self.failures.remove(key);
    }

    /// Current consecutive failure count for `key`
    pub fn failures(&self, key: &str) -> u32 {
        self.failures.get(key).map(|c| *c).unwrap_or(0)
    }
}
