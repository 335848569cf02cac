//! Retry policy with capped exponential backoff and jitter

use crate::config::retry;
use crate::config::ConfigError;

/// Retry policy for one transmission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u32,
    pub multiplier: u32,
    pub max_delay_ms: u32,
    /// +/- percent applied to every delay
    pub jitter_percent: u8,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: retry::MAX_ATTEMPTS,
            base_delay_ms: retry::BASE_DELAY_MS,
            multiplier: retry::MULTIPLIER,
            max_delay_ms: retry::MAX_DELAY_MS,
            jitter_percent: retry::JITTER_PERCENT,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0
            || self.base_delay_ms == 0
            || self.multiplier == 0
            || self.max_delay_ms < self.base_delay_ms
            || self.jitter_percent > 100
        {
            return Err(ConfigError::InvalidRetryPolicy);
        }
        Ok(())
    }

    /// Delay after failed attempt `attempt` (1-based), before jitter
    pub fn base_delay(&self, attempt: u8) -> u32 {
        let exponent = attempt.saturating_sub(1) as u32;
        let factor = self.multiplier.saturating_pow(exponent);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }
}

/// Delay generator: policy plus a seeded jitter source
pub struct Backoff {
    policy: RetryPolicy,
    rng: fastrand::Rng,
}

impl Backoff {
    pub fn new(policy: RetryPolicy, seed: u64) -> Self {
        Self {
            policy,
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Jittered delay after failed attempt `attempt`
    pub fn delay(&mut self, attempt: u8) -> u32 {
        let base = self.policy.base_delay(attempt) as u64;
        let span = base * self.policy.jitter_percent as u64 / 100;
        if span == 0 {
            return base as u32;
        }
        (base - span + self.rng.u64(0..=span * 2)).min(u32::MAX as u64) as u32
    }
}
