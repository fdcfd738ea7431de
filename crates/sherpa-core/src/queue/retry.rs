//! Retry policy: decides whether a failed attempt is retried and how long
//! the queue waits before redelivering it.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Exponent ceiling for the backoff computation. `2^1023` is the largest
/// finite power of two in an `f64`; anything past it is capped anyway.
const MAX_EXPONENT: u32 = 1023;

/// Raw, unvalidated retry settings as they appear in task declarations and
/// on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Upper bound on the attempt count before the task is abandoned.
    pub max_retries: u32,

    /// Unscaled delay in seconds.
    pub base_delay_secs: f64,

    /// Upper bound on any computed delay, in seconds.
    pub backoff_cap_secs: f64,

    /// Full jitter: draw the real delay uniformly from `[0, delay]`.
    pub jitter: bool,
}

impl RetryConfig {
    pub const fn new(max_retries: u32, base_delay_secs: f64, backoff_cap_secs: f64) -> Self {
        Self {
            max_retries,
            base_delay_secs,
            backoff_cap_secs,
            jitter: true,
        }
    }

    pub const fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn validate(self) -> Result<RetryPolicy, ConfigError> {
        RetryPolicy::try_from(self)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3, 1.0, 60.0)
    }
}

/// Validated retry policy.
///
/// Built from a [`RetryConfig`]; construction rejects negative, NaN and
/// infinite delays so a bad policy never reaches the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RetryConfig", into = "RetryConfig")]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    backoff_cap: Duration,
    jitter: bool,
}

impl TryFrom<RetryConfig> for RetryPolicy {
    type Error = ConfigError;

    fn try_from(config: RetryConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            max_retries: config.max_retries,
            base_delay: seconds("base_delay", config.base_delay_secs)?,
            backoff_cap: seconds("backoff_cap", config.backoff_cap_secs)?,
            jitter: config.jitter,
        })
    }
}

impl From<RetryPolicy> for RetryConfig {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            max_retries: policy.max_retries,
            base_delay_secs: policy.base_delay.as_secs_f64(),
            backoff_cap_secs: policy.backoff_cap.as_secs_f64(),
            jitter: policy.jitter,
        }
    }
}

fn seconds(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::InvalidDelay { field, value });
    }
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidDelay { field, value })
}

impl RetryPolicy {
    pub fn new(
        max_retries: u32,
        base_delay: Duration,
        backoff_cap: Duration,
        jitter: bool,
    ) -> Self {
        Self {
            max_retries,
            base_delay,
            backoff_cap,
            jitter,
        }
    }

    /// A policy under which the first failure is terminal.
    pub fn no_retries() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO, false)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn backoff_cap(&self) -> Duration {
        self.backoff_cap
    }

    pub fn jitter_enabled(&self) -> bool {
        self.jitter
    }

    /// Whether a failure at `attempt_count` gets another delivery.
    pub fn should_retry(&self, attempt_count: u32) -> bool {
        attempt_count < self.max_retries
    }

    /// Capped exponential delay before jitter:
    /// `min(backoff_cap, base_delay * 2^attempt_count)`.
    ///
    /// With base_delay=1s, backoff_cap=60s:
    /// - attempt 0: 1s
    /// - attempt 1: 2s
    /// - attempt 2: 4s
    /// - attempt 6: 60s (64s capped)
    pub fn nominal_delay(&self, attempt_count: u32) -> Duration {
        let exponent = attempt_count.min(MAX_EXPONENT) as i32;
        let scaled = self.base_delay.as_secs_f64() * 2f64.powi(exponent);
        if scaled >= self.backoff_cap.as_secs_f64() {
            self.backoff_cap
        } else {
            Duration::from_secs_f64(scaled)
        }
    }

    /// Delay actually used for the next delivery, drawing from `rng` when
    /// jitter is enabled.
    pub fn sample_delay<R: Rng + ?Sized>(&self, attempt_count: u32, rng: &mut R) -> Duration {
        let nominal = self.nominal_delay(attempt_count);
        if !self.jitter || nominal.is_zero() {
            return nominal;
        }
        let drawn = rng.gen_range(0.0..=nominal.as_secs_f64());
        Duration::from_secs_f64(drawn).min(nominal)
    }

    /// [`sample_delay`](Self::sample_delay) with the thread-local RNG.
    pub fn next_delay(&self, attempt_count: u32) -> Duration {
        self.sample_delay(attempt_count, &mut rand::thread_rng())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(60), true)
    }
}
