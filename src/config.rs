//! Configuration for the circuit breaker.

use crate::error::ConfigError;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Tuning for a single [`CircuitBreaker`](crate::CircuitBreaker).
///
/// Build with [`BreakerConfig::builder()`] or start from [`Default`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Name attached to every log line emitted by the breaker.
    ///
    /// Default: `"circuit-breaker"`.
    pub name: String,

    /// Maximum time one invocation may take before it is treated as a failure.
    ///
    /// Default: 1 second.
    pub timeout: Duration,

    /// How long the breaker stays open before it moves to half-open.
    ///
    /// Default: 60 seconds.
    pub reset_timeout: Duration,

    /// Failures needed to trip the circuit. Also the capacity of the failure
    /// history.
    ///
    /// Default: 5.
    pub max_failures: usize,

    /// Span within which `max_failures` failures must fall to trip the circuit.
    ///
    /// Default: 10 seconds.
    pub rolling_window: Duration,

    /// Maximum number of guarded commands executing at once. `0` disables the
    /// bulkhead and runs every command on the caller's task.
    ///
    /// Default: 0.
    pub bulkhead_limit: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            name: "circuit-breaker".to_string(),
            timeout: Duration::from_millis(1_000),
            reset_timeout: Duration::from_millis(60_000),
            max_failures: 5,
            rolling_window: Duration::from_millis(10_000),
            bulkhead_limit: 0,
        }
    }
}

impl BreakerConfig {
    /// Start building a config with the defaults above.
    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder::default()
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.max_failures == 0 {
            return Err(ConfigError::ZeroMaxFailures);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.bulkhead_limit > Semaphore::MAX_PERMITS {
            return Err(ConfigError::BulkheadLimitTooLarge(self.bulkhead_limit));
        }
        Ok(())
    }
}

/// Builder for [`BreakerConfig`].
#[derive(Debug, Default)]
pub struct BreakerConfigBuilder {
    inner: BreakerConfig,
}

impl BreakerConfigBuilder {
    /// Name used in log output.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.inner.name = name.into();
        self
    }

    /// Per-invocation timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.inner.timeout = timeout;
        self
    }

    /// Cooldown before an open circuit goes half-open.
    pub fn reset_timeout(mut self, reset_timeout: Duration) -> Self {
        self.inner.reset_timeout = reset_timeout;
        self
    }

    /// Failure threshold (and failure history capacity).
    pub fn max_failures(mut self, max_failures: usize) -> Self {
        self.inner.max_failures = max_failures;
        self
    }

    /// Window the threshold failures must fall within.
    pub fn rolling_window(mut self, rolling_window: Duration) -> Self {
        self.inner.rolling_window = rolling_window;
        self
    }

    /// Concurrency cap; `0` disables bulkheading.
    pub fn bulkhead_limit(mut self, limit: usize) -> Self {
        self.inner.bulkhead_limit = limit;
        self
    }

    /// Consume the builder and return the validated config.
    pub fn build(self) -> Result<BreakerConfig, ConfigError> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}

/// On-disk shape: durations are plain millisecond integers.
#[derive(Deserialize)]
#[serde(default)]
struct RawConfig {
    name: String,
    timeout_ms: u64,
    reset_timeout_ms: u64,
    max_failures: usize,
    rolling_window_ms: u64,
    bulkhead_limit: usize,
}

impl Default for RawConfig {
    fn default() -> Self {
        let d = BreakerConfig::default();
        Self {
            name: d.name,
            timeout_ms: d.timeout.as_millis() as u64,
            reset_timeout_ms: d.reset_timeout.as_millis() as u64,
            max_failures: d.max_failures,
            rolling_window_ms: d.rolling_window.as_millis() as u64,
            bulkhead_limit: d.bulkhead_limit,
        }
    }
}

impl<'de> Deserialize<'de> for BreakerConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawConfig::deserialize(deserializer)?;
        let config = BreakerConfig {
            name: raw.name,
            timeout: Duration::from_millis(raw.timeout_ms),
            reset_timeout: Duration::from_millis(raw.reset_timeout_ms),
            max_failures: raw.max_failures,
            rolling_window: Duration::from_millis(raw.rolling_window_ms),
            bulkhead_limit: raw.bulkhead_limit,
        };
        config.validate().map_err(serde::de::Error::custom)?;
        Ok(config)
    }
}
