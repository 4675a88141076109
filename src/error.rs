//! Error types.

use serde::Serialize;
use thiserror::Error;

/// Why a guarded call did not complete normally. Passed to the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakerError {
    /// The command did not report back within the configured timeout, or it
    /// returned an error.
    #[error("guarded call timed out")]
    Timeout,
    /// The circuit was open; the command was never executed.
    #[error("circuit open, failing fast")]
    FastFail,
}

/// Errors raised while building a breaker.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_failures must be at least 1")]
    ZeroMaxFailures,
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
    #[error("bulkhead_limit {0} exceeds the maximum number of semaphore permits")]
    BulkheadLimitTooLarge(usize),
    #[error("circuit breaker must be created inside a Tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaker_error_serialises_lowercase() {
        assert_eq!(
            serde_json::to_string(&BreakerError::FastFail).unwrap(),
            r#""fastfail""#
        );
        assert_eq!(
            serde_json::to_string(&BreakerError::Timeout).unwrap(),
            r#""timeout""#
        );
    }

    #[test]
    fn no_runtime_is_reported() {
        let err: ConfigError = tokio::runtime::Handle::try_current().unwrap_err().into();
        assert!(err.to_string().starts_with("circuit breaker must be created inside"));
    }
}
