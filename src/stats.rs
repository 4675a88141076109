//! Request outcome counters.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Monotonic counters plus observed latencies. Safe to update from any number
/// of in-flight calls; counters are not ordered relative to state transitions.
#[derive(Debug, Default)]
pub struct Stats {
    timeouts: AtomicU64,
    successful_responses: AtomicU64,
    failed_responses: AtomicU64,
    total_requests: AtomicU64,
    rejected_requests: AtomicU64,
    latencies: Mutex<Vec<Duration>>,
}

impl Stats {
    pub fn track_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn track_successful_response(&self) {
        self.successful_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn track_failed_response(&self) {
        self.failed_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn track_rejected(&self) {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn track_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn track_latency(&self, latency: Duration) {
        self.latencies.lock().push(latency);
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub fn successful_responses(&self) -> u64 {
        self.successful_responses.load(Ordering::Relaxed)
    }

    pub fn failed_responses(&self) -> u64 {
        self.failed_responses.load(Ordering::Relaxed)
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn rejected_requests(&self) -> u64 {
        self.rejected_requests.load(Ordering::Relaxed)
    }

    pub fn latencies(&self) -> Vec<Duration> {
        self.latencies.lock().clone()
    }

    pub fn total_latency(&self) -> Duration {
        self.latencies.lock().iter().sum()
    }

    /// Mean of the recorded latencies, zero when none were recorded.
    pub fn average_response_time(&self) -> Duration {
        let latencies = self.latencies.lock();
        if latencies.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = latencies.iter().sum();
        let mean = total.as_nanos() / latencies.len() as u128;
        Duration::from_nanos(u64::try_from(mean).unwrap_or(u64::MAX))
    }

    /// Requests that have been admitted but not yet resolved.
    pub fn concurrent_requests(&self) -> u64 {
        let resolved = self.successful_responses()
            + self.failed_responses()
            + self.rejected_requests();
        self.total_requests().saturating_sub(resolved)
    }

    pub fn reset(&self) {
        self.timeouts.store(0, Ordering::Relaxed);
        self.successful_responses.store(0, Ordering::Relaxed);
        self.failed_responses.store(0, Ordering::Relaxed);
        self.total_requests.store(0, Ordering::Relaxed);
        self.rejected_requests.store(0, Ordering::Relaxed);
        self.latencies.lock().clear();
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_requests: self.total_requests(),
            concurrent_requests: self.concurrent_requests(),
            rejected_requests: self.rejected_requests(),
            successful_responses: self.successful_responses(),
            failed_responses: self.failed_responses(),
            timeouts: self.timeouts(),
            average_response_time: self.average_response_time(),
            total_latency: self.total_latency(),
        }
    }
}

/// Point-in-time copy of [`Stats`], suitable for logging or serving to
/// operational tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub concurrent_requests: u64,
    pub rejected_requests: u64,
    pub successful_responses: u64,
    pub failed_responses: u64,
    pub timeouts: u64,
    #[serde(rename = "average_response_time_ms", serialize_with = "as_millis")]
    pub average_response_time: Duration,
    #[serde(rename = "total_latency_ms", serialize_with = "as_millis")]
    pub total_latency: Duration,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let stats = Stats::default();
        let snap = stats.snapshot();
        assert_eq!(snap.total_requests, 0);
        assert_eq!(snap.concurrent_requests, 0);
        assert_eq!(snap.average_response_time, Duration::ZERO);
        assert_eq!(snap.total_latency, Duration::ZERO);
    }

    #[test]
    fn concurrent_requests_is_unresolved_remainder() {
        let stats = Stats::default();
        for _ in 0..5 {
            stats.track_request();
        }
        stats.track_successful_response();
        stats.track_failed_response();
        stats.track_rejected();
        assert_eq!(stats.concurrent_requests(), 2);
    }

    #[test]
    fn average_response_time_is_mean() {
        let stats = Stats::default();
        stats.track_latency(Duration::from_millis(100));
        stats.track_latency(Duration::from_millis(300));
        assert_eq!(stats.total_latency(), Duration::from_millis(400));
        assert_eq!(stats.average_response_time(), Duration::from_millis(200));
        assert_eq!(stats.latencies().len(), 2);
    }

    #[test]
    fn reset_clears_everything() {
        let stats = Stats::default();
        stats.track_request();
        stats.track_timeouts();
        stats.track_failed_response();
        stats.track_latency(Duration::from_millis(10));
        stats.reset();
        assert_eq!(stats.snapshot(), Stats::default().snapshot());
        assert!(stats.latencies().is_empty());
    }

    #[test]
    fn snapshot_serialises_durations_as_millis() {
        let stats = Stats::default();
        stats.track_request();
        stats.track_successful_response();
        stats.track_latency(Duration::from_millis(42));

        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["total_requests"], 1);
        assert_eq!(json["successful_responses"], 1);
        assert_eq!(json["average_response_time_ms"], 42);
        assert_eq!(json["total_latency_ms"], 42);
    }

    #[test]
    fn tracking_is_thread_safe() {
        let stats = std::sync::Arc::new(Stats::default());
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        stats.track_request();
                        stats.track_successful_response();
                        stats.track_latency(Duration::from_millis(1));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(stats.total_requests(), 1_000);
        assert_eq!(stats.successful_responses(), 1_000);
        assert_eq!(stats.concurrent_requests(), 0);
        assert_eq!(stats.latencies().len(), 1_000);
    }
}
