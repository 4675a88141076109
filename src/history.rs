//! Bounded, time-ordered record of recent failures.
//!
//! Capacity equals `max_failures`. Once full, each insertion evicts the oldest
//! timestamp, so the window is always measured across the *retained* entries
//! only. A burst spread over more than the rolling window can therefore push
//! out the timestamps that would have shown it to be too slow to trip.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct FailureHistory {
    entries: Mutex<VecDeque<Instant>>,
    capacity: usize,
}

impl FailureHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Record a failure. Evicts the oldest entry when at capacity.
    pub fn add(&self, at: Instant) {
        let mut entries = self.entries.lock();
        entries.push_back(at);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn count(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Span between the oldest and newest retained failure, `None` when empty.
    pub fn current_window(&self) -> Option<Duration> {
        let entries = self.entries.lock();
        match (entries.front(), entries.back()) {
            (Some(oldest), Some(newest)) => Some(newest.saturating_duration_since(*oldest)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_history_has_no_window() {
        let history = FailureHistory::new(3);
        assert_eq!(history.count(), 0);
        assert_eq!(history.current_window(), None);
    }

    #[test]
    fn single_entry_has_zero_window() {
        let history = FailureHistory::new(3);
        history.add(Instant::now());
        assert_eq!(history.current_window(), Some(Duration::ZERO));
    }

    #[test]
    fn window_spans_oldest_to_newest() {
        let history = FailureHistory::new(3);
        let base = Instant::now();
        history.add(base);
        history.add(base + Duration::from_millis(400));
        history.add(base + Duration::from_millis(900));
        assert_eq!(history.current_window(), Some(Duration::from_millis(900)));
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let history = FailureHistory::new(2);
        let base = Instant::now();
        history.add(base);
        history.add(base + Duration::from_secs(1));
        history.add(base + Duration::from_secs(5));

        assert_eq!(history.count(), 2);
        // The entry at `base` is gone; the window now starts at +1s.
        assert_eq!(history.current_window(), Some(Duration::from_secs(4)));
    }

    #[test]
    fn clear_empties() {
        let history = FailureHistory::new(2);
        history.add(Instant::now());
        history.clear();
        assert_eq!(history.count(), 0);
        assert_eq!(history.current_window(), None);
        assert_eq!(history.capacity(), 2);
    }

    #[test]
    fn concurrent_adds_never_exceed_capacity() {
        let history = std::sync::Arc::new(FailureHistory::new(4));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let history = history.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        history.add(Instant::now());
                        assert!(history.count() <= 4);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(history.count(), 4);
    }
}
