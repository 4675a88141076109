//! Per-call handle for context-style commands.

use crate::breaker::Core;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::trace;

/// Resolution guard shared by one call's executor and its timeout watchdog.
///
/// `completed` is claimed with a swap, so exactly one side ever resolves the
/// call; the loser's report is dropped.
#[derive(Debug)]
pub(crate) struct CallGuard {
    completed: AtomicBool,
    timed_out: AtomicBool,
    submitted_at: Instant,
    watchdog: Mutex<Option<AbortHandle>>,
}

impl CallGuard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            completed: AtomicBool::new(false),
            timed_out: AtomicBool::new(false),
            submitted_at: Instant::now(),
            watchdog: Mutex::new(None),
        })
    }

    /// `true` for the first caller only.
    pub fn try_complete(&self) -> bool {
        !self.completed.swap(true, Ordering::AcqRel)
    }

    pub fn set_timed_out(&self) {
        self.timed_out.store(true, Ordering::Release);
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub fn is_timed_out(&self) -> bool {
        self.timed_out.load(Ordering::Acquire)
    }

    pub fn elapsed(&self) -> Duration {
        self.submitted_at.elapsed()
    }

    pub fn arm_watchdog(&self, handle: AbortHandle) {
        *self.watchdog.lock() = Some(handle);
    }

    /// Stop the watchdog once the call has resolved on its own.
    pub fn disarm_watchdog(&self) {
        if let Some(handle) = self.watchdog.lock().take() {
            handle.abort();
        }
    }
}

/// Token handed to a context command. The command calls
/// [`notify_success`](Self::notify_success) or
/// [`notify_failure`](Self::notify_failure) once it knows the outcome.
///
/// Only the first report counts. Reports after the timeout fired, or after an
/// earlier report, are ignored. The handle holds a weak reference to its
/// breaker, so it never keeps a dropped breaker alive.
pub struct Invocation<A> {
    args: A,
    call: Arc<CallGuard>,
    breaker: Weak<Core>,
}

impl<A> Invocation<A> {
    pub(crate) fn new(args: A, call: Arc<CallGuard>, breaker: Weak<Core>) -> Self {
        Self {
            args,
            call,
            breaker,
        }
    }

    /// Arguments passed to `run`.
    pub fn args(&self) -> &A {
        &self.args
    }

    /// Whether this call has already been resolved, by a report or a timeout.
    pub fn is_completed(&self) -> bool {
        self.call.is_completed()
    }

    /// Whether the timeout fired before the command reported.
    pub fn is_timed_out(&self) -> bool {
        self.call.is_timed_out()
    }

    pub fn notify_success(&self) {
        self.report(true);
    }

    pub fn notify_failure(&self) {
        self.report(false);
    }

    fn report(&self, success: bool) {
        if self.call.is_timed_out() {
            trace!(success, "Invocation already timed out; ignoring report");
            return;
        }
        if !self.call.try_complete() {
            trace!(success, "Invocation already reported; ignoring duplicate");
            return;
        }
        self.call.disarm_watchdog();

        if let Some(core) = self.breaker.upgrade() {
            core.record_outcome(&self.call, success);
        }
    }
}

impl<A: std::fmt::Debug> std::fmt::Debug for Invocation<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("args", &self.args)
            .field("completed", &self.is_completed())
            .field("timed_out", &self.is_timed_out())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_is_claimed_once() {
        let guard = CallGuard::new();
        assert!(!guard.is_completed());
        assert!(guard.try_complete());
        assert!(!guard.try_complete());
        assert!(guard.is_completed());
    }

    #[test]
    fn guard_is_claimed_once_across_threads() {
        let guard = CallGuard::new();
        let winners: usize = (0..8)
            .map(|_| {
                let guard = guard.clone();
                std::thread::spawn(move || guard.try_complete())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|t| usize::from(t.join().unwrap()))
            .sum();
        assert_eq!(winners, 1);
    }

    #[test]
    fn report_without_breaker_only_marks_completed() {
        let invocation = Invocation::new(7u32, CallGuard::new(), Weak::new());
        assert_eq!(*invocation.args(), 7);
        invocation.notify_success();
        assert!(invocation.is_completed());
        assert!(!invocation.is_timed_out());
    }

    #[test]
    fn report_after_timeout_is_ignored() {
        let call = CallGuard::new();
        assert!(call.try_complete());
        call.set_timed_out();

        let invocation = Invocation::new((), call, Weak::new());
        invocation.notify_failure();
        assert!(invocation.is_timed_out());
        assert!(invocation.is_completed());
    }
}
