//! Concurrency limiter for guarded commands.
//!
//! Tasks are accepted in submission order by a single admission worker. The
//! worker waits for a permit before handing each task to the runtime, so it is
//! the admission queue that blocks when the limit is saturated, never the
//! submitting caller. The permit is released when the task finishes.

use crate::command::BoxFuture;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Semaphore};
use tracing::warn;

#[derive(Debug)]
pub struct Bulkhead {
    limit: usize,
    permits: Arc<Semaphore>,
    queued: Arc<AtomicUsize>,
    admission: mpsc::UnboundedSender<BoxFuture<()>>,
}

impl Bulkhead {
    /// Create a bulkhead allowing `limit` tasks at once. The admission worker
    /// runs on `runtime` and stops when the bulkhead is dropped.
    pub fn new(limit: usize, runtime: &Handle) -> Self {
        let permits = Arc::new(Semaphore::new(limit));
        let queued = Arc::new(AtomicUsize::new(0));
        let (admission, rx) = mpsc::unbounded_channel();

        runtime.spawn(admit(rx, permits.clone(), queued.clone(), runtime.clone()));

        Self {
            limit,
            permits,
            queued,
            admission,
        }
    }

    /// Submit a task. Returns immediately; the task runs once a slot frees.
    pub fn enqueue<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.queued.fetch_add(1, Ordering::AcqRel);
        if self.admission.send(Box::pin(task)).is_err() {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            warn!("Bulkhead admission worker has stopped; dropping task");
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Tasks currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.limit - self.permits.available_permits()
    }

    /// Tasks submitted but not yet admitted.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }
}

async fn admit(
    mut rx: mpsc::UnboundedReceiver<BoxFuture<()>>,
    permits: Arc<Semaphore>,
    queued: Arc<AtomicUsize>,
    runtime: Handle,
) {
    while let Some(task) = rx.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        queued.fetch_sub(1, Ordering::AcqRel);
        runtime.spawn(async move {
            task.await;
            drop(permit);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_limit() {
        let bulkhead = Bulkhead::new(3, &Handle::current());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let running = running.clone();
            let peak = peak.clone();
            let done = done.clone();
            bulkhead.enqueue(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(done.load(Ordering::SeqCst), 20);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(bulkhead.in_flight(), 0);
        assert_eq!(bulkhead.queued(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn admits_in_submission_order() {
        let bulkhead = Bulkhead::new(1, &Handle::current());
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = order.clone();
            bulkhead.enqueue(async move {
                order.lock().await.push(i);
                tokio::time::sleep(Duration::from_millis(10)).await;
            });
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*order.lock().await, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn reports_queue_depth_while_saturated() {
        let bulkhead = Bulkhead::new(1, &Handle::current());
        for _ in 0..3 {
            bulkhead.enqueue(async {
                tokio::time::sleep(Duration::from_secs(1)).await;
            });
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(bulkhead.limit(), 1);
        assert_eq!(bulkhead.in_flight(), 1);
        assert_eq!(bulkhead.queued(), 2);
    }
}
