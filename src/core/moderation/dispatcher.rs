// Bounded per-message workers.
//
// Each inbound message runs as its own task; a semaphore caps how many run at
// once, so a burst of messages waits at intake instead of piling up tasks.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub struct MessageDispatcher {
    permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
}

impl MessageDispatcher {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Run `work` once a slot is free. Waits while all slots are busy.
    pub async fn dispatch<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!("Dispatcher closed, message dropped");
                return;
            }
        };

        let mut tasks = self.tasks.lock();
        // Reap whatever already finished so the set doesn't grow unbounded.
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                tracing::error!("Message task failed: {}", e);
            }
        }
        tasks.spawn(async move {
            work.await;
            drop(permit);
        });
    }

    /// Tasks spawned and not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Wait for every dispatched task to finish.
    pub async fn drain(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!("Message task failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let dispatcher = MessageDispatcher::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            let done = Arc::clone(&done);
            dispatcher
                .dispatch(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }
        dispatcher.drain().await;

        assert_eq!(done.load(Ordering::SeqCst), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(dispatcher.in_flight(), 0);
    }
}
