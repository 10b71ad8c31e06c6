//! Bounded worker pool for remote calls.
//!
//! Work is split into batches; each batch runs as one spawned task and
//! every call inside it takes a permit from a shared semaphore, so at
//! most `size` remote calls are in flight no matter how many batches are
//! queued. Dropping the future returned by [`WorkerPool::run`] aborts
//! every spawned batch.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
    batch_size: usize,
}

impl WorkerPool {
    pub fn new(size: usize, batch_size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
            batch_size: batch_size.max(1),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `task` over every item and collect the results.
    ///
    /// Results come back in completion order. A batch whose task panics
    /// contributes no results; callers must treat missing results as
    /// failures.
    pub async fn run<I, R, F, Fut>(&self, items: Vec<I>, task: F) -> Vec<R>
    where
        I: Send + 'static,
        R: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        if items.is_empty() {
            return Vec::new();
        }

        let total = items.len();
        let task = Arc::new(task);
        let mut batches = JoinSet::new();
        let mut items = items.into_iter().peekable();

        while items.peek().is_some() {
            let batch: Vec<I> = items.by_ref().take(self.batch_size).collect();
            let permits = Arc::clone(&self.permits);
            let task = Arc::clone(&task);
            batches.spawn(async move {
                let calls = batch.into_iter().map(|item| {
                    let permits = Arc::clone(&permits);
                    let task = Arc::clone(&task);
                    async move {
                        // The semaphore is never closed.
                        let _permit = permits.acquire_owned().await.ok();
                        (task.as_ref())(item).await
                    }
                });
                join_all(calls).await
            });
        }

        let mut results = Vec::with_capacity(total);
        while let Some(joined) = batches.join_next().await {
            match joined {
                Ok(batch) => results.extend(batch),
                Err(e) => tracing::error!(error = %e, "Worker batch failed"),
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_runs_every_item() {
        let pool = WorkerPool::new(4, 3);
        let mut results = pool.run((0..25).collect(), |i: u32| async move { i * 2 }).await;
        results.sort();
        assert_eq!(results, (0..25).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_empty_input() {
        let pool = WorkerPool::new(4, 3);
        let results: Vec<u32> = pool.run(Vec::<u32>::new(), |i| async move { i }).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(3, 2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (in_flight_c, peak_c) = (in_flight.clone(), peak.clone());
        pool.run((0..30).collect::<Vec<u32>>(), move |_| {
            let in_flight = in_flight_c.clone();
            let peak = peak_c.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn test_zero_sizes_are_clamped() {
        let pool = WorkerPool::new(0, 0);
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.batch_size(), 1);
    }
}
