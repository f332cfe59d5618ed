//! Bounded-concurrency fan-out shared by every level of the pipeline.
//!
//! Documents, segments within a document, extraction attempts within a segment
//! and embedding calls all go through [`BoundedPool`]. Tasks are polled inside
//! the caller's task (no spawning), so results can be folded into local state
//! from the consuming loop without locks.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::stream::{self, Stream, StreamExt};

/// Runs at most `limit` futures at once and yields their outputs as they finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedPool {
    limit: usize,
}

impl BoundedPool {
    /// A `limit` of 0 is treated as 1.
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Yield outputs in completion order. The stream ends once every task has finished.
    ///
    /// A task that fails (returns `Err`) is just another output: siblings keep running.
    pub fn run<I, F>(self, tasks: I) -> impl Stream<Item = F::Output>
    where
        I: IntoIterator<Item = F>,
        F: Future,
    {
        stream::iter(tasks).buffer_unordered(self.limit)
    }

    /// Like [`run`](Self::run), tagging each output with its task's input position.
    pub fn run_indexed<I, F>(self, tasks: I) -> impl Stream<Item = (usize, F::Output)>
    where
        I: IntoIterator<Item = F>,
        F: Future,
    {
        let tagged = tasks
            .into_iter()
            .enumerate()
            .map(|(index, task)| async move { (index, task.await) });
        stream::iter(tagged).buffer_unordered(self.limit)
    }

    /// Run every task and return the outputs in input order.
    pub async fn collect_ordered<I, F>(self, tasks: I) -> Vec<F::Output>
    where
        I: IntoIterator<Item = F>,
        F: Future,
    {
        let mut outputs: Vec<(usize, F::Output)> = self.run_indexed(tasks).collect().await;
        outputs.sort_by_key(|(index, _)| *index);
        outputs.into_iter().map(|(_, output)| output).collect()
    }
}

/// Completion counter for one fan-out, read by the progress reporter.
#[derive(Debug)]
pub struct Progress {
    total: usize,
    done: AtomicUsize,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            done: AtomicUsize::new(0),
        }
    }

    /// Record one completion and return the new completed count.
    pub fn advance(&self) -> usize {
        self.done.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.done() as f64 / self.total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = (0..10).map(|_| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        });

        let outputs: Vec<()> = BoundedPool::new(3).run(tasks).collect().await;
        assert_eq!(outputs.len(), 10);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failure_does_not_cancel_siblings() {
        let tasks = (0..5).map(|i| async move {
            if i == 1 {
                Err(format!("task {i} failed"))
            } else {
                tokio::time::sleep(Duration::from_millis(2)).await;
                Ok(i)
            }
        });

        let outputs: Vec<Result<i32, String>> = BoundedPool::new(2).run(tasks).collect().await;
        assert_eq!(outputs.len(), 5);
        assert_eq!(outputs.iter().filter(|r| r.is_err()).count(), 1);
        assert_eq!(outputs.iter().filter(|r| r.is_ok()).count(), 4);
    }

    #[tokio::test]
    async fn yields_in_completion_order_with_indices() {
        let delays = [30u64, 1, 10];
        let tasks = delays.iter().map(|&ms| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            ms
        });

        let outputs: Vec<(usize, u64)> = BoundedPool::new(3).run_indexed(tasks).collect().await;
        assert_eq!(outputs, vec![(1, 1), (2, 10), (0, 30)]);
    }

    #[tokio::test]
    async fn collect_ordered_restores_input_order() {
        let delays = [20u64, 1, 5];
        let tasks = delays.iter().map(|&ms| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            ms
        });
        let outputs = BoundedPool::new(3).collect_ordered(tasks).await;
        assert_eq!(outputs, vec![20, 1, 5]);
    }

    #[test]
    fn zero_limit_is_one() {
        assert_eq!(BoundedPool::new(0).limit(), 1);
    }

    #[test]
    fn progress_percentage() {
        let progress = Progress::new(4);
        assert_eq!(progress.advance(), 1);
        progress.advance();
        assert_eq!(progress.done(), 2);
        assert_eq!(progress.percent(), 50.0);
        assert_eq!(Progress::new(0).percent(), 100.0);
    }
}
