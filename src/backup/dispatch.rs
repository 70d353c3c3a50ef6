//! Bounded worker pool
//!
//! [`run_all`] drains a queue of items with a fixed number of workers. Each
//! worker takes one item, runs it to completion, then takes the next. Every
//! item runs in its own task so a panic fails that item alone; the worker
//! that spawned it moves on.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Results of a pool run
#[derive(Debug)]
pub struct DispatchReport<R> {
    /// One output per item that ran to completion, in completion order
    pub outputs: Vec<R>,
    /// Items whose task panicked
    pub panicked: usize,
}

/// Process every item exactly once with at most `workers` in flight
pub async fn run_all<T, R, F, Fut>(items: Vec<T>, workers: usize, worker: F) -> DispatchReport<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let workers = workers.max(1).min(items.len().max(1));
    let queue = Arc::new(Mutex::new(VecDeque::from(items)));
    let worker = Arc::new(worker);
    let mut set = JoinSet::new();

    for id in 0..workers {
        let queue = Arc::clone(&queue);
        let worker = Arc::clone(&worker);

        set.spawn(async move {
            let mut outputs = Vec::new();
            let mut panicked = 0;

            loop {
                let next = queue.lock().pop_front();
                let Some(item) = next else { break };

                match tokio::spawn(worker(item)).await {
                    Ok(output) => outputs.push(output),
                    Err(e) => {
                        tracing::error!(worker = id, error = %e, "Worker task failed");
                        panicked += 1;
                    }
                }
            }

            (outputs, panicked)
        });
    }

    let mut report = DispatchReport {
        outputs: Vec::new(),
        panicked: 0,
    };
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((outputs, panicked)) => {
                report.outputs.extend(outputs);
                report.panicked += panicked;
            }
            Err(e) => tracing::error!(error = %e, "Worker loop failed"),
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_every_item_runs_exactly_once() {
        const ITEMS: usize = 50;

        for workers in [1, ITEMS / 2, ITEMS, ITEMS + 3] {
            let calls = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&calls);
            let report = run_all((0..ITEMS as u32).collect(), workers, move |n: u32| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    n * 2
                }
            })
            .await;

            let mut outputs = report.outputs;
            outputs.sort_unstable();
            assert_eq!(
                outputs,
                (0..ITEMS as u32).map(|n| n * 2).collect::<Vec<_>>(),
                "workers = {workers}"
            );
            assert_eq!(calls.load(Ordering::SeqCst), ITEMS, "workers = {workers}");
            assert_eq!(report.panicked, 0);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (current, max) = (Arc::clone(&in_flight), Arc::clone(&peak));
        let report = run_all((0..24).collect(), 3, move |_: u32| {
            let current = Arc::clone(&current);
            let max = Arc::clone(&max);
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                max.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert_eq!(report.outputs.len(), 24);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_panic_does_not_stop_other_items() {
        let report = run_all((0..10).collect(), 2, |n: u32| async move {
            if n == 3 {
                panic!("boom");
            }
            n
        })
        .await;

        assert_eq!(report.panicked, 1);
        assert_eq!(report.outputs.len(), 9);
        assert!(!report.outputs.contains(&3));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let report = run_all(Vec::<u32>::new(), 8, |n| async move { n }).await;
        assert!(report.outputs.is_empty());
        assert_eq!(report.panicked, 0);
    }
}
