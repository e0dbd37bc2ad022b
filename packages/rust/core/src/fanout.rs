//! Bounded concurrent fan-out over independent items.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

/// Run `task` on every item concurrently, at most `concurrency` at a time
/// (`0` means unbounded). Results come back in input order.
///
/// `on_done(finished, total)` fires as each task completes. A panicking task
/// resumes its panic on the caller.
pub async fn fan_out<T, R, F, Fut>(
    items: Vec<T>,
    concurrency: usize,
    mut task: F,
    mut on_done: impl FnMut(usize, usize),
) -> Vec<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
{
    let total = items.len();
    let semaphore = (concurrency > 0).then(|| Arc::new(Semaphore::new(concurrency)));
    let mut set = JoinSet::new();

    for (idx, item) in items.into_iter().enumerate() {
        let fut = task(item);
        let semaphore = semaphore.clone();
        set.spawn(async move {
            // The semaphore is never closed, so acquire only fails on shutdown
            let _permit = match semaphore {
                Some(sem) => sem.acquire_owned().await.ok(),
                None => None,
            };
            (idx, fut.await)
        });
    }

    let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();
    let mut finished = 0;

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, result)) => {
                slots[idx] = Some(result);
                finished += 1;
                on_done(finished, total);
            }
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => warn!(error = %e, "fan-out task cancelled"),
        }
    }

    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn preserves_input_order() {
        // Later items finish first
        let items: Vec<u64> = (0..10).collect();
        let out = fan_out(
            items,
            0,
            |n| async move {
                tokio::time::sleep(Duration::from_millis(50 - n * 5)).await;
                n * 2
            },
            |_, _| {},
        )
        .await;
        assert_eq!(out, (0..10).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn respects_concurrency_limit() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let out = fan_out(
            (0..12).collect::<Vec<u32>>(),
            3,
            |n| {
                let active = active.clone();
                let peak = peak.clone();
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    n
                }
            },
            |_, _| {},
        )
        .await;

        assert_eq!(out.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn reports_progress_for_every_item() {
        let mut seen = Vec::new();
        fan_out(vec![1, 2, 3], 2, |n| async move { n }, |done, total| {
            seen.push((done, total))
        })
        .await;
        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn empty_input() {
        let out: Vec<u8> = fan_out(Vec::<u8>::new(), 4, |n| async move { n }, |_, _| {}).await;
        assert!(out.is_empty());
    }
}
