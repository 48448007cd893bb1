//! Fixed-size worker pool over a slice of items.
//!
//! `concurrency` long-lived workers pull the next index from a shared queue
//! and write the result into that index's slot, so the returned vector is in
//! input order whatever the completion order. Workers are polled on the
//! caller's task; nothing is spawned onto other threads.
use futures::future::join_all;
use futures::FutureExt;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;
use tracing::debug;

/// A per-item future panicked; carried as that item's failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPanicked(pub String);

pub async fn run_bounded<T, R, E, F, Fut>(
    items: Vec<T>,
    concurrency: usize,
    per_item: F,
) -> Vec<Result<R, E>>
where
    F: Fn(usize, T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: From<TaskPanicked>,
{
    let total = items.len();
    let queue: Mutex<VecDeque<(usize, T)>> = Mutex::new(items.into_iter().enumerate().collect());
    let slots: Mutex<Vec<Option<Result<R, E>>>> = Mutex::new((0..total).map(|_| None).collect());
    let workers = concurrency.max(1).min(total.max(1));

    let worker = |worker_id: usize| {
        let queue = &queue;
        let slots = &slots;
        let per_item = &per_item;
        async move {
            loop {
                let next = lock(queue).pop_front();
                let Some((index, item)) = next else { break };
                debug!(worker_id, index, "item dispatched");
                let result = match AssertUnwindSafe(per_item(index, item))
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result,
                    Err(panic) => Err(E::from(TaskPanicked(panic_message(panic)))),
                };
                lock(slots)[index] = Some(result);
            }
        }
    };

    join_all((0..workers).map(worker)).await;

    let slots = slots.into_inner().unwrap_or_else(|poison| poison.into_inner());
    slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| Err(E::from(TaskPanicked("item never settled".into())))))
        .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
