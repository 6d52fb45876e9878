//! Bounded, failure-isolated fan-out over many targets.

use futures_util::stream::{self, StreamExt};
use std::future::Future;
use tokio::task::JoinError;

/// Runs `work` for every id with at most `max_concurrency` in flight. Each unit runs
/// on its own task, so a panic becomes an `Err` for that id alone. Results come back
/// in completion order.
pub async fn run_isolated<T, F, Fut>(
    ids: Vec<String>,
    max_concurrency: usize,
    work: F,
) -> Vec<(String, Result<T, String>)>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    stream::iter(ids.into_iter().map(|id| {
        let handle = tokio::spawn(work(id.clone()));
        async move { (id, handle.await.map_err(describe_join_error)) }
    }))
    .buffer_unordered(max_concurrency.max(1))
    .collect()
    .await
}

fn describe_join_error(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task was cancelled".to_string();
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("task panicked: {}", message)
}
