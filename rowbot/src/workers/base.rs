use std::future::Future;

/// Processes the tasks pulled from a [`crate::concurrency::pool::WorkerPool`] queue.
///
/// A handler is shared by every worker of its pool, so it must be safe to run concurrently.
/// Failures are never returned: a handler turns them into report records itself, which is what
/// keeps one bad row or query from stopping its pool.
pub trait TaskHandler<T>: Send + Sync + 'static {
    fn handle(&self, task: T) -> impl Future<Output = ()> + Send;
}
