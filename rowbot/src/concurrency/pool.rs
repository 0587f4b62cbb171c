use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::workers::base::TaskHandler;

/// Snapshot of the occupancy of a [`WorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStatus {
    /// Tasks currently being handled.
    pub active: usize,
    /// Tasks submitted and waiting for a worker.
    pub queued: usize,
}

#[derive(Debug)]
struct PoolShared {
    active: AtomicUsize,
    queued: AtomicUsize,
    live_workers: AtomicUsize,
    terminated: watch::Sender<bool>,
}

/// Fixed-size pool of workers fed by a bounded queue.
///
/// [`WorkerPool::submit`] waits for free space in the queue instead of failing, so a producer
/// can never get further ahead of the workers than the queue capacity. After
/// [`WorkerPool::shutdown`] the workers drain what is already queued and exit, and the pool
/// reports itself terminated once the last one is gone.
#[derive(Debug)]
pub struct WorkerPool<T> {
    name: &'static str,
    sender: Mutex<Option<mpsc::Sender<T>>>,
    shutdown: AtomicBool,
    shared: Arc<PoolShared>,
    // Dropping the pool aborts its workers.
    _workers: JoinSet<()>,
}

impl<T> WorkerPool<T>
where
    T: Send + 'static,
{
    /// Starts `workers` workers that run `handler` on every task of a queue holding at most
    /// `capacity` tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<H>(name: &'static str, workers: usize, capacity: usize, handler: Arc<H>) -> Self
    where
        H: TaskHandler<T>,
    {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let (terminated, _) = watch::channel(false);
        let shared = Arc::new(PoolShared {
            active: AtomicUsize::new(0),
            queued: AtomicUsize::new(0),
            live_workers: AtomicUsize::new(workers),
            terminated,
        });

        let mut join_set = JoinSet::new();
        for worker_id in 0..workers {
            join_set.spawn(run_worker(
                name,
                worker_id,
                receiver.clone(),
                handler.clone(),
                shared.clone(),
            ));
        }

        info!(pool = name, workers, capacity, "worker pool started");

        Self {
            name,
            sender: Mutex::new(Some(sender)),
            shutdown: AtomicBool::new(false),
            shared,
            _workers: join_set,
        }
    }

    /// Enqueues a task, waiting while the queue is full.
    ///
    /// Fails with [`ErrorKind::WorkerPoolShutdown`] once the pool has been shut down.
    pub async fn submit(&self, task: T) -> EtlResult<()> {
        let sender = self.sender.lock().await.clone();
        let Some(sender) = sender else {
            return Err(etl_error!(
                ErrorKind::WorkerPoolShutdown,
                "Worker pool no longer accepts tasks",
                self.name
            ));
        };

        let permit = sender.reserve().await.map_err(|_| {
            etl_error!(
                ErrorKind::WorkerPoolShutdown,
                "Worker pool no longer accepts tasks",
                self.name
            )
        })?;

        self.shared.queued.fetch_add(1, Ordering::SeqCst);
        permit.send(task);

        Ok(())
    }

    /// Stops accepting tasks. Queued tasks are still handled.
    pub async fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        self.sender.lock().await.take();

        info!(pool = self.name, "worker pool shutting down");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Returns `true` once the pool was shut down and every worker has exited.
    pub fn is_terminated(&self) -> bool {
        *self.shared.terminated.borrow()
    }

    /// Waits until [`WorkerPool::is_terminated`] holds.
    pub async fn wait_terminated(&self) {
        let mut terminated = self.shared.terminated.subscribe();
        // The sender lives as long as `self`, so this can only fail if the pool is gone.
        let _ = terminated.wait_for(|terminated| *terminated).await;
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            active: self.shared.active.load(Ordering::SeqCst),
            queued: self.shared.queued.load(Ordering::SeqCst),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

async fn run_worker<T, H>(
    pool: &'static str,
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<T>>>,
    handler: Arc<H>,
    shared: Arc<PoolShared>,
) where
    T: Send + 'static,
    H: TaskHandler<T>,
{
    debug!(pool, worker_id, "worker started");

    loop {
        let task = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };

        // The queue is closed and drained.
        let Some(task) = task else {
            break;
        };

        shared.active.fetch_add(1, Ordering::SeqCst);
        shared.queued.fetch_sub(1, Ordering::SeqCst);

        if let Err(panic) = AssertUnwindSafe(handler.handle(task)).catch_unwind().await {
            error!(
                pool,
                worker_id,
                panic = panic_message(panic.as_ref()),
                "task panicked, worker keeps running"
            );
        }

        shared.active.fetch_sub(1, Ordering::SeqCst);
    }

    debug!(pool, worker_id, "worker stopped");

    if shared.live_workers.fetch_sub(1, Ordering::SeqCst) == 1 {
        shared.terminated.send_replace(true);
        info!(pool, "worker pool terminated");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
