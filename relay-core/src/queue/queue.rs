//! Bounded FIFO queue drained by a fixed pool of workers.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::config::QueueConfig;
use super::metrics::{QueueMetrics, QueueStats};

/// Error types for queue operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Queue is stopped")]
    Stopped,

    #[error("Queue is full (max: {max})")]
    Full { max: usize },
}

/// Why a submitted task produced no value
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TaskError<E> {
    /// The work itself returned an error
    #[error("{0}")]
    Failed(E),

    #[error("Task panicked")]
    Panicked,

    /// Discarded at shutdown before any worker picked it up
    #[error("Task dropped before completion")]
    Dropped,
}

/// Identity of a submitted task, unique for the lifetime of the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

enum Outcome {
    Completed,
    Failed(String),
    Panicked,
}

/// Result of running a task's work, plus the deferred hand-off to the submitter
struct Completion {
    outcome: Outcome,
    deliver: Box<dyn FnOnce() + Send>,
}

struct Task {
    id: TaskId,
    job: BoxFuture<'static, Completion>,
}

/// Receives the result of one submitted task.
///
/// Resolves to [`TaskError::Dropped`] if the task is discarded before a
/// worker runs it.
pub struct TaskHandle<T, E> {
    id: TaskId,
    rx: oneshot::Receiver<Result<T, TaskError<E>>>,
}

impl<T, E> TaskHandle<T, E> {
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl<T, E> Future for TaskHandle<T, E> {
    type Output = Result<T, TaskError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(TaskError::Dropped)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Bounded request queue with a worker pool.
///
/// Tasks run in submission order; with more than one worker, later tasks may
/// finish before earlier ones. Each worker runs one task at a time, so the
/// worker count bounds concurrent work.
pub struct RequestQueue {
    max_size: usize,
    tx: mpsc::Sender<Task>,
    rx: Arc<Mutex<mpsc::Receiver<Task>>>,
    in_flight: Arc<Mutex<HashSet<TaskId>>>,
    next_id: AtomicU64,
    stopped: AtomicBool,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    metrics: Arc<QueueMetrics>,
}

impl RequestQueue {
    /// Create the queue and spawn its workers on the current runtime
    pub fn start(config: QueueConfig) -> Self {
        let max_size = config.max_size.max(1);
        let worker_count = config.workers.max(1);

        let (tx, rx) = mpsc::channel(max_size);
        let rx = Arc::new(Mutex::new(rx));
        let in_flight = Arc::new(Mutex::new(HashSet::new()));
        let metrics = Arc::new(QueueMetrics::new());
        let cancel = CancellationToken::new();

        let workers = (0..worker_count)
            .map(|index| {
                let worker = Worker {
                    index,
                    rx: rx.clone(),
                    in_flight: in_flight.clone(),
                    metrics: metrics.clone(),
                    cancel: cancel.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        tracing::info!(workers = worker_count, max_size, "Request queue started");

        Self {
            max_size,
            tx,
            rx,
            in_flight,
            next_id: AtomicU64::new(1),
            stopped: AtomicBool::new(false),
            cancel,
            workers: Mutex::new(workers),
            metrics,
        }
    }

    /// Submit work, waiting for space if the queue is full
    pub async fn submit<Fut, T, E>(&self, work: Fut) -> Result<TaskHandle<T, E>, QueueError>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        if self.is_stopped() {
            self.metrics.record_rejected();
            return Err(QueueError::Stopped);
        }

        let (task, handle) = self.prepare(work);
        if self.tx.send(task).await.is_err() {
            self.metrics.record_rejected();
            return Err(QueueError::Stopped);
        }

        self.accepted(&handle);
        Ok(handle)
    }

    /// Submit work without waiting, failing with [`QueueError::Full`] at capacity
    pub fn try_submit<Fut, T, E>(&self, work: Fut) -> Result<TaskHandle<T, E>, QueueError>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        if self.is_stopped() {
            self.metrics.record_rejected();
            return Err(QueueError::Stopped);
        }

        let (task, handle) = self.prepare(work);
        match self.tx.try_send(task) {
            Ok(()) => {
                self.accepted(&handle);
                Ok(handle)
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.record_rejected();
                Err(QueueError::Full { max: self.max_size })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.metrics.record_rejected();
                Err(QueueError::Stopped)
            }
        }
    }

    fn prepare<Fut, T, E>(&self, work: Fut) -> (Task, TaskHandle<T, E>)
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();

        let job = async move {
            let (outcome, result) = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(Ok(value)) => (Outcome::Completed, Ok(value)),
                Ok(Err(e)) => (Outcome::Failed(e.to_string()), Err(TaskError::Failed(e))),
                Err(_) => (Outcome::Panicked, Err(TaskError::Panicked)),
            };

            Completion {
                outcome,
                deliver: Box::new(move || {
                    // Submitter may have stopped waiting
                    let _ = tx.send(result);
                }),
            }
        }
        .boxed();

        (Task { id, job }, TaskHandle { id, rx })
    }

    fn accepted<T, E>(&self, handle: &TaskHandle<T, E>) {
        self.metrics.record_submitted();
        tracing::debug!(task_id = %handle.id, pending = self.pending(), "Task submitted");
    }

    /// Stop accepting work and wait for the workers to finish.
    ///
    /// Tasks already picked up by a worker run to completion. Tasks still
    /// waiting in the queue are discarded and their handles resolve to
    /// [`TaskError::Dropped`].
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        tracing::info!("Request queue shutting down");

        let workers = std::mem::take(&mut *self.workers.lock().await);
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "Queue worker ended abnormally");
            }
        }

        let mut rx = self.rx.lock().await;
        rx.close();
        let mut dropped = 0;
        while let Ok(task) = rx.try_recv() {
            tracing::debug!(task_id = %task.id, "Discarding queued task");
            dropped += 1;
        }
        self.metrics.record_dropped(dropped);

        tracing::info!(dropped, "Request queue stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Tasks waiting for a worker
    pub fn pending(&self) -> usize {
        self.max_size.saturating_sub(self.tx.capacity())
    }

    /// Tasks currently being processed
    pub async fn in_flight(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    /// Whether a worker is currently running `id`
    pub async fn is_processing(&self, id: TaskId) -> bool {
        self.in_flight.lock().await.contains(&id)
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn stats(&self) -> QueueStats {
        self.metrics.snapshot()
    }
}

struct Worker {
    index: usize,
    rx: Arc<Mutex<mpsc::Receiver<Task>>>,
    in_flight: Arc<Mutex<HashSet<TaskId>>>,
    metrics: Arc<QueueMetrics>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                task = recv_next(&self.rx) => task,
            };

            match next {
                Some(task) => self.process(task).await,
                None => break,
            }
        }

        tracing::debug!(worker = self.index, "Queue worker stopped");
    }

    async fn process(&self, task: Task) {
        self.in_flight.lock().await.insert(task.id);
        self.metrics.record_started();
        let started = Instant::now();

        let completion = task.job.await;

        self.in_flight.lock().await.remove(&task.id);
        let success = match &completion.outcome {
            Outcome::Completed => {
                tracing::debug!(worker = self.index, task_id = %task.id, "Task completed");
                true
            }
            Outcome::Failed(error) => {
                tracing::warn!(worker = self.index, task_id = %task.id, error = %error, "Task failed");
                false
            }
            Outcome::Panicked => {
                tracing::error!(worker = self.index, task_id = %task.id, "Task panicked");
                false
            }
        };
        self.metrics.record_finished(success, started.elapsed());

        (completion.deliver)();
    }
}

async fn recv_next(rx: &Mutex<mpsc::Receiver<Task>>) -> Option<Task> {
    rx.lock().await.recv().await
}
