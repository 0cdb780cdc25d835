//! Bounded-concurrency work queue with per-task timeout.
//!
//! Tasks are handed to a single dispatcher over an unbounded channel, which
//! keeps dispatch strictly FIFO. The dispatcher waits for a free slot
//! (semaphore permit) and for the queue to be resumed, then spawns the task.
//!
//! A task that exceeds the timeout is dropped at its next `.await` point and
//! its handle resolves to [`QueueError::Timeout`]. Code that blocks without
//! yielding cannot be interrupted this way.

use crate::config::QueueConfig;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, Semaphore, mpsc, oneshot, watch};
use tracing::{debug, warn};

/// Errors a task handle can resolve to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The task ran longer than the configured timeout.
    #[error("task timed out after {0:?}")]
    Timeout(Duration),

    /// The task panicked or the queue went away before it finished.
    #[error("task aborted before completion")]
    Aborted,
}

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct QueueInner {
    semaphore: Arc<Semaphore>,
    timeout: Duration,
    queued: AtomicUsize,
    running: AtomicUsize,
    paused: watch::Sender<bool>,
    idle: Notify,
}

impl QueueInner {
    fn size(&self) -> usize {
        self.queued.load(Ordering::SeqCst) + self.running.load(Ordering::SeqCst)
    }

    fn notify_if_idle(&self) {
        if self.size() == 0 {
            self.idle.notify_waiters();
        }
    }

    async fn wait_until_resumed(&self) {
        let mut paused_rx = self.paused.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = paused_rx.wait_for(|paused| !*paused).await;
    }
}

/// Moves a task from the queued gauge to the running gauge and back out
/// when dropped, including when the task panics.
struct RunningSlot<'a> {
    inner: &'a QueueInner,
}

impl<'a> RunningSlot<'a> {
    fn start(inner: &'a QueueInner) -> Self {
        inner.running.fetch_add(1, Ordering::SeqCst);
        inner.queued.fetch_sub(1, Ordering::SeqCst);
        Self { inner }
    }
}

impl Drop for RunningSlot<'_> {
    fn drop(&mut self) {
        self.inner.running.fetch_sub(1, Ordering::SeqCst);
        self.inner.notify_if_idle();
    }
}

/// Resolves to the task's output once it finished (or failed) in the queue.
#[must_use = "a task handle does nothing unless awaited"]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, QueueError>>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, QueueError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(QueueError::Aborted)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Bounded-concurrency task runner.
///
/// Cheap to clone; all clones share the same slots and gauges. Must be
/// created inside a tokio runtime since it spawns its dispatcher.
#[derive(Clone)]
pub struct WorkQueue {
    inner: Arc<QueueInner>,
    job_tx: mpsc::UnboundedSender<Job>,
}

impl WorkQueue {
    pub fn new(config: QueueConfig) -> Self {
        let concurrency = config.concurrency.max(1);
        let (paused, _) = watch::channel(false);
        let inner = Arc::new(QueueInner {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            timeout: config.timeout,
            queued: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            paused,
            idle: Notify::new(),
        });

        let (job_tx, job_rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::dispatch(Arc::clone(&inner), job_rx));

        debug!(
            concurrency,
            timeout_secs = config.timeout.as_secs_f64(),
            "WorkQueue started"
        );

        Self { inner, job_tx }
    }

    /// Queue a task. The returned handle resolves once the task completes,
    /// times out or aborts.
    pub fn enqueue<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let timeout = inner.timeout;

        let job: Job = Box::pin(async move {
            let slot = RunningSlot::start(&inner);
            let result = match tokio::time::timeout(timeout, task).await {
                Ok(output) => Ok(output),
                Err(_) => {
                    warn!(
                        timeout_secs = timeout.as_secs_f64(),
                        "Task exceeded queue timeout"
                    );
                    Err(QueueError::Timeout(timeout))
                }
            };
            drop(slot);
            let _ = result_tx.send(result);
        });

        self.inner.queued.fetch_add(1, Ordering::SeqCst);
        if self.job_tx.send(job).is_err() {
            // Dispatcher is gone; the handle resolves to `Aborted`.
            self.inner.queued.fetch_sub(1, Ordering::SeqCst);
            self.inner.notify_if_idle();
        }

        TaskHandle { rx }
    }

    /// Queued plus running tasks.
    pub fn size(&self) -> usize {
        self.inner.size()
    }

    /// Running tasks only.
    pub fn pending(&self) -> usize {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Stop dispatching new tasks. Running tasks are unaffected.
    pub fn pause(&self) {
        self.inner.paused.send_replace(true);
        debug!("WorkQueue paused");
    }

    /// Restart dispatching.
    pub fn resume(&self) {
        self.inner.paused.send_replace(false);
        debug!("WorkQueue resumed");
    }

    pub fn is_paused(&self) -> bool {
        *self.inner.paused.borrow()
    }

    /// Wait until nothing is queued or running.
    pub async fn wait_for_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.size() == 0 {
                return;
            }
            notified.await;
        }
    }

    async fn dispatch(inner: Arc<QueueInner>, mut job_rx: mpsc::UnboundedReceiver<Job>) {
        while let Some(job) = job_rx.recv().await {
            inner.wait_until_resumed().await;

            let Ok(permit) = Arc::clone(&inner.semaphore).acquire_owned().await else {
                break;
            };

            // May have been paused while waiting for a slot.
            inner.wait_until_resumed().await;

            tokio::spawn(async move {
                job.await;
                drop(permit);
            });
        }
        debug!("WorkQueue dispatcher stopped");
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}
