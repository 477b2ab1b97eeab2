//! Ordered, deferred execution of promise reactions.
//!
//! A [`CallbackQueue`] decouples registering a reaction from running it: no
//! handler ever runs inside the call that settled its promise. Tasks run in
//! enqueue order and are drained iteratively, so a chain of reactions of any
//! length never deepens the call stack.
//!
//! Two dispatch modes exist:
//! - **Manual** - tasks wait until the host calls
//!   [`CallbackQueue::run_until_idle`] (the [`EventLoop`](crate::EventLoop)
//!   does this after every task).
//! - **Worker** - a dedicated thread receives tasks over a channel and runs
//!   them as they arrive.
//!
//! Either way, a drain cycle ends once the queue is empty, and that is the
//! point where unhandled rejections recorded for the queue are reported.

use crate::config::{DispatchMode, QueueConfig};
use crate::task_queue::{MicroTask, MicrotaskQueue};
use crate::unhandled::tracker;
use core_types::Reason;
use crossbeam::channel::{self, Receiver, Sender};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use tracing::{debug, error, trace};

/// Process-unique identifier of a callback queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueId(u64);

impl QueueId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        QueueId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue-{}", self.0)
    }
}

/// Errors raised while setting up or attaching a callback queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The worker thread could not be started
    #[error("failed to spawn callback worker `{name}`: {source}")]
    Spawn {
        /// Requested thread name
        name: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },
    /// A host-driven loop was handed a queue it cannot drain
    #[error("{0} is not a manual queue")]
    NotManual(QueueId),
}

/// A cloneable handle to one ordered task queue.
///
/// # Examples
///
/// ```
/// use async_runtime::CallbackQueue;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let queue = CallbackQueue::manual();
/// let hits = Arc::new(AtomicUsize::new(0));
/// let h = hits.clone();
/// queue.defer(move || {
///     h.fetch_add(1, Ordering::SeqCst);
/// });
///
/// assert_eq!(hits.load(Ordering::SeqCst), 0);
/// assert_eq!(queue.run_until_idle(), 1);
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// ```
#[derive(Clone)]
pub struct CallbackQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    id: QueueId,
    report_unhandled: bool,
    dispatch: Dispatch,
}

enum Dispatch {
    Manual {
        tasks: Mutex<MicrotaskQueue>,
        draining: AtomicBool,
    },
    Worker {
        sender: Sender<MicroTask>,
        thread_name: String,
    },
}

static GLOBAL: Lazy<CallbackQueue> =
    Lazy::new(|| match CallbackQueue::new(&QueueConfig::default()) {
        Ok(queue) => queue,
        Err(err) => panic!("{err}"),
    });

impl CallbackQueue {
    /// Creates a queue from a configuration.
    ///
    /// In worker mode this starts the worker thread, which exits once every
    /// handle to the queue has been dropped and its tasks have run.
    pub fn new(config: &QueueConfig) -> Result<Self, QueueError> {
        match config.mode {
            DispatchMode::Manual => Ok(Self::from_parts(
                config,
                Dispatch::Manual {
                    tasks: Mutex::new(MicrotaskQueue::new()),
                    draining: AtomicBool::new(false),
                },
            )),
            DispatchMode::Worker => Self::spawn_worker(config),
        }
    }

    /// Creates a host-drained queue with the default configuration.
    pub fn manual() -> Self {
        Self::from_parts(
            &QueueConfig::manual(),
            Dispatch::Manual {
                tasks: Mutex::new(MicrotaskQueue::new()),
                draining: AtomicBool::new(false),
            },
        )
    }

    /// Creates a worker-drained queue with the default configuration.
    pub fn worker() -> Result<Self, QueueError> {
        Self::new(&QueueConfig::worker())
    }

    /// The process-wide queue used by the queue-less promise constructors.
    ///
    /// # Panics
    ///
    /// Panics on first use if its worker thread cannot be spawned.
    pub fn global() -> &'static CallbackQueue {
        &GLOBAL
    }

    fn from_parts(config: &QueueConfig, dispatch: Dispatch) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                id: QueueId::next(),
                report_unhandled: config.report_unhandled,
                dispatch,
            }),
        }
    }

    fn spawn_worker(config: &QueueConfig) -> Result<Self, QueueError> {
        let (sender, receiver) = channel::unbounded::<MicroTask>();
        let queue = Self::from_parts(
            config,
            Dispatch::Worker {
                sender,
                thread_name: config.thread_name.clone(),
            },
        );

        let id = queue.id();
        let report_unhandled = config.report_unhandled;
        thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || drain_worker(id, receiver, report_unhandled))
            .map_err(|source| QueueError::Spawn {
                name: config.thread_name.clone(),
                source,
            })?;

        debug!(queue = %id, thread = %config.thread_name, "callback worker started");
        Ok(queue)
    }

    /// This queue's identifier.
    pub fn id(&self) -> QueueId {
        self.inner.id
    }

    /// How this queue executes its tasks.
    pub fn mode(&self) -> DispatchMode {
        match self.inner.dispatch {
            Dispatch::Manual { .. } => DispatchMode::Manual,
            Dispatch::Worker { .. } => DispatchMode::Worker,
        }
    }

    /// Whether unhandled rejections are reported at the end of a drain.
    pub fn reports_unhandled(&self) -> bool {
        self.inner.report_unhandled
    }

    /// Returns true if both handles refer to the same queue.
    pub fn same_queue(&self, other: &CallbackQueue) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Appends a task. Tasks run strictly in enqueue order.
    pub fn enqueue(&self, task: MicroTask) {
        match &self.inner.dispatch {
            Dispatch::Manual { tasks, .. } => tasks.lock().enqueue(task),
            Dispatch::Worker {
                sender,
                thread_name,
            } => {
                if sender.send(task).is_err() {
                    error!(
                        queue = %self.id(),
                        thread = %thread_name,
                        "callback worker is gone, dropping task"
                    );
                }
            }
        }
    }

    /// Makes sure a drain cycle ends after this call.
    ///
    /// A worker only flushes unhandled rejections when a cycle ends, so a
    /// rejection made outside its tasks needs a task to follow it. Manual
    /// queues end a cycle on every `run_until_idle` and need nothing.
    pub(crate) fn request_cycle(&self) {
        if let Dispatch::Worker { .. } = self.inner.dispatch {
            self.enqueue(MicroTask::new(|| {}));
        }
    }

    /// Appends a closure as a task.
    pub fn defer<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(MicroTask::new(f));
    }

    /// Number of tasks waiting to run.
    pub fn len(&self) -> usize {
        match &self.inner.dispatch {
            Dispatch::Manual { tasks, .. } => tasks.lock().len(),
            Dispatch::Worker { sender, .. } => sender.len(),
        }
    }

    /// Returns true if no task is waiting to run.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains a manual queue until it is empty and returns the number of
    /// tasks run.
    ///
    /// Tasks enqueued while draining run in the same drain. A nested call
    /// from inside a running task returns 0 immediately, as does a call on a
    /// worker queue (its worker drains it).
    pub fn run_until_idle(&self) -> usize {
        let Dispatch::Manual { tasks, draining } = &self.inner.dispatch else {
            return 0;
        };
        if draining.swap(true, Ordering::AcqRel) {
            return 0;
        }

        let mut ran = 0;
        loop {
            let next = tasks.lock().dequeue();
            let Some(task) = next else { break };
            run_guarded(self.id(), task);
            ran += 1;
        }

        draining.store(false, Ordering::Release);
        finish_cycle(self.id(), ran, self.inner.report_unhandled);
        ran
    }
}

impl Drop for QueueInner {
    fn drop(&mut self) {
        let reported = tracker().flush(self.id, self.report_unhandled);
        if reported > 0 {
            debug!(
                queue = %self.id,
                unhandled = reported,
                "queue dropped with unhandled rejections"
            );
        }
    }
}

impl fmt::Debug for CallbackQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackQueue")
            .field("id", &self.id())
            .field("mode", &self.mode())
            .field("pending", &self.len())
            .finish()
    }
}

fn drain_worker(id: QueueId, receiver: Receiver<MicroTask>, report_unhandled: bool) {
    while let Ok(task) = receiver.recv() {
        run_guarded(id, task);
        let mut ran = 1;
        while let Ok(task) = receiver.try_recv() {
            run_guarded(id, task);
            ran += 1;
        }
        finish_cycle(id, ran, report_unhandled);
    }
    debug!(queue = %id, "callback worker stopped");
}

fn run_guarded(queue: QueueId, task: MicroTask) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
        let reason = Reason::from_panic(payload);
        error!(queue = %queue, %reason, "callback task panicked");
    }
}

fn finish_cycle(queue: QueueId, ran: usize, report_unhandled: bool) {
    let reported = tracker().flush(queue, report_unhandled);
    trace!(queue = %queue, tasks = ran, unhandled = reported, "drain cycle complete");
}
