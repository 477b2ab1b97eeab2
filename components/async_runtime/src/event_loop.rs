//! Event loop implementation.
//!
//! This module provides a host-driven loop that interleaves host tasks with
//! promise reactions: each turn runs one task and then drains the loop's
//! callback queue completely.

use crate::callback_queue::{CallbackQueue, QueueError};
use crate::config::DispatchMode;
use crate::promise::{Payload, Promise};
use crate::task_queue::{MicroTask, Task, TaskQueue};
use core_types::{Reason, Settled};
use tracing::debug;

/// A single-threaded event loop.
///
/// Each iteration (turn) of the loop:
/// 1. Takes the oldest task from the task queue and executes it
/// 2. Drains every reaction queued on [`EventLoop::callbacks`], including
///    reactions queued while draining
/// 3. Repeats
///
/// Promises created on [`EventLoop::callbacks`] run their handlers only
/// inside step 2.
///
/// # Examples
///
/// ```
/// use async_runtime::{EventLoop, Promise, Task};
/// use core_types::Settled;
///
/// let mut event_loop = EventLoop::new();
/// let (promise, resolver) = Promise::with_resolvers_in(event_loop.callbacks());
/// let doubled = promise.then(|n: u32| Ok(n * 2));
///
/// event_loop.enqueue_task(Task::new(move || {
///     resolver.resolve(21);
///     Ok(())
/// }));
/// event_loop.run_until_done().unwrap();
/// assert_eq!(doubled.settlement(), Some(Settled::Fulfilled(42)));
/// ```
#[derive(Debug)]
pub struct EventLoop {
    task_queue: TaskQueue,
    callbacks: CallbackQueue,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    /// Creates a new EventLoop with empty queues.
    pub fn new() -> Self {
        Self {
            task_queue: TaskQueue::new(),
            callbacks: CallbackQueue::manual(),
        }
    }

    /// Creates an EventLoop draining an existing manual queue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotManual`] for a worker queue, which the loop
    /// cannot drain.
    pub fn with_callbacks(callbacks: CallbackQueue) -> Result<Self, QueueError> {
        if callbacks.mode() != DispatchMode::Manual {
            return Err(QueueError::NotManual(callbacks.id()));
        }
        Ok(Self {
            task_queue: TaskQueue::new(),
            callbacks,
        })
    }

    /// The callback queue drained after every task.
    pub fn callbacks(&self) -> &CallbackQueue {
        &self.callbacks
    }

    /// Runs the event loop until all tasks and microtasks are processed.
    ///
    /// # Returns
    ///
    /// `Ok(())` once both queues are empty, or the reason of the first task
    /// that failed. Reactions queued before the failure still run.
    pub fn run_until_done(&mut self) -> Result<(), Reason> {
        while !self.task_queue.is_empty() || !self.callbacks.is_empty() {
            self.process_one_cycle()?;
        }
        Ok(())
    }

    /// Runs turns until `promise` settles or no work is left.
    ///
    /// Returns `Ok(None)` if the loop ran dry while `promise` was still
    /// pending. Observing the settlement this way does not count as handling
    /// a rejection.
    pub fn run_until_settled<T: Payload>(
        &mut self,
        promise: &Promise<T>,
    ) -> Result<Option<Settled<T>>, Reason> {
        self.run_all_microtasks();
        while promise.is_pending() && !self.task_queue.is_empty() {
            self.process_one_cycle()?;
        }
        Ok(promise.settlement())
    }

    /// Adds a task to the task queue.
    ///
    /// The task will be executed in the next available iteration of the event loop.
    pub fn enqueue_task(&mut self, task: Task) {
        self.task_queue.enqueue(task);
    }

    /// Adds a microtask to the callback queue.
    ///
    /// The microtask will be executed after the current task completes.
    pub fn enqueue_microtask(&mut self, microtask: MicroTask) {
        self.callbacks.enqueue(microtask);
    }

    /// Returns true if the task queue is empty.
    pub fn is_task_queue_empty(&self) -> bool {
        self.task_queue.is_empty()
    }

    /// Returns true if the callback queue is empty.
    pub fn is_microtask_queue_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Drains the callback queue and returns the number of microtasks run.
    ///
    /// New microtasks added during execution will also be processed before
    /// this method returns.
    pub fn run_all_microtasks(&mut self) -> usize {
        self.callbacks.run_until_idle()
    }

    /// Processes one complete cycle: one task followed by all microtasks.
    ///
    /// This represents one iteration of the event loop.
    pub fn process_one_cycle(&mut self) -> Result<(), Reason> {
        let outcome = match self.task_queue.dequeue() {
            Some(task) => task.run(),
            None => Ok(()),
        };
        self.run_all_microtasks();

        if let Err(reason) = &outcome {
            debug!(%reason, remaining = self.task_queue.len(), "task failed, stopping event loop");
        }
        outcome
    }
}
