//! Process-wide unhandled rejection tracking.
//!
//! When a promise rejects while nothing has subscribed to it, the rejection
//! is recorded here. Attaching any reaction (or awaiting the promise) before
//! the end of the owning queue's current drain cycle removes the record;
//! whatever is still recorded when the cycle ends is reported through
//! `tracing` and to every subscriber, then forgotten.
//!
//! The registry is created on first use and lives for the rest of the
//! process.

use crate::callback_queue::QueueId;
use crate::promise::PromiseId;
use core_types::Reason;
use crossbeam::channel::{self, Receiver, Sender};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::mem;
use tracing::warn;

/// A rejection that had no handler by the end of its drain cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct UnhandledRejection {
    /// The rejected promise
    pub promise: PromiseId,
    /// The queue the promise schedules its reactions on
    pub queue: QueueId,
    /// The rejection reason
    pub reason: Reason,
}

/// Registry of rejected promises that have no handler yet.
pub struct RejectionTracker {
    pending: Mutex<Vec<UnhandledRejection>>,
    subscribers: Mutex<Vec<Sender<UnhandledRejection>>>,
}

static TRACKER: Lazy<RejectionTracker> = Lazy::new(RejectionTracker::new);

/// The process-wide rejection tracker.
pub fn tracker() -> &'static RejectionTracker {
    &TRACKER
}

impl RejectionTracker {
    fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn track(&self, promise: PromiseId, queue: QueueId, reason: Reason) {
        self.pending.lock().push(UnhandledRejection {
            promise,
            queue,
            reason,
        });
    }

    pub(crate) fn handle(&self, promise: PromiseId) {
        self.pending.lock().retain(|entry| entry.promise != promise);
    }

    /// Ends a drain cycle for `queue`: removes its entries and, if `report`
    /// is set, reports them. Returns the number reported.
    pub(crate) fn flush(&self, queue: QueueId, report: bool) -> usize {
        let unhandled: Vec<UnhandledRejection> = {
            let mut pending = self.pending.lock();
            let (flushed, kept) = mem::take(&mut *pending)
                .into_iter()
                .partition(|entry| entry.queue == queue);
            *pending = kept;
            flushed
        };
        if unhandled.is_empty() || !report {
            return 0;
        }

        for rejection in &unhandled {
            warn!(
                promise = %rejection.promise,
                queue = %rejection.queue,
                reason = %rejection.reason,
                "unhandled promise rejection"
            );
        }
        self.subscribers.lock().retain(|subscriber| {
            unhandled
                .iter()
                .all(|rejection| subscriber.send(rejection.clone()).is_ok())
        });
        unhandled.len()
    }

    /// Returns a channel receiving every future report.
    ///
    /// Dropping the receiver unsubscribes on the next report.
    pub fn subscribe(&self) -> Receiver<UnhandledRejection> {
        let (sender, receiver) = channel::unbounded();
        self.subscribers.lock().push(sender);
        receiver
    }

    /// Number of rejections currently awaiting a handler.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns true if `promise` is rejected and still awaiting a handler.
    pub fn is_tracked(&self, promise: PromiseId) -> bool {
        self.pending.lock().iter().any(|entry| entry.promise == promise)
    }
}
