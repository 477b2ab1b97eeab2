//! Promise runtime.
//!
//! This crate provides eventual values with Promise/A+ semantics:
//! - [`Promise`] - write-once eventual value with chaining and adoption
//! - [`CallbackQueue`] - ordered, deferred execution of promise reactions
//! - [`combinators`] - `all`, `race`, `any` and `all_settled`
//! - [`RejectionTracker`] - reports rejections nobody handled
//! - [`EventLoop`] - host loop interleaving tasks with reaction drains
//!
//! # Overview
//!
//! Every promise belongs to a callback queue. Handlers registered with
//! `then`, `catch` or `finally` never run inside the call that registered
//! them or settled the promise; they run when the queue is drained, either
//! by the host ([`DispatchMode::Manual`]) or by a dedicated worker thread
//! ([`DispatchMode::Worker`], used by the global queue).
//!
//! # Examples
//!
//! ## Chaining on a host-drained queue
//!
//! ```
//! use async_runtime::{CallbackQueue, Promise};
//! use core_types::{Reason, Settled};
//!
//! let queue = CallbackQueue::manual();
//! let parsed = Promise::resolved_in(&queue, "17")
//!     .then(|text: &str| text.parse::<i32>().map_err(Reason::from_error))
//!     .catch(|_| Ok(0));
//!
//! queue.run_until_idle();
//! assert_eq!(parsed.settlement(), Some(Settled::Fulfilled(17)));
//! ```
//!
//! ## Awaiting on the global queue
//!
//! ```
//! use async_runtime::Promise;
//!
//! let all = Promise::all(vec![Promise::resolved(1), Promise::resolved(2)]);
//! let values = futures::executor::block_on(all).unwrap();
//! assert_eq!(values, vec![1, 2]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod callback_queue;
pub mod combinators;
pub mod config;
pub mod event_loop;
pub mod promise;
pub mod task_queue;
pub mod thenable;
pub mod unhandled;

// Re-export main types at crate root
pub use callback_queue::{CallbackQueue, QueueError, QueueId};
pub use config::{DispatchMode, QueueConfig};
pub use event_loop::EventLoop;
pub use promise::{Payload, Promise, PromiseId, Resolver};
pub use task_queue::{MicroTask, MicrotaskQueue, Task, TaskQueue};
pub use thenable::{IntoPromise, Resolution, ThenFn, Thenable};
pub use unhandled::{tracker, RejectionTracker, UnhandledRejection};

pub use core_types::{AggregateError, PromiseState, Reason, Settled};
