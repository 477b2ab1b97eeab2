//! The thenable capability and resolution values.
//!
//! Anything that can deliver an eventual outcome to a [`Resolver`]
//! implements [`Thenable`]. Resolving a promise with a thenable makes the
//! promise adopt the thenable's outcome instead of fulfilling with it.

use crate::callback_queue::CallbackQueue;
use crate::promise::{Payload, Promise, Resolver};
use core_types::{Reason, Settled};
use std::fmt;

/// Something exposing a `then`-shaped operation.
///
/// `subscribe` is invoked from a queued task, never inline with the resolve
/// call that adopted the thenable. The resolver it receives accepts only
/// its first resolve or reject call.
///
/// # Examples
///
/// ```
/// use async_runtime::{CallbackQueue, Promise, Resolver, Thenable};
///
/// struct Ready(u32);
///
/// impl Thenable<u32> for Ready {
///     fn subscribe(self: Box<Self>, resolver: Resolver<u32>) {
///         resolver.resolve(self.0);
///     }
/// }
///
/// let queue = CallbackQueue::manual();
/// let (promise, resolver) = Promise::with_resolvers_in(&queue);
/// resolver.follow(Ready(7));
/// queue.run_until_idle();
/// assert_eq!(promise.settlement().and_then(|s| s.into_result().ok()), Some(7));
/// ```
pub trait Thenable<T>: Send + 'static {
    /// Delivers the eventual outcome to `resolver`.
    fn subscribe(self: Box<Self>, resolver: Resolver<T>);

    /// Returns the promise behind this thenable, if it is one.
    ///
    /// Used to detect promises resolved through a chain leading back to
    /// themselves.
    fn as_promise(&self) -> Option<&Promise<T>> {
        None
    }
}

/// Adapts a closure into a [`Thenable`].
pub struct ThenFn<F>(pub F);

impl<T, F> Thenable<T> for ThenFn<F>
where
    F: FnOnce(Resolver<T>) + Send + 'static,
{
    fn subscribe(self: Box<Self>, resolver: Resolver<T>) {
        (self.0)(resolver)
    }
}

/// What a resolve call or a reaction handler produces.
pub enum Resolution<T> {
    /// Fulfill with this value
    Value(T),
    /// Adopt the outcome of this thenable
    Thenable(Box<dyn Thenable<T>>),
    /// Reject with this reason
    Rejected(Reason),
}

impl<T> Resolution<T> {
    /// Wraps a thenable for adoption.
    pub fn thenable<P>(thenable: P) -> Self
    where
        P: Thenable<T>,
    {
        Resolution::Thenable(Box::new(thenable))
    }
}

impl<T> From<Result<T, Reason>> for Resolution<T> {
    fn from(result: Result<T, Reason>) -> Self {
        match result {
            Ok(value) => Resolution::Value(value),
            Err(reason) => Resolution::Rejected(reason),
        }
    }
}

impl<T> From<Settled<T>> for Resolution<T> {
    fn from(settled: Settled<T>) -> Self {
        match settled {
            Settled::Fulfilled(value) => Resolution::Value(value),
            Settled::Rejected(reason) => Resolution::Rejected(reason),
        }
    }
}

impl<T: Payload> From<Promise<T>> for Resolution<T> {
    fn from(promise: Promise<T>) -> Self {
        Resolution::Thenable(Box::new(promise))
    }
}

impl<T: fmt::Debug> fmt::Debug for Resolution<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolution::Thenable(_) => write!(f, "Thenable {{ ... }}"),
            Resolution::Rejected(reason) => f.debug_tuple("Rejected").field(reason).finish(),
        }
    }
}

/// Combinator input: a promise, or a value treated as an already-settled
/// promise.
pub trait IntoPromise<T> {
    /// Converts into a promise scheduling its reactions on `queue`.
    ///
    /// Existing promises are returned unchanged.
    fn into_promise(self, queue: &CallbackQueue) -> Promise<T>;
}

impl<T: Payload> IntoPromise<T> for Promise<T> {
    fn into_promise(self, _queue: &CallbackQueue) -> Promise<T> {
        self
    }
}

impl<T: Payload> IntoPromise<T> for Result<T, Reason> {
    fn into_promise(self, queue: &CallbackQueue) -> Promise<T> {
        match self {
            Ok(value) => Promise::resolved_in(queue, value),
            Err(reason) => Promise::rejected_in(queue, reason),
        }
    }
}

impl<T: Payload> IntoPromise<T> for Settled<T> {
    fn into_promise(self, queue: &CallbackQueue) -> Promise<T> {
        self.into_result().into_promise(queue)
    }
}

impl<T: Payload> IntoPromise<T> for Resolution<T> {
    fn into_promise(self, queue: &CallbackQueue) -> Promise<T> {
        let (promise, resolver) = Promise::with_resolvers_in(queue);
        resolver.resolve_with(self);
        promise
    }
}
