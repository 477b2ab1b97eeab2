//! Promise combinators built on the public `then` contract.
//!
//! Each combinator subscribes to every input with [`Promise::then_with`] and
//! keeps its bookkeeping behind a shared mutex, so inputs may settle on any
//! thread and in any order. The result promise is settled through a single
//! [`Resolver`], which makes short-circuiting a matter of "first call wins":
//! outcomes arriving after the result settled are recorded nowhere.
//!
//! Inputs are anything implementing [`IntoPromise`]; plain results are
//! lifted into already-settled promises on the given queue.

use crate::callback_queue::CallbackQueue;
use crate::promise::{Payload, Promise, Resolver};
use crate::thenable::{IntoPromise, Resolution};
use core_types::{AggregateError, Reason, Settled};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

/// Per-input slots filled as inputs settle.
struct Slots<S> {
    slots: Vec<Option<S>>,
    remaining: usize,
}

impl<S> Slots<S> {
    fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| None).collect(),
            remaining: len,
        }
    }

    /// Fills `index`; returns every slot in input order once all are filled.
    fn fill(&mut self, index: usize, item: S) -> Option<Vec<S>> {
        if self.slots[index].replace(item).is_none() {
            self.remaining -= 1;
        }
        if self.remaining > 0 {
            return None;
        }
        Some(self.slots.drain(..).flatten().collect())
    }
}

fn collect<T, I>(queue: &CallbackQueue, inputs: I) -> Vec<Promise<T>>
where
    T: Payload,
    I: IntoIterator,
    I::Item: IntoPromise<T>,
{
    inputs
        .into_iter()
        .map(|input| input.into_promise(queue))
        .collect()
}

/// Subscribes to `input` without producing a rejection of its own.
fn watch<T, F, R>(input: &Promise<T>, on_fulfilled: F, on_rejected: R)
where
    T: Payload,
    F: FnOnce(T) + Send + 'static,
    R: FnOnce(Reason) + Send + 'static,
{
    let _settled: Promise<()> = input.then_with(
        move |value| {
            on_fulfilled(value);
            Resolution::Value(())
        },
        move |reason| {
            on_rejected(reason);
            Resolution::Value(())
        },
    );
}

/// Fulfills with every input's value, in input order, once all fulfill.
///
/// Rejects with the first rejection reason observed; later outcomes are
/// discarded. An empty input fulfills immediately with an empty vector.
///
/// # Examples
///
/// ```
/// use async_runtime::{combinators, CallbackQueue, Promise};
/// use core_types::Settled;
///
/// let queue = CallbackQueue::manual();
/// let (slow, resolver) = Promise::with_resolvers_in(&queue);
/// let all = combinators::all(&queue, vec![slow, Promise::resolved_in(&queue, 2)]);
///
/// resolver.resolve(1);
/// queue.run_until_idle();
/// assert_eq!(all.settlement(), Some(Settled::Fulfilled(vec![1, 2])));
/// ```
pub fn all<T, I>(queue: &CallbackQueue, inputs: I) -> Promise<Vec<T>>
where
    T: Payload,
    I: IntoIterator,
    I::Item: IntoPromise<T>,
{
    let inputs = collect(queue, inputs);
    let (result, resolver) = Promise::with_resolvers_in(queue);
    if inputs.is_empty() {
        resolver.resolve(Vec::new());
        return result;
    }

    let slots = Arc::new(Mutex::new(Slots::new(inputs.len())));
    for (index, input) in inputs.iter().enumerate() {
        let slots = Arc::clone(&slots);
        let on_fulfilled: Resolver<Vec<T>> = resolver.clone();
        let on_rejected = resolver.clone();
        watch(
            input,
            move |value| {
                let values = slots.lock().fill(index, value);
                if let Some(values) = values {
                    on_fulfilled.resolve(values);
                }
            },
            move |reason| {
                if !on_rejected.is_resolved() {
                    trace!(
                        promise = %on_rejected.promise().id(),
                        input = index,
                        "all short-circuited"
                    );
                }
                on_rejected.reject(reason);
            },
        );
    }
    result
}

/// Settles like whichever input settles first.
///
/// An empty input never settles.
pub fn race<T, I>(queue: &CallbackQueue, inputs: I) -> Promise<T>
where
    T: Payload,
    I: IntoIterator,
    I::Item: IntoPromise<T>,
{
    let inputs = collect(queue, inputs);
    let (result, resolver) = Promise::with_resolvers_in(queue);
    for input in &inputs {
        let on_fulfilled = resolver.clone();
        let on_rejected = resolver.clone();
        watch(
            input,
            move |value| on_fulfilled.resolve(value),
            move |reason| on_rejected.reject(reason),
        );
    }
    result
}

/// Fulfills with the first fulfillment among the inputs.
///
/// Rejects only once every input has rejected, with an
/// [`AggregateError`] holding the reasons in input order. An empty input
/// rejects immediately with an empty aggregate.
pub fn any<T, I>(queue: &CallbackQueue, inputs: I) -> Promise<T>
where
    T: Payload,
    I: IntoIterator,
    I::Item: IntoPromise<T>,
{
    let inputs = collect(queue, inputs);
    let (result, resolver) = Promise::with_resolvers_in(queue);
    if inputs.is_empty() {
        resolver.reject(AggregateError::new(Vec::new()));
        return result;
    }

    let errors = Arc::new(Mutex::new(Slots::new(inputs.len())));
    for (index, input) in inputs.iter().enumerate() {
        let errors = Arc::clone(&errors);
        let on_fulfilled = resolver.clone();
        let on_rejected = resolver.clone();
        watch(
            input,
            move |value| on_fulfilled.resolve(value),
            move |reason| {
                let reasons = errors.lock().fill(index, reason);
                if let Some(reasons) = reasons {
                    on_rejected.reject(AggregateError::new(reasons));
                }
            },
        );
    }
    result
}

/// Fulfills with every input's outcome, in input order, once all settle.
///
/// Never rejects. An empty input fulfills immediately with an empty vector.
pub fn all_settled<T, I>(queue: &CallbackQueue, inputs: I) -> Promise<Vec<Settled<T>>>
where
    T: Payload,
    I: IntoIterator,
    I::Item: IntoPromise<T>,
{
    let inputs = collect(queue, inputs);
    let (result, resolver) = Promise::with_resolvers_in(queue);
    if inputs.is_empty() {
        resolver.resolve(Vec::new());
        return result;
    }

    let outcomes = Arc::new(Mutex::new(Slots::new(inputs.len())));
    for (index, input) in inputs.iter().enumerate() {
        let fulfilled_outcomes = Arc::clone(&outcomes);
        let rejected_outcomes = Arc::clone(&outcomes);
        let on_fulfilled = resolver.clone();
        let on_rejected = resolver.clone();
        watch(
            input,
            move |value| {
                let done = fulfilled_outcomes.lock().fill(index, Settled::Fulfilled(value));
                if let Some(done) = done {
                    on_fulfilled.resolve(done);
                }
            },
            move |reason| {
                let done = rejected_outcomes.lock().fill(index, Settled::Rejected(reason));
                if let Some(done) = done {
                    on_rejected.resolve(done);
                }
            },
        );
    }
    result
}
