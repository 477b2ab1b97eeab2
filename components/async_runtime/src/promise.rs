//! Promise implementation following Promise/A+ semantics.
//!
//! A [`Promise`] is a cloneable handle to one shared state machine:
//!
//! ```text
//! Pending --resolve/reject--> Fulfilled | Rejected   (terminal)
//! ```
//!
//! Reactions registered with [`Promise::then`] and friends are recorded while
//! the promise is pending and handed to the promise's [`CallbackQueue`] the
//! moment it settles; reactions registered after settlement are queued
//! immediately. Handlers therefore never run inside the call that settled
//! the promise or registered the reaction, and the reactions of one promise
//! run in registration order.
//!
//! Settlement is serialized by a per-promise mutex, so when resolve races
//! with reject or with `then` on other threads, exactly one settlement wins
//! and every later attempt is a no-op.

use crate::callback_queue::CallbackQueue;
use crate::combinators;
use crate::task_queue::MicroTask;
use crate::thenable::{IntoPromise, Resolution, Thenable};
use crate::unhandled::tracker;
use core_types::{PromiseState, Reason, Settled};
use parking_lot::{const_mutex, Mutex};
use std::fmt;
use std::future::Future;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Waker};
use tracing::{debug, trace};

/// Values a promise can be fulfilled with.
///
/// Every reaction receives its own copy of the settlement, hence `Clone`.
pub trait Payload: Clone + Send + 'static {}

impl<T: Clone + Send + 'static> Payload for T {}

/// Process-unique identifier of a promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromiseId(u64);

impl PromiseId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        PromiseId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "promise-{}", self.0)
    }
}

type Handler<A, U> = Box<dyn FnOnce(A) -> Resolution<U> + Send>;

/// Work to run once a promise settles.
trait Reaction<T>: Send {
    fn react(self: Box<Self>, settlement: Settled<T>);
}

/// A registered pair of handlers plus the derived promise whose settlement
/// depends on them.
///
/// A missing rejection handler propagates the reason unchanged. `catch`
/// registers a pass-through fulfillment handler, so the fulfillment side is
/// always present.
struct PromiseReaction<T, U> {
    on_fulfilled: Handler<T, U>,
    on_rejected: Option<Handler<Reason, U>>,
    derived: Resolver<U>,
}

impl<T: Payload, U: Payload> Reaction<T> for PromiseReaction<T, U> {
    fn react(self: Box<Self>, settlement: Settled<T>) {
        let PromiseReaction {
            on_fulfilled,
            on_rejected,
            derived,
        } = *self;

        let resolution = match settlement {
            Settled::Fulfilled(value) => guarded(move || on_fulfilled(value)),
            Settled::Rejected(reason) => match on_rejected {
                Some(on_rejected) => guarded(move || on_rejected(reason)),
                None => Resolution::Rejected(reason),
            },
        };
        derived.resolve_with(resolution);
    }
}

/// Forwards a settlement to a promise that adopted this one.
struct Adoption<T> {
    resolver: Resolver<T>,
}

impl<T: Payload> Reaction<T> for Adoption<T> {
    fn react(self: Box<Self>, settlement: Settled<T>) {
        match settlement {
            Settled::Fulfilled(value) => self.resolver.resolve(value),
            Settled::Rejected(reason) => self.resolver.reject(reason),
        }
    }
}

fn guarded<U>(handler: impl FnOnce() -> Resolution<U>) -> Resolution<U> {
    panic::catch_unwind(AssertUnwindSafe(handler))
        .unwrap_or_else(|payload| Resolution::Rejected(Reason::from_panic(payload)))
}

enum State<T> {
    Pending(Pending<T>),
    Settled(Settled<T>),
}

struct Pending<T> {
    reactions: Vec<Box<dyn Reaction<T>>>,
    wakers: Vec<Waker>,
    /// The promise this one has been resolved with, while adopting it.
    following: Option<Weak<Core<T>>>,
}

impl<T> Default for Pending<T> {
    fn default() -> Self {
        Self {
            reactions: Vec::new(),
            wakers: Vec::new(),
            following: None,
        }
    }
}

struct Inner<T> {
    state: State<T>,
    /// Set once anything subscribed to the outcome.
    handled: bool,
}

struct Core<T> {
    id: PromiseId,
    queue: CallbackQueue,
    inner: Mutex<Inner<T>>,
}

/// Serializes adoption-chain walks so two promises cannot adopt each other
/// concurrently.
static ADOPTION: Mutex<()> = const_mutex(());

/// A value that becomes available asynchronously.
///
/// Cloning a `Promise` clones the handle; all clones observe the same
/// settlement.
///
/// # Examples
///
/// ```
/// use async_runtime::{CallbackQueue, Promise};
/// use core_types::Settled;
///
/// let queue = CallbackQueue::manual();
/// let doubled = Promise::new_in(&queue, |resolver| resolver.resolve(21))
///     .then(|n: i32| Ok(n * 2));
///
/// assert!(doubled.is_pending());
/// queue.run_until_idle();
/// assert_eq!(doubled.settlement(), Some(Settled::Fulfilled(42)));
/// ```
pub struct Promise<T> {
    core: Arc<Core<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: Payload> Promise<T> {
    /// Creates a promise on the global queue and runs `executor` on it
    /// synchronously.
    ///
    /// A panicking executor rejects the promise with [`Reason::Panic`]
    /// unless it already resolved it.
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(Resolver<T>),
    {
        Self::new_in(CallbackQueue::global(), executor)
    }

    /// Like [`Promise::new`], scheduling reactions on `queue`.
    pub fn new_in<F>(queue: &CallbackQueue, executor: F) -> Self
    where
        F: FnOnce(Resolver<T>),
    {
        Self::try_new_in(queue, move |resolver| {
            executor(resolver);
            Ok(())
        })
    }

    /// Creates a promise on the global queue with a fallible executor.
    ///
    /// An `Err` returned by the executor rejects the promise, unless the
    /// executor already resolved it.
    pub fn try_new<F>(executor: F) -> Self
    where
        F: FnOnce(Resolver<T>) -> Result<(), Reason>,
    {
        Self::try_new_in(CallbackQueue::global(), executor)
    }

    /// Like [`Promise::try_new`], scheduling reactions on `queue`.
    pub fn try_new_in<F>(queue: &CallbackQueue, executor: F) -> Self
    where
        F: FnOnce(Resolver<T>) -> Result<(), Reason>,
    {
        let (promise, resolver) = Self::with_resolvers_in(queue);
        let fallback = resolver.clone();
        match panic::catch_unwind(AssertUnwindSafe(move || executor(resolver))) {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => fallback.reject(reason),
            Err(payload) => fallback.reject(Reason::from_panic(payload)),
        }
        promise
    }

    /// Creates a pending promise on the global queue together with its
    /// resolver.
    pub fn with_resolvers() -> (Self, Resolver<T>) {
        Self::with_resolvers_in(CallbackQueue::global())
    }

    /// Like [`Promise::with_resolvers`], scheduling reactions on `queue`.
    pub fn with_resolvers_in(queue: &CallbackQueue) -> (Self, Resolver<T>) {
        let promise = Promise {
            core: Arc::new(Core {
                id: PromiseId::next(),
                queue: queue.clone(),
                inner: Mutex::new(Inner {
                    state: State::Pending(Pending::default()),
                    handled: false,
                }),
            }),
        };
        let resolver = Resolver::new(promise.clone());
        (promise, resolver)
    }

    /// Creates a promise fulfilled with `value`.
    pub fn resolved(value: T) -> Self {
        Self::resolved_in(CallbackQueue::global(), value)
    }

    /// Like [`Promise::resolved`], scheduling reactions on `queue`.
    pub fn resolved_in(queue: &CallbackQueue, value: T) -> Self {
        let (promise, resolver) = Self::with_resolvers_in(queue);
        resolver.resolve(value);
        promise
    }

    /// Creates a promise rejected with `reason`.
    pub fn rejected(reason: impl Into<Reason>) -> Self {
        Self::rejected_in(CallbackQueue::global(), reason)
    }

    /// Like [`Promise::rejected`], scheduling reactions on `queue`.
    pub fn rejected_in(queue: &CallbackQueue, reason: impl Into<Reason>) -> Self {
        let (promise, resolver) = Self::with_resolvers_in(queue);
        resolver.reject(reason);
        promise
    }

    /// This promise's identifier.
    pub fn id(&self) -> PromiseId {
        self.core.id
    }

    /// The queue this promise schedules its reactions on.
    pub fn queue(&self) -> &CallbackQueue {
        &self.core.queue
    }

    /// The current state.
    pub fn state(&self) -> PromiseState {
        match &self.core.inner.lock().state {
            State::Pending(_) => PromiseState::Pending,
            State::Settled(settled) => settled.status(),
        }
    }

    /// Returns true while the promise has not settled.
    pub fn is_pending(&self) -> bool {
        self.state() == PromiseState::Pending
    }

    /// A copy of the settlement, once settled.
    ///
    /// Inspecting the settlement does not count as handling a rejection.
    pub fn settlement(&self) -> Option<Settled<T>> {
        match &self.core.inner.lock().state {
            State::Pending(_) => None,
            State::Settled(settled) => Some(settled.clone()),
        }
    }

    /// Returns true if both handles refer to the same promise.
    pub fn ptr_eq(&self, other: &Promise<T>) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    /// Registers both handlers and returns the derived promise.
    ///
    /// The matching handler's [`Resolution`] settles the derived promise; a
    /// returned thenable is adopted. A panicking handler rejects the derived
    /// promise with [`Reason::Panic`].
    pub fn then_with<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U>
    where
        U: Payload,
        F: FnOnce(T) -> Resolution<U> + Send + 'static,
        R: FnOnce(Reason) -> Resolution<U> + Send + 'static,
    {
        self.chain(Box::new(on_fulfilled), Some(Box::new(on_rejected)))
    }

    /// Maps the fulfillment value; `Err` rejects the derived promise.
    ///
    /// A rejection of this promise propagates to the derived promise
    /// unchanged.
    pub fn then<U, F>(&self, on_fulfilled: F) -> Promise<U>
    where
        U: Payload,
        F: FnOnce(T) -> Result<U, Reason> + Send + 'static,
    {
        self.chain(
            Box::new(move |value| Resolution::from(on_fulfilled(value))),
            None,
        )
    }

    /// Chains a handler returning another promise, which is adopted.
    pub fn and_then<U, F>(&self, on_fulfilled: F) -> Promise<U>
    where
        U: Payload,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        self.chain(
            Box::new(move |value| Resolution::from(on_fulfilled(value))),
            None,
        )
    }

    /// Recovers from a rejection; fulfillments pass through unchanged.
    pub fn catch<F>(&self, on_rejected: F) -> Promise<T>
    where
        F: FnOnce(Reason) -> Result<T, Reason> + Send + 'static,
    {
        self.chain::<T>(
            Box::new(Resolution::Value),
            Some(Box::new(move |reason| Resolution::from(on_rejected(reason)))),
        )
    }

    /// Like [`Promise::catch`], with a handler producing a full
    /// [`Resolution`].
    pub fn catch_with<F>(&self, on_rejected: F) -> Promise<T>
    where
        F: FnOnce(Reason) -> Resolution<T> + Send + 'static,
    {
        self.chain::<T>(Box::new(Resolution::Value), Some(Box::new(on_rejected)))
    }

    /// Runs `on_finally` on either outcome and passes the original
    /// settlement through, unless `on_finally` returns `Err` (or panics),
    /// which rejects the derived promise instead.
    pub fn finally<F>(&self, on_finally: F) -> Promise<T>
    where
        F: FnOnce() -> Result<(), Reason> + Send + 'static,
    {
        self.finally_with(move || Resolution::from(on_finally()))
    }

    /// Like [`Promise::finally`]; a thenable returned by `on_finally` is
    /// waited for, and its rejection overrides the original outcome.
    pub fn finally_with<F>(&self, on_finally: F) -> Promise<T>
    where
        F: FnOnce() -> Resolution<()> + Send + 'static,
    {
        let on_fulfilled_slot = Arc::new(Mutex::new(Some(on_finally)));
        let on_rejected_slot = Arc::clone(&on_fulfilled_slot);
        let on_fulfilled_queue = self.core.queue.clone();
        let on_rejected_queue = self.core.queue.clone();
        self.then_with(
            move |value| {
                run_finally(&on_fulfilled_slot, &on_fulfilled_queue, Settled::Fulfilled(value))
            },
            move |reason| {
                run_finally(&on_rejected_slot, &on_rejected_queue, Settled::Rejected(reason))
            },
        )
    }

    /// Settles with the outcome of whichever input settles first.
    ///
    /// Uses the global queue. See [`combinators::race`].
    pub fn race<I>(inputs: I) -> Promise<T>
    where
        I: IntoIterator,
        I::Item: IntoPromise<T>,
    {
        combinators::race(CallbackQueue::global(), inputs)
    }

    /// Fulfills with every input's value once all fulfill.
    ///
    /// Uses the global queue. See [`combinators::all`].
    pub fn all<I>(inputs: I) -> Promise<Vec<T>>
    where
        I: IntoIterator,
        I::Item: IntoPromise<T>,
    {
        combinators::all(CallbackQueue::global(), inputs)
    }

    /// Fulfills with the first fulfillment among the inputs.
    ///
    /// Uses the global queue. See [`combinators::any`].
    pub fn any<I>(inputs: I) -> Promise<T>
    where
        I: IntoIterator,
        I::Item: IntoPromise<T>,
    {
        combinators::any(CallbackQueue::global(), inputs)
    }

    /// Fulfills with every input's outcome once all settle.
    ///
    /// Uses the global queue. See [`combinators::all_settled`].
    pub fn all_settled<I>(inputs: I) -> Promise<Vec<Settled<T>>>
    where
        I: IntoIterator,
        I::Item: IntoPromise<T>,
    {
        combinators::all_settled(CallbackQueue::global(), inputs)
    }

    fn chain<U: Payload>(
        &self,
        on_fulfilled: Handler<T, U>,
        on_rejected: Option<Handler<Reason, U>>,
    ) -> Promise<U> {
        let (derived, resolver) = Promise::with_resolvers_in(&self.core.queue);
        self.register(Box::new(PromiseReaction {
            on_fulfilled,
            on_rejected,
            derived: resolver,
        }));
        derived
    }

    fn register(&self, reaction: Box<dyn Reaction<T>>) {
        let mut inner = self.core.inner.lock();
        self.mark_handled(&mut inner);
        match &mut inner.state {
            State::Pending(pending) => pending.reactions.push(reaction),
            State::Settled(settled) => self.schedule(reaction, settled.clone()),
        }
    }

    fn mark_handled(&self, inner: &mut Inner<T>) {
        if inner.handled {
            return;
        }
        inner.handled = true;
        if let State::Settled(Settled::Rejected(_)) = inner.state {
            tracker().handle(self.id());
        }
    }

    fn schedule(&self, reaction: Box<dyn Reaction<T>>, settlement: Settled<T>) {
        self.core
            .queue
            .enqueue(MicroTask::new(move || reaction.react(settlement)));
    }

    /// Performs the Pending -> settled transition; a no-op once settled.
    ///
    /// Reactions are queued while the lock is held so that a concurrent
    /// registration cannot overtake them.
    fn settle(&self, settlement: Settled<T>) {
        let wakers = {
            let mut inner = self.core.inner.lock();
            let pending = match &mut inner.state {
                State::Pending(pending) => mem::take(pending),
                State::Settled(_) => return,
            };
            inner.state = State::Settled(settlement.clone());

            if let Settled::Rejected(reason) = &settlement {
                if !inner.handled {
                    tracker().track(self.id(), self.core.queue.id(), reason.clone());
                    self.core.queue.request_cycle();
                }
            }
            trace!(
                promise = %self.id(),
                state = %settlement.status(),
                reactions = pending.reactions.len(),
                "promise settled"
            );
            for reaction in pending.reactions {
                self.schedule(reaction, settlement.clone());
            }
            pending.wakers
        };

        for waker in wakers {
            waker.wake();
        }
    }

    fn resolve_unchecked(&self, resolution: Resolution<T>) {
        match resolution {
            Resolution::Value(value) => self.settle(Settled::Fulfilled(value)),
            Resolution::Rejected(reason) => self.settle(Settled::Rejected(reason)),
            Resolution::Thenable(thenable) => self.adopt(thenable),
        }
    }

    fn adopt(&self, thenable: Box<dyn Thenable<T>>) {
        if let Some(target) = thenable.as_promise() {
            let chain = ADOPTION.lock();
            if target.leads_to(self) {
                drop(chain);
                debug!(promise = %self.id(), "promise resolved with itself");
                self.settle(Settled::Rejected(Reason::CyclicResolution));
                return;
            }
            // The target counts as handled once adopted, not once the
            // subscription runs.
            {
                let mut inner = target.core.inner.lock();
                target.mark_handled(&mut inner);
            }
            if let State::Pending(pending) = &mut self.core.inner.lock().state {
                pending.following = Some(Arc::downgrade(&target.core));
            }
        }

        let resolver = Resolver::new(self.clone());
        let fallback = resolver.clone();
        self.core.queue.enqueue(MicroTask::new(move || {
            let subscribed =
                panic::catch_unwind(AssertUnwindSafe(move || thenable.subscribe(resolver)));
            if let Err(payload) = subscribed {
                fallback.reject(Reason::from_panic(payload));
            }
        }));
    }

    /// Returns true if this promise is `target` or is (transitively)
    /// adopting it.
    fn leads_to(&self, target: &Promise<T>) -> bool {
        let mut current = Some(self.clone());
        while let Some(promise) = current {
            if promise.ptr_eq(target) {
                return true;
            }
            current = promise.following();
        }
        false
    }

    fn following(&self) -> Option<Promise<T>> {
        match &self.core.inner.lock().state {
            State::Pending(pending) => pending
                .following
                .as_ref()
                .and_then(Weak::upgrade)
                .map(|core| Promise { core }),
            State::Settled(_) => None,
        }
    }
}

impl<T: Payload> Promise<Promise<T>> {
    /// Collapses a promise of a promise into one logical settlement.
    pub fn flatten(&self) -> Promise<T> {
        self.and_then(|inner| inner)
    }
}

fn run_finally<T, F>(
    slot: &Mutex<Option<F>>,
    queue: &CallbackQueue,
    original: Settled<T>,
) -> Resolution<T>
where
    T: Payload,
    F: FnOnce() -> Resolution<()>,
{
    let Some(on_finally) = slot.lock().take() else {
        return Resolution::from(original);
    };
    match on_finally() {
        Resolution::Value(()) => Resolution::from(original),
        Resolution::Rejected(reason) => Resolution::Rejected(reason),
        Resolution::Thenable(thenable) => {
            let (gate, resolver) = Promise::<()>::with_resolvers_in(queue);
            resolver.resolve_with(Resolution::Thenable(thenable));
            let passthrough: Promise<T> =
                gate.then_with(move |()| Resolution::from(original), Resolution::Rejected);
            Resolution::from(passthrough)
        }
    }
}

impl<T: Payload> Thenable<T> for Promise<T> {
    fn subscribe(self: Box<Self>, resolver: Resolver<T>) {
        self.register(Box::new(Adoption { resolver }));
    }

    fn as_promise(&self) -> Option<&Promise<T>> {
        Some(self)
    }
}

/// Awaiting a promise yields its settlement and counts as handling a
/// rejection.
impl<T: Payload> Future for Promise<T> {
    type Output = Result<T, Reason>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.core.inner.lock();
        self.mark_handled(&mut inner);
        match &mut inner.state {
            State::Settled(settled) => Poll::Ready(settled.clone().into_result()),
            State::Pending(pending) => {
                if !pending.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    pending.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl<T: Payload> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

/// The resolve/reject capability of one promise.
///
/// Clones share a single "already resolved" flag: the first call to
/// [`resolve`](Resolver::resolve), [`reject`](Resolver::reject),
/// [`follow`](Resolver::follow) or [`resolve_with`](Resolver::resolve_with)
/// wins and every later call is ignored, even while the promise is still
/// waiting on a thenable it was resolved with.
pub struct Resolver<T> {
    promise: Promise<T>,
    already_resolved: Arc<AtomicBool>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
            already_resolved: Arc::clone(&self.already_resolved),
        }
    }
}

impl<T: Payload> Resolver<T> {
    fn new(promise: Promise<T>) -> Self {
        Self {
            promise,
            already_resolved: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The promise this resolver settles.
    pub fn promise(&self) -> &Promise<T> {
        &self.promise
    }

    /// Returns true once any resolve or reject call has been accepted.
    pub fn is_resolved(&self) -> bool {
        self.already_resolved.load(Ordering::Acquire)
    }

    /// Fulfills the promise with `value`.
    pub fn resolve(&self, value: T) {
        self.resolve_with(Resolution::Value(value));
    }

    /// Rejects the promise with `reason`.
    pub fn reject(&self, reason: impl Into<Reason>) {
        self.resolve_with(Resolution::Rejected(reason.into()));
    }

    /// Resolves the promise with a thenable, adopting its outcome.
    ///
    /// Following the promise itself, directly or through promises that
    /// adopt it, rejects with [`Reason::CyclicResolution`].
    pub fn follow<P>(&self, thenable: P)
    where
        P: Thenable<T>,
    {
        self.resolve_with(Resolution::Thenable(Box::new(thenable)));
    }

    /// Resolves the promise with any [`Resolution`].
    pub fn resolve_with(&self, resolution: Resolution<T>) {
        if self.already_resolved.swap(true, Ordering::AcqRel) {
            return;
        }
        self.promise.resolve_unchecked(resolution);
    }
}

impl<T: Payload> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("promise", &self.promise)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
