//! Unit tests for EventLoop

use async_runtime::{CallbackQueue, EventLoop, MicroTask, Promise, QueueError, Task};
use core_types::{Reason, Settled};
use std::sync::{Arc, Mutex};

#[test]
fn new_event_loop_is_empty() {
    let el = EventLoop::new();
    assert!(el.is_task_queue_empty());
    assert!(el.is_microtask_queue_empty());
}

#[test]
fn tasks_run_in_fifo_order() {
    let mut el = EventLoop::new();
    let order = Arc::new(Mutex::new(vec![]));

    for n in 1..=3 {
        let o = order.clone();
        el.enqueue_task(Task::new(move || {
            o.lock().unwrap().push(n);
            Ok(())
        }));
    }

    el.run_until_done().unwrap();
    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
}

#[test]
fn reactions_drain_between_tasks() {
    let mut el = EventLoop::new();
    let order = Arc::new(Mutex::new(vec![]));
    let (promise, resolver) = Promise::with_resolvers_in(el.callbacks());

    let o = order.clone();
    let _ = promise.then(move |label: &'static str| {
        o.lock().unwrap().push(label);
        Ok(())
    });

    let o = order.clone();
    el.enqueue_task(Task::new(move || {
        o.lock().unwrap().push("task 1");
        resolver.resolve("reaction");
        Ok(())
    }));
    let o = order.clone();
    el.enqueue_task(Task::new(move || {
        o.lock().unwrap().push("task 2");
        Ok(())
    }));

    el.run_until_done().unwrap();
    assert_eq!(*order.lock().unwrap(), vec!["task 1", "reaction", "task 2"]);
}

#[test]
fn microtasks_queued_by_microtasks_run_in_same_cycle() {
    let mut el = EventLoop::new();
    let order = Arc::new(Mutex::new(vec![]));

    let callbacks = el.callbacks().clone();
    let o = order.clone();
    el.enqueue_microtask(MicroTask::new(move || {
        o.lock().unwrap().push("outer");
        let o = o.clone();
        callbacks.defer(move || o.lock().unwrap().push("inner"));
    }));

    assert_eq!(el.run_all_microtasks(), 2);
    assert_eq!(*order.lock().unwrap(), vec!["outer", "inner"]);
}

#[test]
fn failing_task_still_drains_reactions() {
    let mut el = EventLoop::new();
    let (promise, resolver) = Promise::with_resolvers_in(el.callbacks());
    let doubled = promise.then(|n: i32| Ok(n * 2));

    el.enqueue_task(Task::new(move || {
        resolver.resolve(4);
        Err(Reason::from("task failed"))
    }));

    assert_eq!(el.run_until_done(), Err(Reason::from("task failed")));
    assert_eq!(doubled.settlement(), Some(Settled::Fulfilled(8)));
}

#[test]
fn run_until_settled_reports_pending_when_idle() {
    let mut el = EventLoop::new();
    let (promise, _resolver) = Promise::<u8>::with_resolvers_in(el.callbacks());
    el.enqueue_task(Task::new(|| Ok(())));

    assert_eq!(el.run_until_settled(&promise), Ok(None));
    assert!(el.is_task_queue_empty());
}

#[test]
fn run_until_settled_follows_chain_across_tasks() {
    let mut el = EventLoop::new();
    let (first, resolve_first) = Promise::with_resolvers_in(el.callbacks());
    let (second, resolve_second) = Promise::with_resolvers_in(el.callbacks());
    let s = second.clone();
    let chained = first.and_then(move |()| s).then(|n: u32| Ok(n + 1));

    el.enqueue_task(Task::new(move || {
        resolve_first.resolve(());
        Ok(())
    }));
    el.enqueue_task(Task::new(move || {
        resolve_second.resolve(41);
        Ok(())
    }));

    assert_eq!(el.run_until_settled(&chained), Ok(Some(Settled::Fulfilled(42))));
}

#[test]
fn with_callbacks_drains_a_shared_manual_queue() {
    let shared = CallbackQueue::manual();
    let mut el = EventLoop::with_callbacks(shared.clone()).unwrap();
    let (promise, resolver) = Promise::with_resolvers_in(&shared);
    let doubled = promise.then(|n: i32| Ok(n * 2));

    el.enqueue_task(Task::new(move || {
        resolver.resolve(21);
        Ok(())
    }));

    assert_eq!(el.run_until_settled(&doubled), Ok(Some(Settled::Fulfilled(42))));
    assert!(shared.is_empty());
}

#[test]
fn with_callbacks_rejects_worker_queue() {
    let worker = CallbackQueue::worker().unwrap();
    let id = worker.id();

    match EventLoop::with_callbacks(worker) {
        Err(QueueError::NotManual(rejected)) => assert_eq!(rejected, id),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("worker queue accepted by event loop"),
    }
}
