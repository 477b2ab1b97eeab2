//! End-to-end promise pipelines driven by the event loop
//!
//! Covers chaining, recovery, adoption and the combinators working
//! together on a host-drained queue.

use async_runtime::{combinators, EventLoop, Promise, Resolution, Resolver, Task, ThenFn};
use core_types::{AggregateError, Reason, Settled};
use std::sync::{Arc, Mutex};

/// Simulated request that completes in a later task.
fn fetch(
    el: &mut EventLoop,
    url: &'static str,
    outcome: Result<u32, &'static str>,
) -> Promise<u32> {
    let (promise, resolver) = Promise::with_resolvers_in(el.callbacks());
    el.enqueue_task(Task::new(move || {
        match outcome {
            Ok(size) => resolver.resolve(size),
            Err(message) => resolver.reject(format!("{url}: {message}")),
        }
        Ok(())
    }));
    promise
}

#[test]
fn pipeline_recovers_and_continues() {
    let mut el = EventLoop::new();
    let sizes = fetch(&mut el, "/a", Ok(10))
        .then(|size| {
            if size > 5 {
                Err(Reason::from("too large"))
            } else {
                Ok(size)
            }
        })
        .catch(|reason| {
            assert_eq!(reason, Reason::from("too large"));
            Ok(5)
        })
        .then(|size| Ok(size * 2));

    let settled = el.run_until_settled(&sizes).unwrap();
    assert_eq!(settled, Some(Settled::Fulfilled(10)));
}

#[test]
fn all_over_fetches_keeps_input_order() {
    let mut el = EventLoop::new();
    let requests = vec![
        fetch(&mut el, "/slow", Ok(3)),
        fetch(&mut el, "/fast", Ok(1)),
        fetch(&mut el, "/mid", Ok(2)),
    ];
    let total =
        combinators::all(el.callbacks(), requests).then(|sizes| Ok(sizes.iter().sum::<u32>()));

    assert_eq!(el.run_until_settled(&total), Ok(Some(Settled::Fulfilled(6))));
}

#[test]
fn all_rejects_without_waiting_for_pending_inputs() {
    let mut el = EventLoop::new();
    let (never, _keep) = Promise::with_resolvers_in(el.callbacks());
    let failing = fetch(&mut el, "/broken", Err("503"));
    let all = combinators::all(el.callbacks(), vec![never, failing]);
    let _handled = all.catch(|_| Ok(vec![]));

    let settled = el.run_until_settled(&all).unwrap();
    assert_eq!(settled, Some(Settled::Rejected(Reason::from("/broken: 503"))));
}

#[test]
fn any_falls_back_to_mirror() {
    let mut el = EventLoop::new();
    let primary = fetch(&mut el, "/primary", Err("timeout"));
    let mirror = fetch(&mut el, "/mirror", Ok(64));
    let first = combinators::any(el.callbacks(), vec![primary, mirror]);

    assert_eq!(el.run_until_settled(&first), Ok(Some(Settled::Fulfilled(64))));
}

#[test]
fn any_reports_every_failure() {
    let mut el = EventLoop::new();
    let a = fetch(&mut el, "/a", Err("down"));
    let b = fetch(&mut el, "/b", Err("gone"));
    let first = combinators::any(el.callbacks(), vec![a, b]);
    let reasons = first.catch_with(|reason| match reason.as_aggregate() {
        Some(aggregate) => Resolution::Value(aggregate.len() as u32),
        None => Resolution::Rejected(reason),
    });

    assert_eq!(el.run_until_settled(&reasons), Ok(Some(Settled::Fulfilled(2))));
    assert_eq!(
        first.settlement(),
        Some(Settled::Rejected(Reason::from(AggregateError::new(vec![
            Reason::from("/a: down"),
            Reason::from("/b: gone"),
        ]))))
    );
}

#[test]
fn race_against_timeout_task() {
    let mut el = EventLoop::new();
    let (timeout, fire) = Promise::<u32>::with_resolvers_in(el.callbacks());
    let response = fetch(&mut el, "/quick", Ok(7));
    el.enqueue_task(Task::new(move || {
        fire.reject("timed out");
        Ok(())
    }));

    let winner = combinators::race(el.callbacks(), vec![response, timeout]);
    el.run_until_done().unwrap();
    assert_eq!(winner.settlement(), Some(Settled::Fulfilled(7)));
}

#[test]
fn all_settled_never_rejects() {
    let mut el = EventLoop::new();
    let ok = fetch(&mut el, "/ok", Ok(1));
    let bad = fetch(&mut el, "/bad", Err("e"));
    let results = combinators::all_settled(el.callbacks(), vec![ok, bad]);

    assert_eq!(
        el.run_until_settled(&results),
        Ok(Some(Settled::Fulfilled(vec![
            Settled::Fulfilled(1),
            Settled::Rejected(Reason::from("/bad: e")),
        ])))
    );
}

#[test]
fn finally_observes_both_outcomes() {
    let mut el = EventLoop::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let l = log.clone();
    let ok = fetch(&mut el, "/ok", Ok(1)).finally(move || {
        l.lock().unwrap().push("ok cleanup");
        Ok(())
    });
    let l = log.clone();
    let bad = fetch(&mut el, "/bad", Err("x")).finally(move || {
        l.lock().unwrap().push("bad cleanup");
        Ok(())
    });
    let _handled = bad.catch(|_| Ok(0));

    el.run_until_done().unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["ok cleanup", "bad cleanup"]);
    assert_eq!(ok.settlement(), Some(Settled::Fulfilled(1)));
    assert_eq!(bad.settlement(), Some(Settled::Rejected(Reason::from("/bad: x"))));
}

#[test]
fn foreign_thenable_adopted_mid_chain() {
    let mut el = EventLoop::new();
    let callbacks = el.callbacks().clone();
    let chained = fetch(&mut el, "/id", Ok(3)).then_with(
        move |id| {
            let queue = callbacks.clone();
            Resolution::thenable(ThenFn(move |resolver: Resolver<String>| {
                queue.defer(move || resolver.resolve(format!("user-{id}")));
            }))
        },
        Resolution::Rejected,
    );

    assert_eq!(
        el.run_until_settled(&chained),
        Ok(Some(Settled::Fulfilled("user-3".to_string())))
    );
}

#[test]
fn self_adopting_chain_is_rejected_not_hung() {
    let mut el = EventLoop::new();
    let (promise, resolver) = Promise::<u32>::with_resolvers_in(el.callbacks());
    let p = promise.clone();
    el.enqueue_task(Task::new(move || {
        resolver.follow(p);
        Ok(())
    }));
    let recovered = promise.catch(|reason| if reason.is_cyclic() { Ok(0) } else { Err(reason) });

    assert_eq!(el.run_until_settled(&recovered), Ok(Some(Settled::Fulfilled(0))));
}
