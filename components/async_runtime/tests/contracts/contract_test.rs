//! Contract tests for async_runtime component
//!
//! These tests pin the public surface hosts and other components rely on.

use async_runtime::{
    combinators, CallbackQueue, DispatchMode, EventLoop, IntoPromise, MicroTask, Promise,
    PromiseState, QueueConfig, Resolution, Resolver, Task, ThenFn,
};
use core_types::{Reason, Settled};

mod promise_contract {
    use super::*;

    #[test]
    fn promise_handles_are_thread_safe() {
        fn assert_bounds<T: Clone + Send + Sync + 'static>() {}
        assert_bounds::<Promise<String>>();
        assert_bounds::<Resolver<String>>();
        assert_bounds::<CallbackQueue>();
    }

    #[test]
    fn then_returns_pending_derived_promise_immediately() {
        let queue = CallbackQueue::manual();
        let derived = Promise::resolved_in(&queue, 1).then(|n| Ok(n + 1));
        assert_eq!(derived.state(), PromiseState::Pending);
    }

    #[test]
    fn catch_and_finally_return_promises_of_same_type() {
        let queue = CallbackQueue::manual();
        let base: Promise<u8> = Promise::resolved_in(&queue, 1);
        let _: Promise<u8> = base.catch(|_| Ok(0));
        let _: Promise<u8> = base.finally(|| Ok(()));
    }

    #[test]
    fn promise_is_a_future_of_result() {
        fn assert_future<F: std::future::Future<Output = Result<u8, Reason>>>(_: F) {}
        assert_future(Promise::resolved_in(&CallbackQueue::manual(), 1u8));
    }

    #[test]
    fn resolution_accepts_results_settlements_and_thenables() {
        let queue = CallbackQueue::manual();
        let _: Resolution<u8> = Resolution::from(Ok::<u8, Reason>(1));
        let _: Resolution<u8> = Settled::<u8>::Rejected(Reason::from("r")).into();
        let _: Resolution<u8> = Promise::resolved_in(&queue, 1u8).into();
        let _: Resolution<u8> = Resolution::thenable(ThenFn(|r: Resolver<u8>| r.resolve(1)));
    }

    #[test]
    fn into_promise_keeps_existing_promise() {
        let queue = CallbackQueue::manual();
        let promise = Promise::resolved_in(&queue, 'p');
        let same = promise.clone().into_promise(&queue);
        assert!(promise.ptr_eq(&same));
    }
}

mod combinator_contract {
    use super::*;

    #[test]
    fn combinators_take_a_queue_and_an_iterable() {
        let queue = CallbackQueue::manual();
        let _: Promise<Vec<u8>> = combinators::all(&queue, Vec::<Promise<u8>>::new());
        let _: Promise<u8> = combinators::race(&queue, Vec::<Promise<u8>>::new());
        let any: Promise<u8> = combinators::any(&queue, Vec::<Promise<u8>>::new());
        let _handled = any.catch(|_| Ok(0));
        let _: Promise<Vec<Settled<u8>>> =
            combinators::all_settled(&queue, Vec::<Promise<u8>>::new());
    }
}

mod queue_contract {
    use super::*;

    #[test]
    fn default_config_is_worker_mode() {
        let config = QueueConfig::default();
        assert_eq!(config.mode, DispatchMode::Worker);
        assert!(config.report_unhandled);
    }

    #[test]
    fn enqueue_accepts_microtask() {
        let queue = CallbackQueue::manual();
        queue.enqueue(MicroTask::new(|| {}));
        assert_eq!(queue.len(), 1);
    }
}

mod event_loop_contract {
    use super::*;

    #[test]
    fn event_loop_enqueue_task_accepts_task() {
        let mut event_loop = EventLoop::new();
        event_loop.enqueue_task(Task::new(|| Ok(())));
        assert!(!event_loop.is_task_queue_empty());
    }

    #[test]
    fn event_loop_callbacks_are_manual() {
        let event_loop = EventLoop::default();
        assert_eq!(event_loop.callbacks().mode(), DispatchMode::Manual);
    }
}
