//! Unit tests for PromiseState and Settled

use core_types::{PromiseState, Reason, Settled};

#[test]
fn test_state_names() {
    assert_eq!(PromiseState::Pending.as_str(), "pending");
    assert_eq!(PromiseState::Fulfilled.as_str(), "fulfilled");
    assert_eq!(PromiseState::Rejected.as_str(), "rejected");
}

#[test]
fn test_fulfilled_outcome() {
    let outcome = Settled::Fulfilled("done".to_string());
    assert_eq!(outcome.status(), PromiseState::Fulfilled);
    assert_eq!(outcome.value().map(String::as_str), Some("done"));
    assert!(outcome.reason().is_none());
}

#[test]
fn test_rejected_outcome_into_result() {
    let outcome: Settled<u8> = Settled::Rejected(Reason::from("e"));
    assert_eq!(outcome.into_result(), Err(Reason::from("e")));
}

#[test]
fn test_outcome_from_result() {
    let ok: Settled<u8> = Ok(3).into();
    let err: Settled<u8> = Err(Reason::from("no")).into();
    assert_eq!(ok, Settled::Fulfilled(3));
    assert_eq!(err.status(), PromiseState::Rejected);
}
