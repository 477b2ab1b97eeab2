//! Promise states and settlements.

use crate::Reason;
use std::fmt;

/// The state of a promise.
///
/// Promises start out pending and transition exactly once to fulfilled or
/// rejected; a settled promise never changes state again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromiseState {
    /// Neither fulfilled nor rejected yet
    Pending,
    /// Settled with a value
    Fulfilled,
    /// Settled with a reason
    Rejected,
}

impl PromiseState {
    /// Returns true once the promise has left the pending state.
    pub fn is_settled(self) -> bool {
        !matches!(self, PromiseState::Pending)
    }

    /// Lowercase status name, as used in settlement reports.
    pub fn as_str(self) -> &'static str {
        match self {
            PromiseState::Pending => "pending",
            PromiseState::Fulfilled => "fulfilled",
            PromiseState::Rejected => "rejected",
        }
    }
}

impl fmt::Display for PromiseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The final outcome of a promise.
///
/// Also the per-slot status record produced by `all_settled`.
///
/// # Examples
///
/// ```
/// use core_types::{PromiseState, Settled};
///
/// let outcome = Settled::Fulfilled(1);
/// assert_eq!(outcome.status(), PromiseState::Fulfilled);
/// assert_eq!(outcome.into_result(), Ok(1));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Settled<T> {
    /// Fulfilled with a value
    Fulfilled(T),
    /// Rejected with a reason
    Rejected(Reason),
}

impl<T> Settled<T> {
    /// The state tag of this outcome.
    pub fn status(&self) -> PromiseState {
        match self {
            Settled::Fulfilled(_) => PromiseState::Fulfilled,
            Settled::Rejected(_) => PromiseState::Rejected,
        }
    }

    /// The fulfillment value, if fulfilled.
    pub fn value(&self) -> Option<&T> {
        match self {
            Settled::Fulfilled(value) => Some(value),
            Settled::Rejected(_) => None,
        }
    }

    /// The rejection reason, if rejected.
    pub fn reason(&self) -> Option<&Reason> {
        match self {
            Settled::Fulfilled(_) => None,
            Settled::Rejected(reason) => Some(reason),
        }
    }

    /// Converts into a `Result`.
    pub fn into_result(self) -> Result<T, Reason> {
        match self {
            Settled::Fulfilled(value) => Ok(value),
            Settled::Rejected(reason) => Err(reason),
        }
    }
}

impl<T> From<Result<T, Reason>> for Settled<T> {
    fn from(result: Result<T, Reason>) -> Self {
        match result {
            Ok(value) => Settled::Fulfilled(value),
            Err(reason) => Settled::Rejected(reason),
        }
    }
}
