//! Rejection reasons.
//!
//! A rejected promise always carries a [`Reason`]. Callers reject with a
//! message or a wrapped error; the runtime produces the remaining variants
//! itself when it detects a chaining cycle, catches a panicking handler, or
//! sees every input of an `any` combinator reject.

use std::any::Any;
use std::sync::Arc;
use thiserror::Error;

/// The value a promise is rejected with.
///
/// # Examples
///
/// ```
/// use core_types::Reason;
///
/// let reason = Reason::from("timed out");
/// assert_eq!(reason.to_string(), "timed out");
/// assert!(!reason.is_cyclic());
/// ```
#[derive(Debug, Clone, Error)]
pub enum Reason {
    /// Rejected with a plain message
    #[error("{0}")]
    Message(String),
    /// Rejected with an arbitrary error value
    #[error("{0}")]
    Error(Arc<dyn std::error::Error + Send + Sync>),
    /// A promise was resolved with itself, directly or through a chain of
    /// promises leading back to it
    #[error("TypeError: Chaining cycle detected for promise")]
    CyclicResolution,
    /// A resolver or handler panicked; carries the panic message
    #[error("handler panicked: {0}")]
    Panic(String),
    /// Every input of an `any` combinator was rejected
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl Reason {
    /// Creates a reason from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Reason::Message(message.into())
    }

    /// Wraps an error value as a rejection reason.
    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Reason::Error(Arc::new(error))
    }

    /// Converts a caught panic payload into a rejection reason.
    ///
    /// Payloads raised by `panic!` with a literal or formatted message keep
    /// that message; anything else is reported as an opaque panic.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => (*message).to_string(),
                Err(_) => "non-string panic payload".to_string(),
            },
        };
        Reason::Panic(message)
    }

    /// Returns true if this is the self-resolution error.
    pub fn is_cyclic(&self) -> bool {
        matches!(self, Reason::CyclicResolution)
    }

    /// Returns true if a resolver or handler panicked.
    pub fn is_panic(&self) -> bool {
        matches!(self, Reason::Panic(_))
    }

    /// Returns the aggregate carried by an `any` rejection.
    pub fn as_aggregate(&self) -> Option<&AggregateError> {
        match self {
            Reason::Aggregate(aggregate) => Some(aggregate),
            _ => None,
        }
    }

    /// Downcasts a wrapped error to its concrete type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            Reason::Error(error) => error.downcast_ref::<E>(),
            _ => None,
        }
    }
}

impl PartialEq for Reason {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Reason::Message(a), Reason::Message(b)) => a == b,
            (Reason::Error(a), Reason::Error(b)) => {
                Arc::ptr_eq(a, b) || a.to_string() == b.to_string()
            }
            (Reason::CyclicResolution, Reason::CyclicResolution) => true,
            (Reason::Panic(a), Reason::Panic(b)) => a == b,
            (Reason::Aggregate(a), Reason::Aggregate(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for Reason {
    fn from(message: &str) -> Self {
        Reason::Message(message.to_string())
    }
}

impl From<String> for Reason {
    fn from(message: String) -> Self {
        Reason::Message(message)
    }
}

/// Rejection produced by `any` once every input has rejected.
///
/// The constituent reasons are kept in input order. An `any` over no inputs
/// rejects with an empty aggregate.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("AggregateError: All promises were rejected")]
pub struct AggregateError {
    errors: Vec<Reason>,
}

impl AggregateError {
    /// Creates an aggregate from reasons in input order.
    pub fn new(errors: Vec<Reason>) -> Self {
        Self { errors }
    }

    /// The collected reasons, one per input.
    pub fn errors(&self) -> &[Reason] {
        &self.errors
    }

    /// Consumes the aggregate, returning its reasons.
    pub fn into_errors(self) -> Vec<Reason> {
        self.errors
    }

    /// Number of collected reasons.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns true if the aggregate came from an empty input.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}
