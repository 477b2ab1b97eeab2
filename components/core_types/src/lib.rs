//! Core promise value types and rejection reasons.
//!
//! This crate provides the vocabulary shared by the promise runtime and its
//! hosts: what a settled promise holds and what it can be rejected with.
//!
//! # Overview
//!
//! - [`PromiseState`] - Pending / fulfilled / rejected tag
//! - [`Settled`] - Final outcome of a promise, exactly one payload per tag
//! - [`Reason`] - Rejection value carried by a rejected promise
//! - [`AggregateError`] - Every rejection reason collected by `any`
//!
//! # Examples
//!
//! ```
//! use core_types::{PromiseState, Reason, Settled};
//!
//! let outcome: Settled<i32> = Settled::Rejected(Reason::new("boom"));
//! assert_eq!(outcome.status(), PromiseState::Rejected);
//! assert_eq!(outcome.reason().map(ToString::to_string), Some("boom".to_string()));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod settled;

pub use error::{AggregateError, Reason};
pub use settled::{PromiseState, Settled};
