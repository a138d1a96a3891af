//! Single-assignment promises with synchronous continuations.
//!
//! A [`Promise`] eventually holds either a value or a failure reason. Observers
//! attached while it is pending run in attachment order when it settles;
//! observers attached afterwards run immediately, on the caller's stack.
//!
//! ```
//! use promise_core::Promise;
//!
//! let promise = Promise::<i32, String>::new();
//! let doubled = promise.then(|n| Ok(n * 2));
//! promise.write(21);
//! assert_eq!(doubled.outcome(), Some(Ok(42)));
//! ```
use std::fmt::Debug;

use thiserror::Error;

mod deferred;
pub mod diagnostics;
mod factory;
mod interop;
mod promise;
mod propagate;
mod readable;
#[cfg(test)]
mod test_utils;
mod wait;

pub use deferred::{Callback, ErrorFn, WriteFn};
pub use diagnostics::{
    Diagnostics, GracePeriod, ManualScheduler, Scheduler, Task, ThreadScheduler, DEFAULT_GRACE,
};
pub use factory::Factory;
pub use interop::{coerce, read, transfer, unbox, when, when_else, When};
pub use promise::{Lookup, OnError, OnValue, Promise, PromiseId, Status};
pub use propagate::{IntoNext, Next};
pub use readable::Readable;
pub use wait::Wait;

/// Anything a promise can hold as its success value.
pub trait Value: Clone + Send + 'static {}

impl<T: Clone + Send + 'static> Value for T {}

/// Anything a promise can hold as its failure reason.
pub trait Reason: Clone + Send + Debug + 'static {}

impl<E: Clone + Send + Debug + 'static> Reason for E {}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("can't unbox a pending promise")]
    Pending,
}
