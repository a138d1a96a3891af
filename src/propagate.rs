use std::fmt;

use tracing::debug;

use crate::promise::{OnError, OnValue, Promise, State};
use crate::readable::Readable;
use crate::{Reason, Value};

/// What a handler hands back to the promise it settles.
pub enum Next<T, E> {
    Value(T),
    Fail(E),
    /// A trusted promise whose eventual outcome is adopted.
    Promise(Promise<T, E>),
    /// A foreign future-like whose eventual outcome is adopted.
    Foreign(Box<dyn Readable<T, E>>),
}

impl<T, E> Next<T, E> {
    pub fn foreign<R>(readable: R) -> Self
    where
        R: Readable<T, E> + 'static,
    {
        Next::Foreign(Box::new(readable))
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for Next<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Next::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Next::Fail(reason) => f.debug_tuple("Fail").field(reason).finish(),
            Next::Promise(promise) => f.debug_tuple("Promise").field(promise).finish(),
            Next::Foreign(_) => f.write_str("Foreign(..)"),
        }
    }
}

/// Conversion from a handler's return value into a [`Next`].
///
/// `Err` is how a handler fails; returning a promise auto-lifts it.
pub trait IntoNext<E> {
    type Value: Value;

    fn into_next(self) -> Next<Self::Value, E>;
}

impl<T: Value, E: Reason> IntoNext<E> for Result<T, E> {
    type Value = T;

    fn into_next(self) -> Next<T, E> {
        match self {
            Ok(value) => Next::Value(value),
            Err(reason) => Next::Fail(reason),
        }
    }
}

impl<T: Value, E: Reason> IntoNext<E> for Promise<T, E> {
    type Value = T;

    fn into_next(self) -> Next<T, E> {
        Next::Promise(self)
    }
}

impl<T: Value, E: Reason> IntoNext<E> for Next<T, E> {
    type Value = T;

    fn into_next(self) -> Next<T, E> {
        self
    }
}

/// Route `next` to a pair of callbacks, waiting on nested promises.
pub(crate) fn forward<T: Value, E: Reason>(
    next: Next<T, E>,
    on_value: OnValue<T>,
    on_error: OnError<E>,
) {
    match next {
        Next::Value(value) => on_value(value),
        Next::Fail(reason) => on_error(reason),
        Next::Promise(nested) => {
            debug!(nested = %nested.id(), "lifting nested promise");
            nested.read(on_value, on_error);
        }
        Next::Foreign(nested) => {
            debug!("lifting foreign promise");
            nested.read_with(on_value, on_error);
        }
    }
}

/// Settle an existing promise from a handler result.
pub(crate) fn settle<T: Value, E: Reason>(destination: &Promise<T, E>, next: Next<T, E>) {
    let (done, fail) = (destination.clone(), destination.clone());
    forward(
        next,
        Box::new(move |value| {
            done.write(value);
        }),
        Box::new(move |reason| {
            fail.error(reason);
        }),
    );
}

/// Pipe the eventual outcome of any readable into `destination`.
pub(crate) fn pipe<T, E, R>(source: &R, destination: &Promise<T, E>)
where
    T: Value,
    E: Reason,
    R: Readable<T, E> + ?Sized,
{
    let (done, fail) = (destination.clone(), destination.clone());
    source.read_with(
        Box::new(move |value| {
            done.write(value);
        }),
        Box::new(move |reason| {
            fail.error(reason);
        }),
    );
}

/// Turn a handler result computed against an already settled `source` into a
/// trusted promise.
pub(crate) fn run<T, U, E>(source: &Promise<T, E>, next: Next<U, E>) -> Promise<U, E>
where
    T: Value,
    U: Value,
    E: Reason,
{
    match next {
        Next::Value(value) => source.sibling(State::Done(value)),
        Next::Promise(nested) => nested,
        next => {
            let result = source.sibling(State::Pending);
            settle(&result, next);
            result
        }
    }
}
