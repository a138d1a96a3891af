//! Functions that treat plain outcomes, trusted promises and foreign
//! future-likes alike.
use std::sync::Arc;

use parking_lot::Mutex;

use crate::factory::Factory;
use crate::promise::Promise;
use crate::propagate::{self, IntoNext, Next};
use crate::readable::Readable;
use crate::{Error, Reason, Value};

/// Read `value`: delegates to its read capability, so plain outcomes call back
/// synchronously.
pub fn read<T, E, R, F, G>(value: &R, on_value: F, on_error: G)
where
    R: Readable<T, E> + ?Sized,
    F: FnOnce(T) + Send + 'static,
    G: FnOnce(E) + Send + 'static,
{
    value.read_with(Box::new(on_value), Box::new(on_error));
}

/// A trusted promise for `value`, using the default diagnostics policy for any
/// promise it has to create.
pub fn coerce<T, E, R>(value: &R) -> Promise<T, E>
where
    T: Value,
    E: Reason,
    R: Readable<T, E> + ?Sized,
{
    Factory::default().coerce(value)
}

/// Pipe the eventual outcome of `source` into an existing promise.
pub fn transfer<T, E, R>(source: &R, destination: &Promise<T, E>)
where
    T: Value,
    E: Reason,
    R: Readable<T, E> + ?Sized,
{
    propagate::pipe(source, destination);
}

/// Result of [`when`]: the raw handler result when the input was already
/// settled, otherwise a promise for it.
#[derive(Debug)]
pub enum When<T, E> {
    Ready(T),
    Failed(E),
    Promise(Promise<T, E>),
}

impl<T: Value, E: Reason> When<T, E> {
    fn from_next(next: Next<T, E>, factory: impl FnOnce() -> Factory<E>) -> Self {
        match next {
            Next::Value(value) => When::Ready(value),
            Next::Fail(reason) => When::Failed(reason),
            Next::Promise(promise) => When::Promise(promise),
            Next::Foreign(foreign) => When::Promise(factory().coerce(&foreign)),
        }
    }

    pub fn is_ready(&self) -> bool {
        !matches!(self, When::Promise(_))
    }

    /// The raw result, or `None` if it is still a promise.
    pub fn ready(self) -> Option<Result<T, E>> {
        match self {
            When::Ready(value) => Some(Ok(value)),
            When::Failed(reason) => Some(Err(reason)),
            When::Promise(_) => None,
        }
    }

    pub fn into_promise(self) -> Promise<T, E> {
        match self {
            When::Ready(value) => Promise::wrap(value),
            When::Failed(reason) => Promise::failed(reason),
            When::Promise(promise) => promise,
        }
    }
}

/// Apply `on_value` to `value` without allocating when it is already known.
///
/// ```
/// use promise_core::{when, When};
///
/// let next = when(&Ok::<i32, String>(42), |v| Ok(v + 1));
/// assert!(matches!(next, When::Ready(43)));
/// ```
pub fn when<T, E, R, F, O>(value: &R, on_value: F) -> When<O::Value, E>
where
    T: Value,
    E: Reason,
    R: Readable<T, E> + ?Sized,
    F: FnOnce(T) -> O + Send + 'static,
    O: IntoNext<E>,
{
    resolve_when(value, false, move |outcome| match outcome {
        Ok(value) => on_value(value).into_next(),
        Err(reason) => Next::Fail(reason),
    })
}

/// [`when`] with a failure handler as well.
pub fn when_else<T, E, R, F, G, O, P>(value: &R, on_value: F, on_error: G) -> When<O::Value, E>
where
    T: Value,
    E: Reason,
    R: Readable<T, E> + ?Sized,
    F: FnOnce(T) -> O + Send + 'static,
    G: FnOnce(E) -> P + Send + 'static,
    O: IntoNext<E>,
    P: IntoNext<E, Value = O::Value>,
{
    resolve_when(value, true, move |outcome| match outcome {
        Ok(value) => on_value(value).into_next(),
        Err(reason) => on_error(reason).into_next(),
    })
}

fn resolve_when<T, U, E, R, H>(value: &R, handles_error: bool, handler: H) -> When<U, E>
where
    T: Value,
    U: Value,
    E: Reason,
    R: Readable<T, E> + ?Sized,
    H: FnOnce(Result<T, E>) -> Next<U, E> + Send + 'static,
{
    let source = match value.trusted() {
        Some(promise) => promise,
        None => match value.peek() {
            Some(outcome) => return When::from_next(handler(outcome), Factory::default),
            None => coerce(value),
        },
    };
    match source.settled(handles_error) {
        Some(outcome) => {
            let diagnostics = Arc::clone(source.diagnostics());
            When::from_next(handler(outcome), move || {
                Factory::with_diagnostics(diagnostics)
            })
        }
        None => When::Promise(source.chain(handles_error, move |_, outcome| handler(outcome))),
    }
}

/// The settled outcome of `value`.
///
/// Fails with [`Error::Pending`] while the outcome isn't known yet. A pending
/// foreign value keeps the callbacks passed to its `read_with`; they settle a
/// slot that is no longer read.
pub fn unbox<T, E, R>(value: &R) -> Result<Result<T, E>, Error>
where
    T: Value,
    E: Reason,
    R: Readable<T, E> + ?Sized,
{
    if let Some(promise) = value.trusted() {
        return promise.settled(true).ok_or(Error::Pending);
    }
    if let Some(outcome) = value.peek() {
        return Ok(outcome);
    }
    let slot = Arc::new(Mutex::new(None));
    let (done, fail) = (Arc::clone(&slot), Arc::clone(&slot));
    value.read_with(
        Box::new(move |value| *done.lock() = Some(Ok(value))),
        Box::new(move |reason| *fail.lock() = Some(Err(reason))),
    );
    let outcome = slot.lock().take();
    outcome.ok_or(Error::Pending)
}
