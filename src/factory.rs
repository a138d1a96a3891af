use std::fmt;
use std::sync::Arc;

use crate::deferred::{self, Callback, ErrorFn, WriteFn};
use crate::diagnostics::{Diagnostics, GracePeriod};
use crate::promise::{Promise, State};
use crate::propagate::{self, IntoNext};
use crate::readable::Readable;
use crate::{Reason, Value};

/// Creates promises that share one diagnostics policy.
///
/// Every promise derived from a factory-made promise, through `then` and
/// friends, inherits the same policy.
///
/// ```
/// use std::sync::Arc;
/// use promise_core::{Factory, GracePeriod, ManualScheduler};
///
/// let scheduler = Arc::new(ManualScheduler::new());
/// let factory = Factory::<String>::new(GracePeriod::new(scheduler.clone()));
/// factory.pending::<i32>().error("unheard".into());
/// assert_eq!(scheduler.len(), 1);
/// ```
pub struct Factory<E> {
    diagnostics: Arc<dyn Diagnostics<E>>,
}

impl<E> Clone for Factory<E> {
    fn clone(&self) -> Self {
        Self {
            diagnostics: Arc::clone(&self.diagnostics),
        }
    }
}

impl<E> fmt::Debug for Factory<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory").finish_non_exhaustive()
    }
}

impl<E: Reason> Default for Factory<E> {
    fn default() -> Self {
        Self::new(GracePeriod::default())
    }
}

impl<E: Reason> Factory<E> {
    pub fn new<D>(diagnostics: D) -> Self
    where
        D: Diagnostics<E> + 'static,
    {
        Self::with_diagnostics(Arc::new(diagnostics))
    }

    pub fn with_diagnostics(diagnostics: Arc<dyn Diagnostics<E>>) -> Self {
        Self { diagnostics }
    }

    fn make<T: Value>(&self, state: State<T, E>) -> Promise<T, E> {
        Promise::with_state(state, Arc::clone(&self.diagnostics))
    }

    pub fn pending<T: Value>(&self) -> Promise<T, E> {
        self.make(State::Pending)
    }

    pub fn done<T: Value>(&self, value: T) -> Promise<T, E> {
        self.make(State::Done(value))
    }

    /// Alias of [`Factory::done`].
    pub fn wrap<T: Value>(&self, value: T) -> Promise<T, E> {
        self.done(value)
    }

    pub fn failed<T: Value>(&self, reason: E) -> Promise<T, E> {
        self.make(State::Fail(reason))
    }

    /// See [`Promise::from_write_error`].
    pub fn from_write_error<T, F>(&self, producer: F) -> Promise<T, E>
    where
        T: Value,
        F: FnOnce(WriteFn<T>, ErrorFn<E>) -> Result<(), E> + Send + 'static,
    {
        self.make(State::Awaiting(deferred::explicit(producer)))
    }

    /// See [`Promise::from_callback`].
    pub fn from_callback<T, F>(&self, producer: F) -> Promise<T, E>
    where
        T: Value,
        F: FnOnce(Callback<T, E>) -> Result<(), E> + Send + 'static,
    {
        self.make(State::Awaiting(deferred::callback(producer)))
    }

    /// See [`Promise::from_sync`].
    pub fn from_sync<T, F, R>(&self, producer: F) -> Promise<T, E>
    where
        T: Value,
        F: FnOnce() -> R + Send + 'static,
        R: IntoNext<E, Value = T>,
    {
        self.make(State::Awaiting(deferred::synchronous(producer)))
    }

    /// A trusted promise for any readable.
    ///
    /// Trusted promises come back as is; known outcomes are wrapped; foreign
    /// values are piped into a fresh promise.
    pub fn coerce<T, R>(&self, value: &R) -> Promise<T, E>
    where
        T: Value,
        R: Readable<T, E> + ?Sized,
    {
        if let Some(promise) = value.trusted() {
            return promise;
        }
        match value.peek() {
            Some(Ok(value)) => self.done(value),
            Some(Err(reason)) => self.failed(reason),
            None => {
                let trusted = self.pending();
                propagate::pipe(value, &trusted);
                trusted
            }
        }
    }
}
