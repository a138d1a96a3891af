use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::deferred::{ErrorFn, Producer, WriteFn};
use crate::diagnostics::Diagnostics;
use crate::factory::Factory;
use crate::propagate::{self, IntoNext, Next};
use crate::{Reason, Value};

/// Success callback handed to a [`Readable`](crate::Readable).
pub type OnValue<T> = Box<dyn FnOnce(T) + Send>;
/// Failure callback handed to a [`Readable`](crate::Readable).
pub type OnError<E> = Box<dyn FnOnce(E) + Send>;

pub(crate) type Observer<T, E> = Box<dyn FnOnce(&Promise<T, E>, Result<T, E>) + Send>;

/// Process-unique identity of a promise, shared by all of its clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PromiseId(u64);

impl PromiseId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "promise#{}", self.0)
    }
}

/// Where a promise is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Lazy promise whose producer hasn't been started yet.
    Awaiting,
    Pending,
    Done,
    Fail,
}

pub(crate) enum State<T, E> {
    Awaiting(Producer<T, E>),
    Pending,
    Done(T),
    Fail(E),
}

impl<T, E> State<T, E> {
    fn status(&self) -> Status {
        match self {
            State::Awaiting(_) => Status::Awaiting,
            State::Pending => Status::Pending,
            State::Done(_) => Status::Done,
            State::Fail(_) => Status::Fail,
        }
    }
}

enum Listener<T, E> {
    /// Raw observer callbacks with no promise of their own.
    Reader {
        handles_error: bool,
        observer: Observer<T, E>,
    },
    /// A transform whose outcome settles a child promise.
    Continuation(Observer<T, E>),
}

struct Inner<T, E> {
    state: State<T, E>,
    listeners: Vec<Listener<T, E>>,
}

/// A single-assignment container for a value of `T` or a failure of `E`.
///
/// Clones share the same state. Settling is write-once: the first `write` or
/// `error` wins and every later attempt is ignored.
pub struct Promise<T, E> {
    id: PromiseId,
    inner: Arc<Mutex<Inner<T, E>>>,
    diagnostics: Arc<dyn Diagnostics<E>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Arc::clone(&self.inner),
            diagnostics: Arc::clone(&self.diagnostics),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}

impl<T, E> PartialEq for Promise<T, E> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T, E> Eq for Promise<T, E> {}

impl<T, E> Promise<T, E> {
    pub fn id(&self) -> PromiseId {
        self.id
    }

    pub fn status(&self) -> Status {
        self.inner.lock().state.status()
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.status(), Status::Done | Status::Fail)
    }

    /// Whether both handles point at the same promise.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn diagnostics(&self) -> &Arc<dyn Diagnostics<E>> {
        &self.diagnostics
    }
}

impl<T: Value, E: Reason> Default for Promise<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Value, E: Reason> Promise<T, E> {
    pub(crate) fn with_state(state: State<T, E>, diagnostics: Arc<dyn Diagnostics<E>>) -> Self {
        Self {
            id: PromiseId::next(),
            inner: Arc::new(Mutex::new(Inner {
                state,
                listeners: Vec::new(),
            })),
            diagnostics,
        }
    }

    /// A promise sharing this one's diagnostics policy.
    pub(crate) fn sibling<U: Value>(&self, state: State<U, E>) -> Promise<U, E> {
        Promise::with_state(state, Arc::clone(&self.diagnostics))
    }

    /// A fresh pending promise using the default diagnostics policy.
    pub fn new() -> Self {
        Factory::default().pending()
    }

    /// An already-done promise.
    pub fn wrap(value: T) -> Self {
        Factory::default().done(value)
    }

    /// Alias of [`Promise::wrap`].
    pub fn done(value: T) -> Self {
        Self::wrap(value)
    }

    /// An already-failed promise.
    pub fn failed(reason: E) -> Self {
        Factory::default().failed(reason)
    }

    /// The settled outcome, if any.
    pub fn outcome(&self) -> Option<Result<T, E>> {
        match &self.inner.lock().state {
            State::Done(value) => Some(Ok(value.clone())),
            State::Fail(reason) => Some(Err(reason.clone())),
            State::Awaiting(_) | State::Pending => None,
        }
    }

    /// The settled outcome, telling diagnostics when a failure is being handled.
    pub(crate) fn settled(&self, handles_error: bool) -> Option<Result<T, E>> {
        let outcome = self.outcome()?;
        if outcome.is_err() && handles_error {
            self.diagnostics.caught(self.id);
        }
        Some(outcome)
    }

    /// Settle to done and drain listeners in attachment order.
    pub fn write(&self, value: T) -> &Self {
        let Some(listeners) = self.settle(State::Done(value.clone())) else {
            return self;
        };
        trace!(promise = %self.id, listeners = listeners.len(), "promise done");
        self.drain(listeners, Ok(value));
        self
    }

    /// Settle to fail and drain listeners in attachment order.
    ///
    /// With nobody listening the failure is handed to the diagnostics policy.
    pub fn error(&self, reason: E) -> &Self {
        let Some(listeners) = self.settle(State::Fail(reason.clone())) else {
            return self;
        };
        if listeners.is_empty() {
            debug!(promise = %self.id, reason = ?reason, "promise failed with no listeners");
            self.diagnostics.unobserved(self.id, &reason);
            return self;
        }
        trace!(promise = %self.id, listeners = listeners.len(), "promise failed");
        self.drain(listeners, Err(reason));
        self
    }

    fn settle(&self, state: State<T, E>) -> Option<Vec<Listener<T, E>>> {
        let (previous, listeners) = {
            let mut inner = self.inner.lock();
            if matches!(inner.state, State::Done(_) | State::Fail(_)) {
                return None;
            }
            (
                mem::replace(&mut inner.state, state),
                mem::take(&mut inner.listeners),
            )
        };
        // An unstarted producer is dropped here, outside the lock.
        drop(previous);
        Some(listeners)
    }

    /// Deliver to every listener even if one of them panics. The first panic
    /// is resumed once the drain is complete.
    fn drain(&self, listeners: Vec<Listener<T, E>>, outcome: Result<T, E>) {
        let mut panicked = None;
        for listener in listeners {
            let outcome = outcome.clone();
            let delivered = panic::catch_unwind(AssertUnwindSafe(move || {
                self.deliver(listener, outcome);
            }));
            if let Err(payload) = delivered {
                warn!(promise = %self.id, "listener panicked, delivering to the rest");
                panicked.get_or_insert(payload);
            }
        }
        if let Some(payload) = panicked {
            panic::resume_unwind(payload);
        }
    }

    fn deliver(&self, listener: Listener<T, E>, outcome: Result<T, E>) {
        match listener {
            Listener::Reader {
                handles_error,
                observer,
            } => {
                if let (false, Err(reason)) = (handles_error, &outcome) {
                    self.diagnostics.unobserved(self.id, reason);
                }
                observer(self, outcome);
            }
            Listener::Continuation(observer) => observer(self, outcome),
        }
    }

    /// Start a lazy producer on first observation.
    pub(crate) fn trigger(&self) {
        let producer = {
            let mut inner = self.inner.lock();
            match mem::replace(&mut inner.state, State::Pending) {
                State::Awaiting(producer) => producer,
                current => {
                    inner.state = current;
                    return;
                }
            }
        };
        debug!(promise = %self.id, "starting deferred producer");
        let (write, error) = self.settlers();
        producer(write, error);
    }

    pub(crate) fn settlers(&self) -> (WriteFn<T>, ErrorFn<E>) {
        let done = self.clone();
        let fail = self.clone();
        (
            Arc::new(move |value| {
                done.write(value);
            }),
            Arc::new(move |reason| {
                fail.error(reason);
            }),
        )
    }

    /// Attach a raw observer, or run it now if already settled.
    pub(crate) fn observe(&self, handles_error: bool, observer: Observer<T, E>) -> &Self {
        self.trigger();
        let outcome = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            match &inner.state {
                State::Awaiting(_) | State::Pending => {
                    inner.listeners.push(Listener::Reader {
                        handles_error,
                        observer,
                    });
                    return self;
                }
                State::Done(value) => Ok(value.clone()),
                State::Fail(reason) => Err(reason.clone()),
            }
        };
        if let Err(reason) = &outcome {
            if handles_error {
                self.diagnostics.caught(self.id);
            } else {
                self.diagnostics.unobserved(self.id, reason);
            }
        }
        observer(self, outcome);
        self
    }

    /// Observe both outcomes.
    pub fn read<F, G>(&self, on_value: F, on_error: G) -> &Self
    where
        F: FnOnce(T) + Send + 'static,
        G: FnOnce(E) + Send + 'static,
    {
        self.observe(
            true,
            Box::new(move |_, outcome| match outcome {
                Ok(value) => on_value(value),
                Err(reason) => on_error(reason),
            }),
        )
    }

    /// Observe the value only. A failure reaching this reader is reported as
    /// unhandled.
    pub fn read_value<F>(&self, on_value: F) -> &Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.observe(
            false,
            Box::new(move |_, outcome| {
                if let Ok(value) = outcome {
                    on_value(value);
                }
            }),
        )
    }

    /// Observe the failure only.
    pub fn read_error<G>(&self, on_error: G) -> &Self
    where
        G: FnOnce(E) + Send + 'static,
    {
        self.observe(
            true,
            Box::new(move |_, outcome| {
                if let Err(reason) = outcome {
                    on_error(reason);
                }
            }),
        )
    }

    /// Observe with an error-first style callback.
    pub fn node<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(Result<T, E>) + Send + 'static,
    {
        self.observe(true, Box::new(move |_, outcome| callback(outcome)))
    }

    /// Attach a transform producing the outcome of a new promise.
    ///
    /// While pending the transform is queued against a fresh child; once
    /// settled it runs immediately and its result is returned as a trusted
    /// promise.
    pub(crate) fn chain<U, F>(&self, handles_error: bool, transform: F) -> Promise<U, E>
    where
        U: Value,
        F: FnOnce(&Promise<T, E>, Result<T, E>) -> Next<U, E> + Send + 'static,
    {
        self.trigger();
        let outcome = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            match &inner.state {
                State::Awaiting(_) | State::Pending => {
                    let child = self.sibling(State::Pending);
                    let destination = child.clone();
                    inner
                        .listeners
                        .push(Listener::Continuation(Box::new(move |source, outcome| {
                            propagate::settle(&destination, transform(source, outcome));
                        })));
                    return child;
                }
                State::Done(value) => Ok(value.clone()),
                State::Fail(reason) => Err(reason.clone()),
            }
        };
        if outcome.is_err() && handles_error {
            self.diagnostics.caught(self.id);
        }
        propagate::run(self, transform(self, outcome))
    }

    /// Transform the value; failures pass through untouched.
    pub fn then<F, R>(&self, on_value: F) -> Promise<R::Value, E>
    where
        F: FnOnce(T) -> R + Send + 'static,
        R: IntoNext<E>,
    {
        self.chain(false, move |_, outcome| match outcome {
            Ok(value) => on_value(value).into_next(),
            Err(reason) => Next::Fail(reason),
        })
    }

    /// Like [`Promise::then`], but the handler also gets the promise that
    /// produced the value.
    pub fn then_with<F, R>(&self, on_value: F) -> Promise<R::Value, E>
    where
        F: FnOnce(&Promise<T, E>, T) -> R + Send + 'static,
        R: IntoNext<E>,
    {
        self.chain(false, move |source, outcome| match outcome {
            Ok(value) => on_value(source, value).into_next(),
            Err(reason) => Next::Fail(reason),
        })
    }

    /// Recover from a failure; values pass through untouched.
    pub fn catch<G, R>(&self, on_error: G) -> Promise<T, E>
    where
        G: FnOnce(E) -> R + Send + 'static,
        R: IntoNext<E, Value = T>,
    {
        self.chain(true, move |_, outcome| match outcome {
            Ok(value) => Next::Value(value),
            Err(reason) => on_error(reason).into_next(),
        })
    }

    pub fn then_else<F, G, R, S>(&self, on_value: F, on_error: G) -> Promise<R::Value, E>
    where
        F: FnOnce(T) -> R + Send + 'static,
        G: FnOnce(E) -> S + Send + 'static,
        R: IntoNext<E>,
        S: IntoNext<E, Value = R::Value>,
    {
        self.chain(true, move |_, outcome| match outcome {
            Ok(value) => on_value(value).into_next(),
            Err(reason) => on_error(reason).into_next(),
        })
    }

    /// One handler for both outcomes.
    pub fn always<F, R>(&self, handler: F) -> Promise<R::Value, E>
    where
        F: FnOnce(Result<T, E>) -> R + Send + 'static,
        R: IntoNext<E>,
    {
        self.chain(true, move |_, outcome| handler(outcome).into_next())
    }

    /// A promise for the entry at `key`, or `None` when there is none.
    pub fn get<K>(&self, key: K) -> Promise<Option<T::Output>, E>
    where
        T: Lookup<K>,
        K: Send + 'static,
    {
        self.then(move |value| Ok::<_, E>(value.lookup(&key)))
    }

    /// A promise that is done with `value` whatever this one settles to.
    pub fn yield_value<U: Value>(&self, value: U) -> Promise<U, E> {
        self.chain(true, move |_, _| Next::Value(value))
    }

    /// A promise that fails with `reason` whatever this one settles to.
    pub fn throw(&self, reason: E) -> Promise<T, E> {
        self.chain(true, move |_, _| Next::Fail(reason))
    }
}

/// Keyed access used by [`Promise::get`].
pub trait Lookup<Q: ?Sized> {
    type Output: Value;

    fn lookup(&self, key: &Q) -> Option<Self::Output>;
}

impl<K, V, S, Q> Lookup<Q> for HashMap<K, V, S>
where
    K: Borrow<Q> + Hash + Eq,
    Q: Hash + Eq + ?Sized,
    V: Value,
    S: BuildHasher,
{
    type Output = V;

    fn lookup(&self, key: &Q) -> Option<V> {
        self.get(key).cloned()
    }
}

impl<K, V, Q> Lookup<Q> for BTreeMap<K, V>
where
    K: Borrow<Q> + Ord,
    Q: Ord + ?Sized,
    V: Value,
{
    type Output = V;

    fn lookup(&self, key: &Q) -> Option<V> {
        self.get(key).cloned()
    }
}

impl<V: Value> Lookup<usize> for Vec<V> {
    type Output = V;

    fn lookup(&self, index: &usize) -> Option<V> {
        self.get(*index).cloned()
    }
}
