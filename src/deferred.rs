//! Lazy promises whose producer starts on first observation.
//!
//! A producer comes in one of three shapes, each with its own constructor, and
//! is normalized into a single `(write, error)` form. The producer runs at most
//! once: on the first `read`/`then`, or never if the promise is settled
//! directly before anyone looks at it.
use std::sync::Arc;

use crate::factory::Factory;
use crate::promise::Promise;
use crate::propagate::{self, IntoNext};
use crate::{Reason, Value};

/// Settles a lazy promise to done. Calls after the first are ignored.
pub type WriteFn<T> = Arc<dyn Fn(T) + Send + Sync>;
/// Settles a lazy promise to fail. Calls after the first are ignored.
pub type ErrorFn<E> = Arc<dyn Fn(E) + Send + Sync>;
/// Error-first completion callback.
pub type Callback<T, E> = Box<dyn FnOnce(Result<T, E>) + Send>;

pub(crate) type Producer<T, E> = Box<dyn FnOnce(WriteFn<T>, ErrorFn<E>) + Send>;

pub(crate) fn explicit<T, E, F>(producer: F) -> Producer<T, E>
where
    T: Value,
    E: Reason,
    F: FnOnce(WriteFn<T>, ErrorFn<E>) -> Result<(), E> + Send + 'static,
{
    Box::new(move |write, error| {
        if let Err(reason) = producer(write, Arc::clone(&error)) {
            error(reason);
        }
    })
}

pub(crate) fn callback<T, E, F>(producer: F) -> Producer<T, E>
where
    T: Value,
    E: Reason,
    F: FnOnce(Callback<T, E>) -> Result<(), E> + Send + 'static,
{
    Box::new(move |write, error| {
        let fail = Arc::clone(&error);
        let done: Callback<T, E> = Box::new(move |outcome| match outcome {
            Ok(value) => write(value),
            Err(reason) => error(reason),
        });
        if let Err(reason) = producer(done) {
            fail(reason);
        }
    })
}

pub(crate) fn synchronous<T, E, F, R>(producer: F) -> Producer<T, E>
where
    T: Value,
    E: Reason,
    F: FnOnce() -> R + Send + 'static,
    R: IntoNext<E, Value = T>,
{
    Box::new(move |write, error| {
        propagate::forward(
            producer().into_next(),
            Box::new(move |value| write(value)),
            Box::new(move |reason| error(reason)),
        );
    })
}

impl<T: Value, E: Reason> Promise<T, E> {
    /// Lazy promise from a producer that settles through explicit `write` and
    /// `error` callbacks. Returning `Err` fails the promise.
    ///
    /// ```
    /// use promise_core::Promise;
    ///
    /// let lazy = Promise::<i32, String>::from_write_error(|write, _error| {
    ///     write(1);
    ///     Ok(())
    /// });
    /// let next = lazy.then(|n| Ok(n + 1));
    /// assert_eq!(next.outcome(), Some(Ok(2)));
    /// ```
    pub fn from_write_error<F>(producer: F) -> Self
    where
        F: FnOnce(WriteFn<T>, ErrorFn<E>) -> Result<(), E> + Send + 'static,
    {
        Factory::default().from_write_error(producer)
    }

    /// Lazy promise from a producer that reports through an error-first
    /// callback.
    pub fn from_callback<F>(producer: F) -> Self
    where
        F: FnOnce(Callback<T, E>) -> Result<(), E> + Send + 'static,
    {
        Factory::default().from_callback(producer)
    }

    /// Lazy promise from a producer that returns its outcome, or a promise for
    /// it.
    pub fn from_sync<F, R>(producer: F) -> Self
    where
        F: FnOnce() -> R + Send + 'static,
        R: IntoNext<E, Value = T>,
    {
        Factory::default().from_sync(producer)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::promise::{Promise, Status};

    fn counted() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        (runs.clone(), runs)
    }

    #[test]
    fn test_deferred_waits_for_first_observer() {
        let (runs, seen) = counted();
        let lazy = Promise::<i32, String>::from_write_error(move |write, _| {
            runs.fetch_add(1, Ordering::SeqCst);
            write(1);
            Ok(())
        });
        assert_eq!(lazy.status(), Status::Awaiting);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        lazy.read_value(|_| {});
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.outcome(), Some(Ok(1)));
    }

    #[test]
    fn test_deferred_runs_producer_once() {
        let (runs, seen) = counted();
        let lazy = Promise::<i32, String>::from_write_error(move |_, _| {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let first = lazy.then(|v| Ok(v));
        let second = lazy.then(|v| Ok(v));
        lazy.read_value(|_| {});
        assert!(!first.ptr_eq(&second));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.status(), Status::Pending);
    }

    #[test]
    fn test_direct_write_preempts_producer() {
        let (runs, seen) = counted();
        let lazy = Promise::<i32, String>::from_sync(move || {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        });
        lazy.write(7);
        lazy.read_value(|_| {});
        let next = lazy.then(|v| Ok(v * 2));
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(next.outcome(), Some(Ok(14)));
    }

    #[test]
    fn test_deferred_propagates_values() {
        let lazy = Promise::<i32, String>::from_write_error(|write, _| {
            write(1);
            Ok(())
        });
        let result = lazy.then(|n| Ok(n + 1)).then(|n| Ok(n == 2));
        assert_eq!(result.outcome(), Some(Ok(true)));
    }

    #[test]
    fn test_deferred_callback_shape() {
        let ok = Promise::<i32, String>::from_callback(|done| {
            done(Ok(3));
            Ok(())
        });
        assert_eq!(ok.then(|v| Ok(v)).outcome(), Some(Ok(3)));

        let failed = Promise::<i32, String>::from_callback(|done| {
            done(Err("nope".into()));
            Ok(())
        });
        assert_eq!(
            failed.catch(|e| Ok(e.len() as i32)).outcome(),
            Some(Ok(4))
        );
    }

    #[test]
    fn test_deferred_sync_shape_accepts_values_and_promises() {
        let plain = Promise::<i32, String>::from_sync(|| Ok(1));
        assert_eq!(plain.then(|v| Ok(v)).outcome(), Some(Ok(1)));

        let inner = Promise::<i32, String>::new();
        let nested = inner.clone();
        let lifted = Promise::<i32, String>::from_sync(move || nested);
        let result = lifted.then(|v| Ok(v + 1));
        assert_eq!(result.status(), Status::Pending);
        inner.write(1);
        assert_eq!(result.outcome(), Some(Ok(2)));
    }

    #[test]
    fn test_deferred_catches_producer_errors() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let spy = seen.clone();
        Promise::<i32, String>::from_sync(|| Err("sync".to_string()))
            .read_error(move |e| spy.lock().push(e));

        let spy = seen.clone();
        Promise::<i32, String>::from_write_error(|_, _| Err("explicit".to_string()))
            .read_error(move |e| spy.lock().push(e));

        let spy = seen.clone();
        Promise::<i32, String>::from_callback(|_| Err("callback".to_string()))
            .read_error(move |e| spy.lock().push(e));

        assert_eq!(*seen.lock(), vec!["sync", "explicit", "callback"]);
    }
}
