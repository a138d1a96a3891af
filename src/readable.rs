use crate::promise::{OnError, OnValue, Promise};
use crate::{Reason, Value};

/// The future-like capability: something that eventually reports a value or a
/// failure to a pair of callbacks.
///
/// [`Promise`] is the trusted implementation. `Result` stands in for a plain,
/// already known outcome. Adapters around other promise types implement
/// `read_with` and get interop with [`coerce`](crate::coerce),
/// [`transfer`](crate::transfer) and auto-lifting for free.
pub trait Readable<T, E> {
    fn read_with(&self, on_value: OnValue<T>, on_error: OnError<E>);

    /// The outcome if it is already known, without side effects.
    fn peek(&self) -> Option<Result<T, E>> {
        None
    }

    /// The trusted promise behind this value, if it is one.
    fn trusted(&self) -> Option<Promise<T, E>> {
        None
    }
}

impl<T: Value, E: Reason> Readable<T, E> for Promise<T, E> {
    fn read_with(&self, on_value: OnValue<T>, on_error: OnError<E>) {
        self.read(on_value, on_error);
    }

    fn peek(&self) -> Option<Result<T, E>> {
        self.outcome()
    }

    fn trusted(&self) -> Option<Promise<T, E>> {
        Some(self.clone())
    }
}

impl<T: Value, E: Reason> Readable<T, E> for Result<T, E> {
    fn read_with(&self, on_value: OnValue<T>, on_error: OnError<E>) {
        match self.clone() {
            Ok(value) => on_value(value),
            Err(reason) => on_error(reason),
        }
    }

    fn peek(&self) -> Option<Result<T, E>> {
        Some(self.clone())
    }
}

impl<T, E, R> Readable<T, E> for Box<R>
where
    R: Readable<T, E> + ?Sized,
{
    fn read_with(&self, on_value: OnValue<T>, on_error: OnError<E>) {
        (**self).read_with(on_value, on_error)
    }

    fn peek(&self) -> Option<Result<T, E>> {
        (**self).peek()
    }

    fn trusted(&self) -> Option<Promise<T, E>> {
        (**self).trusted()
    }
}
