use std::future::{Future, IntoFuture};
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

use crate::promise::Promise;
use crate::{Reason, Value};

/// A std future resolving to the outcome of a [`Promise`].
///
/// Waiting counts as attaching a failure handler.
///
/// # Examples
///
/// ```
/// use promise_core::Promise;
/// use futures::executor::block_on;
/// use std::thread;
/// let promise = Promise::<String, String>::new();
/// let waiter = promise.wait();
/// let task1 = thread::spawn(move || block_on(async {
///     println!("Received {:?}", waiter.await);
/// }));
/// promise.write("Hi".into());
/// task1.join().expect("The task1 thread has panicked.");
/// ```
#[derive(Debug)]
pub struct Wait<T, E> {
    promise: Promise<T, E>,
    slot: Arc<Mutex<Slot<T, E>>>,
}

#[derive(Debug)]
enum WakerState {
    /// Not yet subscribed to the promise.
    Fresh,
    /// The promise has settled and woken us.
    Tainted,
}

#[derive(Debug)]
struct Slot<T, E> {
    outcome: Option<Result<T, E>>,
    waker: Result<Waker, WakerState>,
}

impl<T: Value, E: Reason> Promise<T, E> {
    pub fn wait(&self) -> Wait<T, E> {
        Wait {
            promise: self.clone(),
            slot: Arc::new(Mutex::new(Slot {
                outcome: None,
                waker: Err(WakerState::Fresh),
            })),
        }
    }
}

impl<T: Value, E: Reason> IntoFuture for Promise<T, E> {
    type Output = Result<T, E>;
    type IntoFuture = Wait<T, E>;

    fn into_future(self) -> Wait<T, E> {
        self.wait()
    }
}

impl<T: Value, E: Reason> Future for Wait<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.lock();
        if let Some(outcome) = slot.outcome.take() {
            return Poll::Ready(outcome);
        }
        match mem::replace(&mut slot.waker, Ok(cx.waker().clone())) {
            Err(WakerState::Fresh) => {
                drop(slot);
                let shared = Arc::clone(&self.slot);
                self.promise.observe(
                    true,
                    Box::new(move |_, outcome| {
                        let mut slot = shared.lock();
                        slot.outcome = Some(outcome);
                        if let Ok(waker) = mem::replace(&mut slot.waker, Err(WakerState::Tainted)) {
                            waker.wake()
                        }
                    }),
                );
                // A settled promise answers inside `observe`.
                match self.slot.lock().outcome.take() {
                    Some(outcome) => Poll::Ready(outcome),
                    None => Poll::Pending,
                }
            }
            // Polled again after completion.
            Err(WakerState::Tainted) => {
                slot.waker = Err(WakerState::Tainted);
                drop(slot);
                match self.promise.outcome() {
                    Some(outcome) => Poll::Ready(outcome),
                    None => Poll::Pending,
                }
            }
            Ok(_) => Poll::Pending,
        }
    }
}
