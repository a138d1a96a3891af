//! Shared helpers for unit tests.
use std::sync::{Arc, Once};

use parking_lot::Mutex;

use crate::diagnostics::Diagnostics;
use crate::factory::Factory;
use crate::promise::PromiseId;
use crate::Reason;

static INIT_LOGGING: Once = Once::new();

/// Route `tracing` output to the test writer. Only the first call does
/// anything.
pub(crate) fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_target(true)
            .with_ansi(false)
            .try_init();
    });
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Unobserved(PromiseId, String),
    Caught(PromiseId),
}

/// Diagnostics policy that remembers every hook call.
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

impl<E: Reason> Diagnostics<E> for Recorder {
    fn unobserved(&self, promise: PromiseId, reason: &E) {
        self.events
            .lock()
            .push(Event::Unobserved(promise, format!("{reason:?}")));
    }

    fn caught(&self, promise: PromiseId) {
        self.events.lock().push(Event::Caught(promise));
    }
}

pub(crate) fn recording<E: Reason>() -> (Factory<E>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    (Factory::with_diagnostics(recorder.clone()), recorder)
}
