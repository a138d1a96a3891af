#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Once};
    use std::thread;
    use std::time::Duration;

    use futures::executor::block_on;
    use parking_lot::Mutex;
    use promise_core::{
        coerce, unbox, when, Error, Factory, GracePeriod, ManualScheduler, Next, OnError,
        OnValue, Promise, PromiseId, Readable, Status, When,
    };
    use proptest::prelude::*;

    static INIT_LOGGING: Once = Once::new();

    fn init_test_logging() {
        INIT_LOGGING.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }

    /// Answers on another thread after a short delay.
    struct Delayed(Result<i32, String>);

    impl Readable<i32, String> for Delayed {
        fn read_with(&self, on_value: OnValue<i32>, on_error: OnError<String>) {
            let outcome = self.0.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                match outcome {
                    Ok(value) => on_value(value),
                    Err(reason) => on_error(reason),
                }
            });
        }
    }

    #[test]
    fn test_deferred_scenario() {
        init_test_logging();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let lazy = Promise::<i32, String>::from_write_error(move |write, _error| {
            counter.fetch_add(1, Ordering::SeqCst);
            write(1);
            Ok(())
        });
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        lazy.then(|n| Ok(n + 1)).read_value(move |v| *slot.lock() = Some(v));
        lazy.read_value(|_| {});
        assert_eq!(*seen.lock(), Some(2));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unobserved_failure_scenario() {
        let scheduler = Arc::new(ManualScheduler::new());
        let reports: Arc<Mutex<Vec<(PromiseId, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        let factory = Factory::<String>::new(
            GracePeriod::new(scheduler.clone())
                .on_report(move |promise, reason| sink.lock().push((promise, reason))),
        );

        let promise = factory.pending::<i32>();
        promise.error("E".into());
        assert_eq!(scheduler.len(), 1);

        let handled = Arc::new(Mutex::new(None));
        let slot = handled.clone();
        promise.read_error(move |e| *slot.lock() = Some(e));
        scheduler.run_all();

        assert_eq!(*handled.lock(), Some("E".to_string()));
        assert!(reports.lock().is_empty());

        let ignored = factory.pending::<i32>();
        ignored.error("F".into());
        scheduler.run_all();
        assert_eq!(*reports.lock(), vec![(ignored.id(), "F".to_string())]);
    }

    #[test]
    fn test_children_inherit_factory_diagnostics() {
        let scheduler = Arc::new(ManualScheduler::new());
        let factory = Factory::<String>::new(GracePeriod::new(scheduler.clone()));
        let source = factory.pending::<i32>();
        let child = source.then(|v| Ok(v + 1));
        source.error("lost".into());
        // The failure passed through to a child nobody listens to.
        assert_eq!(child.status(), Status::Fail);
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_when_scenarios() {
        assert!(matches!(when(&Ok::<i32, String>(42), |v| Ok(v + 1)), When::Ready(43)));

        let next = when(&Delayed(Ok(42)), |v| Ok(v + 1));
        let When::Promise(promise) = next else {
            panic!("expected a pending promise");
        };
        assert_eq!(block_on(promise.wait()), Ok(43));
    }

    #[test]
    fn test_nested_future_is_lifted() {
        let source = Promise::<(), String>::new();
        let lifted = source.then(|_| Next::foreign(Delayed(Ok(9))));
        source.write(());
        assert_eq!(block_on(lifted.wait()), Ok(9));

        let settled = Promise::<(), String>::wrap(());
        let lifted = settled.then(|_| Next::foreign(Delayed(Err("late".into()))));
        assert_eq!(block_on(lifted.wait()), Err("late".to_string()));
    }

    #[test]
    fn test_coerce_identity_and_foreign() {
        let trusted = Promise::<i32, String>::new();
        assert!(coerce(&trusted).ptr_eq(&trusted));

        let foreign = coerce(&Delayed(Ok(1)));
        assert_eq!(foreign.status(), Status::Pending);
        assert_eq!(block_on(foreign.wait()), Ok(1));
    }

    #[test]
    fn test_unbox_laws() {
        assert_eq!(unbox(&Promise::<i32, String>::wrap(5)), Ok(Ok(5)));
        assert_eq!(
            unbox(&Promise::<i32, String>::failed("e".into())),
            Ok(Err("e".to_string()))
        );
        assert_eq!(unbox(&Promise::<i32, String>::new()), Err(Error::Pending));
    }

    #[test]
    fn test_fifo_delivery() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let promise = Promise::<i32, String>::new();
        for n in 0..5 {
            let order = order.clone();
            promise.read_value(move |v| order.lock().push((n, v)));
        }
        promise.write(5);
        assert_eq!(
            *order.lock(),
            (0..5).map(|n| (n, 5)).collect::<Vec<_>>()
        );
    }

    #[derive(Debug, Clone)]
    enum Settle {
        Write(i32),
        Error(String),
    }

    fn settle_strategy() -> impl Strategy<Value = Settle> {
        prop_oneof![
            any::<i32>().prop_map(Settle::Write),
            "[a-z]{1,8}".prop_map(Settle::Error),
        ]
    }

    proptest! {
        #[test]
        fn prop_first_settlement_wins(attempts in prop::collection::vec(settle_strategy(), 1..8)) {
            let scheduler = Arc::new(ManualScheduler::new());
            let factory = Factory::<String>::new(GracePeriod::new(scheduler));
            let promise = factory.pending::<i32>();
            for attempt in &attempts {
                match attempt.clone() {
                    Settle::Write(value) => { promise.write(value); }
                    Settle::Error(reason) => { promise.error(reason); }
                }
            }
            let expected = match attempts[0].clone() {
                Settle::Write(value) => Ok(value),
                Settle::Error(reason) => Err(reason),
            };
            prop_assert_eq!(promise.outcome(), Some(expected));
        }
    }
}
