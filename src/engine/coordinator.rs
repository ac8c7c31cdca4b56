//! Test execution coordinator
//!
//! Runs test units, notifies registered observers of each test's outcome and
//! honours a cooperative stop request between tests.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once, PoisonError};
use tracing::debug;

use super::stop::StopToken;
use super::test::{Test, TestCase};
use crate::models::ErrorInfo;
use crate::utils::same_arc;

/// Observer of per-test outcomes
///
/// For every test the coordinator calls `on_test_start`, then at most one of
/// `on_test_failure`/`on_test_error`, then `on_test_end`.
pub trait TestListener: Send + Sync {
    fn on_test_start(&self, name: &str);
    fn on_test_end(&self, name: &str);
    fn on_test_failure(&self, name: &str, error: &ErrorInfo);
    fn on_test_error(&self, name: &str, error: &ErrorInfo);
}

thread_local! {
    /// Location (and backtrace, when enabled) of the last panic on this thread
    static PANIC_TRACE: RefCell<Option<String>> = RefCell::new(None);
}

static PANIC_CAPTURE: Once = Once::new();

/// Chain a panic hook that records where a panic happened. The previous hook
/// still runs, so the usual panic message is printed as before.
fn install_panic_capture() {
    PANIC_CAPTURE.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let mut trace = match info.location() {
                Some(location) => format!(
                    "panicked at {}:{}:{}",
                    location.file(),
                    location.line(),
                    location.column()
                ),
                None => "panicked at an unknown location".to_string(),
            };
            let backtrace = Backtrace::capture();
            if backtrace.status() == BacktraceStatus::Captured {
                trace.push('\n');
                trace.push_str(&backtrace.to_string());
            }
            PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

/// Drives test execution and tracks pass/fail/error counts
pub struct Coordinator {
    listeners: Mutex<Vec<Arc<dyn TestListener>>>,
    stop: StopToken,
    run_count: AtomicU64,
    failure_count: AtomicU64,
    error_count: AtomicU64,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::with_stop_token(StopToken::new())
    }

    /// Create a coordinator that obeys an existing stop token
    pub fn with_stop_token(stop: StopToken) -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            stop,
            run_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn TestListener>) {
        self.lock_listeners().push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn TestListener>) {
        self.lock_listeners()
            .retain(|registered| !same_arc(registered, listener));
    }

    pub fn listener_count(&self) -> usize {
        self.lock_listeners().len()
    }

    /// Run a test unit. Returns immediately if a stop was already requested.
    pub fn run(&self, test: &dyn Test) {
        if self.should_stop() {
            debug!("Not running {}: stop requested", test.name());
            return;
        }
        test.run(self);
    }

    /// Run one test case and notify listeners of its outcome
    pub fn run_case(&self, case: &TestCase) {
        let name = case.name();
        self.run_count.fetch_add(1, Ordering::SeqCst);
        self.notify(|l| l.on_test_start(name));

        install_panic_capture();
        PANIC_TRACE.with(RefCell::take);
        match panic::catch_unwind(AssertUnwindSafe(|| case.call())) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                self.error_count.fetch_add(1, Ordering::SeqCst);
                let error = ErrorInfo::new("error", err.to_string(), format!("{err:?}"));
                self.notify(|l| l.on_test_error(name, &error));
            }
            Err(payload) => {
                self.failure_count.fetch_add(1, Ordering::SeqCst);
                let trace = PANIC_TRACE.with(RefCell::take).unwrap_or_default();
                let error = ErrorInfo::new("panic", panic_message(payload.as_ref()), trace);
                self.notify(|l| l.on_test_failure(name, &error));
            }
        }

        self.notify(|l| l.on_test_end(name));
    }

    /// Request a cooperative stop
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn should_stop(&self) -> bool {
        self.stop.is_stopped()
    }

    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    pub fn run_count(&self) -> u64 {
        self.run_count.load(Ordering::SeqCst)
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::SeqCst)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::SeqCst)
    }

    fn notify(&self, callback: impl Fn(&dyn TestListener)) {
        // snapshot so a listener may (un)register itself from a callback
        let listeners = self.lock_listeners().clone();
        for listener in &listeners {
            callback(listener.as_ref());
        }
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn TestListener>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "test panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TestSuite;

    #[derive(Default)]
    struct Trace {
        calls: Mutex<Vec<String>>,
    }

    impl Trace {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl TestListener for Trace {
        fn on_test_start(&self, name: &str) {
            self.calls.lock().unwrap().push(format!("start {name}"));
        }
        fn on_test_end(&self, name: &str) {
            self.calls.lock().unwrap().push(format!("end {name}"));
        }
        fn on_test_failure(&self, name: &str, error: &ErrorInfo) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("failure {name}: {}", error.message));
        }
        fn on_test_error(&self, name: &str, error: &ErrorInfo) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("error {name}: {}", error.message));
        }
    }

    #[test]
    fn test_outcomes_are_reported_between_start_and_end() {
        let coordinator = Coordinator::new();
        let trace = Arc::new(Trace::default());
        coordinator.add_listener(trace.clone());

        let suite = TestSuite::new("outcomes")
            .case("passes", || Ok(()))
            .case("fails", || {
                let sum = 1 + 1;
                assert_eq!(sum, 3, "math is broken");
                Ok(())
            })
            .case("errors", || anyhow::bail!("disk unavailable"));
        coordinator.run(&suite);

        let calls = trace.calls();
        assert_eq!(calls.len(), 8);
        assert_eq!(calls[0], "start passes");
        assert_eq!(calls[1], "end passes");
        assert_eq!(calls[2], "start fails");
        assert!(calls[3].starts_with("failure fails:"));
        assert!(calls[3].contains("math is broken"));
        assert_eq!(calls[4], "end fails");
        assert_eq!(calls[5], "start errors");
        assert_eq!(calls[6], "error errors: disk unavailable");
        assert_eq!(calls[7], "end errors");

        assert_eq!(coordinator.run_count(), 3);
        assert_eq!(coordinator.failure_count(), 1);
        assert_eq!(coordinator.error_count(), 1);
    }

    #[test]
    fn test_stop_skips_remaining_tests() {
        let coordinator = Arc::new(Coordinator::new());
        let token = coordinator.stop_token();
        let trace = Arc::new(Trace::default());
        coordinator.add_listener(trace.clone());

        let suite = TestSuite::new("stoppable")
            .case("first", move || {
                token.stop();
                Ok(())
            })
            .case("second", || Ok(()));
        coordinator.run(&suite);

        // the running test finishes, the next one never starts
        assert_eq!(trace.calls(), vec!["start first", "end first"]);
        assert!(coordinator.should_stop());

        coordinator.run(&suite);
        assert_eq!(coordinator.run_count(), 1);
    }

    #[test]
    fn test_remove_listener() {
        let coordinator = Coordinator::new();
        let trace: Arc<dyn TestListener> = Arc::new(Trace::default());
        coordinator.add_listener(trace.clone());
        assert_eq!(coordinator.listener_count(), 1);

        coordinator.remove_listener(&trace);
        assert_eq!(coordinator.listener_count(), 0);
    }

    #[derive(Default)]
    struct Errors {
        reported: Mutex<Vec<ErrorInfo>>,
    }

    impl TestListener for Errors {
        fn on_test_start(&self, _name: &str) {}
        fn on_test_end(&self, _name: &str) {}
        fn on_test_failure(&self, _name: &str, error: &ErrorInfo) {
            self.reported.lock().unwrap().push(error.clone());
        }
        fn on_test_error(&self, _name: &str, error: &ErrorInfo) {
            self.reported.lock().unwrap().push(error.clone());
        }
    }

    #[test]
    fn test_panic_records_location() {
        let coordinator = Coordinator::new();
        let errors = Arc::new(Errors::default());
        coordinator.add_listener(errors.clone());

        let suite = TestSuite::new("traces")
            .case("panics", || panic!("index out of range"))
            .case("errors", || anyhow::bail!("disk unavailable"));
        coordinator.run(&suite);

        let reported = errors.reported.lock().unwrap();
        assert_eq!(reported.len(), 2);
        assert_eq!(reported[0].kind, "panic");
        assert_eq!(reported[0].message, "index out of range");
        assert!(reported[0].stack_trace.starts_with("panicked at "));
        assert!(reported[0].stack_trace.contains(file!()));
        // the panic trace does not leak into the next test
        assert_eq!(reported[1].kind, "error");
        assert!(!reported[1].stack_trace.contains("panicked at"));
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(payload.as_ref()), "owned message");

        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "test panicked");
    }
}
