//! Event dispatcher
//!
//! Routes each incoming event to the type-specific callback of every
//! registered listener.
//!
//! The listener list is copy-on-write: `dispatch` iterates a snapshot taken
//! under a short lock, so a listener may add or remove listeners (itself
//! included) from inside a callback. Such changes take effect from the next
//! dispatch. Listener panics are not caught; a panicking listener aborts
//! delivery of that event to the listeners after it.

use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

use crate::models::{Event, EventKind};
use crate::utils::same_arc;

/// Receiver of client-to-server run events. Every method defaults to a no-op.
pub trait TestRunListener: Send + Sync {
    fn on_run_started(&self, _event: &Event) {}
    fn on_run_ended(&self, _event: &Event) {}
    fn on_run_stopped(&self, _event: &Event) {}
    fn on_suite_started(&self, _event: &Event) {}
    fn on_suite_ended(&self, _event: &Event) {}
    fn on_test_started(&self, _event: &Event) {}
    fn on_test_ended(&self, _event: &Event) {}
    fn on_test_failure(&self, _event: &Event) {}
    fn on_test_error(&self, _event: &Event) {}
}

type Listeners = Arc<Vec<Arc<dyn TestRunListener>>>;

#[derive(Default)]
pub struct Dispatcher {
    listeners: Mutex<Listeners>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn TestRunListener>) {
        let mut guard = self.lock();
        let mut next = Vec::clone(&guard);
        next.push(listener);
        *guard = Arc::new(next);
    }

    /// Remove a listener by identity. Unknown listeners are ignored.
    pub fn remove_listener(&self, listener: &Arc<dyn TestRunListener>) {
        let mut guard = self.lock();
        let next: Vec<_> = guard
            .iter()
            .filter(|registered| !same_arc(*registered, listener))
            .cloned()
            .collect();
        *guard = Arc::new(next);
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    /// Deliver one event to every listener, in registration order
    pub fn dispatch(&self, event: &Event) {
        let listeners = Arc::clone(&self.lock());

        for listener in listeners.iter() {
            match event.kind() {
                EventKind::RunStarted => listener.on_run_started(event),
                EventKind::RunEnded { .. } => listener.on_run_ended(event),
                EventKind::RunStopped { .. } => listener.on_run_stopped(event),
                EventKind::SuiteStarted { .. } => listener.on_suite_started(event),
                EventKind::SuiteEnded { .. } => listener.on_suite_ended(event),
                EventKind::TestStarted { .. } => listener.on_test_started(event),
                EventKind::TestEnded { .. } => listener.on_test_ended(event),
                EventKind::TestFailure { .. } => listener.on_test_failure(event),
                EventKind::TestError { .. } => listener.on_test_error(event),
                EventKind::RunStop => {
                    // server-to-client only, nothing to deliver
                    trace!("Dropping {} at dispatcher", event.event_type());
                    return;
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ErrorInfo, Summary};
    use std::collections::BTreeMap;
    use std::sync::Weak;
    use uuid::Uuid;

    #[derive(Default)]
    struct Calls {
        calls: Mutex<Vec<&'static str>>,
    }

    impl Calls {
        fn take(&self) -> Vec<&'static str> {
            std::mem::take(&mut *self.calls.lock().unwrap())
        }
        fn push(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl TestRunListener for Calls {
        fn on_run_started(&self, _event: &Event) {
            self.push("run_started");
        }
        fn on_run_ended(&self, _event: &Event) {
            self.push("run_ended");
        }
        fn on_test_failure(&self, _event: &Event) {
            self.push("failure");
        }
        fn on_test_error(&self, _event: &Event) {
            self.push("error");
        }
    }

    fn error() -> ErrorInfo {
        ErrorInfo::new("panic", "boom", "")
    }

    #[test]
    fn test_failure_and_error_are_routed_separately() {
        let dispatcher = Dispatcher::new();
        let calls = Arc::new(Calls::default());
        dispatcher.add_listener(calls.clone());
        let id = Uuid::new_v4();

        dispatcher.dispatch(&Event::test_failure(id, "t", error()));
        assert_eq!(calls.take(), vec!["failure"]);

        dispatcher.dispatch(&Event::test_error(id, "t", error()));
        assert_eq!(calls.take(), vec!["error"]);
    }

    #[test]
    fn test_run_stop_and_unhandled_types_are_silent() {
        let dispatcher = Dispatcher::new();
        let calls = Arc::new(Calls::default());
        dispatcher.add_listener(calls.clone());
        let id = Uuid::new_v4();

        dispatcher.dispatch(&Event::run_stop(id));
        dispatcher.dispatch(&Event::suite_started(id, "s"));
        assert!(calls.take().is_empty());

        dispatcher.dispatch(&Event::run_ended(id, BTreeMap::new(), Summary::default()));
        assert_eq!(calls.take(), vec!["run_ended"]);
    }

    struct Named {
        name: &'static str,
        log: Arc<Calls>,
    }

    impl TestRunListener for Named {
        fn on_run_started(&self, _event: &Event) {
            self.log.push(self.name);
        }
    }

    #[test]
    fn test_registration_order_and_removal() {
        let dispatcher = Dispatcher::new();
        let log = Arc::new(Calls::default());
        let first: Arc<dyn TestRunListener> = Arc::new(Named {
            name: "first",
            log: log.clone(),
        });
        let second: Arc<dyn TestRunListener> = Arc::new(Named {
            name: "second",
            log: log.clone(),
        });
        dispatcher.add_listener(first.clone());
        dispatcher.add_listener(second.clone());

        dispatcher.dispatch(&Event::run_started(Uuid::new_v4()));
        assert_eq!(log.take(), vec!["first", "second"]);

        dispatcher.remove_listener(&first);
        dispatcher.dispatch(&Event::run_started(Uuid::new_v4()));
        assert_eq!(log.take(), vec!["second"]);
        assert_eq!(dispatcher.listener_count(), 1);
    }

    /// Removes itself and registers a newcomer during its own callback
    struct SelfRemoving {
        dispatcher: Weak<Dispatcher>,
        me: Mutex<Option<Arc<dyn TestRunListener>>>,
        newcomer: Arc<dyn TestRunListener>,
        log: Arc<Calls>,
    }

    impl TestRunListener for SelfRemoving {
        fn on_run_started(&self, _event: &Event) {
            self.log.push("self_removing");
            let Some(dispatcher) = self.dispatcher.upgrade() else {
                return;
            };
            if let Some(me) = self.me.lock().unwrap().take() {
                dispatcher.remove_listener(&me);
                dispatcher.add_listener(self.newcomer.clone());
            }
        }
    }

    #[test]
    fn test_reentrant_mutation_does_not_skip_or_duplicate() {
        let dispatcher = Arc::new(Dispatcher::new());
        let log = Arc::new(Calls::default());

        let before: Arc<dyn TestRunListener> = Arc::new(Named {
            name: "before",
            log: log.clone(),
        });
        let after: Arc<dyn TestRunListener> = Arc::new(Named {
            name: "after",
            log: log.clone(),
        });
        let newcomer: Arc<dyn TestRunListener> = Arc::new(Named {
            name: "newcomer",
            log: log.clone(),
        });
        let self_removing = Arc::new(SelfRemoving {
            dispatcher: Arc::downgrade(&dispatcher),
            me: Mutex::new(None),
            newcomer,
            log: log.clone(),
        });
        let as_listener: Arc<dyn TestRunListener> = self_removing.clone();
        *self_removing.me.lock().unwrap() = Some(as_listener.clone());

        dispatcher.add_listener(before);
        dispatcher.add_listener(as_listener);
        dispatcher.add_listener(after);

        dispatcher.dispatch(&Event::run_started(Uuid::new_v4()));
        assert_eq!(log.take(), vec!["before", "self_removing", "after"]);

        dispatcher.dispatch(&Event::run_started(Uuid::new_v4()));
        assert_eq!(log.take(), vec!["before", "after", "newcomer"]);
    }
}
