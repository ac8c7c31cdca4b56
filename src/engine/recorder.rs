//! Scope statistics recorder
//!
//! A `SummaryRecorder` observes the coordinator for the lifetime of one scope
//! and yields an immutable `Summary` when the scope ends.

use std::sync::{Arc, Mutex, PoisonError};

use super::coordinator::{Coordinator, TestListener};
use crate::models::{ErrorInfo, Summary};
use crate::utils::Timer;

#[derive(Default)]
struct Counts {
    summary: Summary,
    current_faulted: bool,
}

pub struct SummaryRecorder {
    counts: Mutex<Counts>,
    timer: Timer,
}

impl SummaryRecorder {
    /// Create a zeroed recorder and register it on the coordinator
    pub fn start(coordinator: &Coordinator, label: impl Into<String>) -> Arc<SummaryRecorder> {
        let recorder = Arc::new(SummaryRecorder {
            counts: Mutex::new(Counts::default()),
            timer: Timer::start(label),
        });
        coordinator.add_listener(recorder.clone());
        recorder
    }

    /// Unregister from the coordinator and freeze the counts
    pub fn stop(self: Arc<Self>, coordinator: &Coordinator) -> Summary {
        let listener: Arc<dyn TestListener> = self.clone();
        coordinator.remove_listener(&listener);

        let mut summary = self.snapshot();
        summary.elapsed_time = self.timer.elapsed_ms();
        self.timer.log();
        summary
    }

    /// Counts so far, without elapsed time
    pub fn snapshot(&self) -> Summary {
        self.lock().summary
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counts> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TestListener for SummaryRecorder {
    fn on_test_start(&self, _name: &str) {
        let mut counts = self.lock();
        counts.summary.run_count += 1;
        counts.current_faulted = false;
    }

    fn on_test_end(&self, _name: &str) {
        let mut counts = self.lock();
        if !counts.current_faulted {
            counts.summary.success_count += 1;
        }
        counts.current_faulted = false;
    }

    fn on_test_failure(&self, _name: &str, _error: &ErrorInfo) {
        let mut counts = self.lock();
        counts.summary.failure_count += 1;
        counts.current_faulted = true;
    }

    fn on_test_error(&self, _name: &str, _error: &ErrorInfo) {
        let mut counts = self.lock();
        counts.summary.error_count += 1;
        counts.current_faulted = true;
    }
}
