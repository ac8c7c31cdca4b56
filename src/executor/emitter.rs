//! Outbound event stream
//!
//! Events are queued in emission order and written by a single writer task,
//! so synchronous test callbacks never wait on the socket. A failed write is
//! logged and dropped; the run carries on.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::engine::TestListener;
use crate::models::{ErrorInfo, Event};
use crate::transport::Transport;

#[derive(Clone)]
pub struct EventEmitter {
    correlation_id: Uuid,
    debug: bool,
    queue: Arc<Mutex<Option<mpsc::UnboundedSender<Event>>>>,
}

impl EventEmitter {
    /// Create an emitter and spawn the task writing its events to `transport`
    pub fn spawn(
        transport: Arc<Transport>,
        correlation_id: Uuid,
        debug: bool,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_events(transport, rx));
        let emitter = Self {
            correlation_id,
            debug,
            queue: Arc::new(Mutex::new(Some(tx))),
        };
        (emitter, writer)
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn emit(&self, event: Event) {
        if self.debug {
            debug!("{}", event);
        }

        let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        match queue.as_ref() {
            Some(tx) => {
                if let Err(e) = tx.send(event) {
                    debug!("Event writer is gone, dropping {}", e.0.event_type());
                }
            }
            None => debug!("Emitter closed, dropping {}", event.event_type()),
        }
    }

    /// Stop accepting events. The writer task finishes once the queue is
    /// drained.
    pub fn close(&self) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

async fn write_events(transport: Arc<Transport>, mut rx: mpsc::UnboundedReceiver<Event>) {
    let mut lost = 0usize;
    while let Some(event) = rx.recv().await {
        if let Err(e) = transport.write_event(&event).await {
            lost += 1;
            debug!("Failed to send {}: {}", event.event_type(), e);
        }
    }
    if lost > 0 {
        debug!("{} events could not be delivered", lost);
    }
}

/// Translates coordinator callbacks into test events
pub struct EventForwarder {
    emitter: EventEmitter,
}

impl EventForwarder {
    pub fn new(emitter: EventEmitter) -> Self {
        Self { emitter }
    }
}

impl TestListener for EventForwarder {
    fn on_test_start(&self, name: &str) {
        self.emitter
            .emit(Event::test_started(self.emitter.correlation_id(), name));
    }

    fn on_test_end(&self, name: &str) {
        self.emitter
            .emit(Event::test_ended(self.emitter.correlation_id(), name));
    }

    fn on_test_failure(&self, name: &str, error: &ErrorInfo) {
        self.emitter.emit(Event::test_failure(
            self.emitter.correlation_id(),
            name,
            error.clone(),
        ));
    }

    fn on_test_error(&self, name: &str, error: &ErrorInfo) {
        self.emitter.emit(Event::test_error(
            self.emitter.correlation_id(),
            name,
            error.clone(),
        ));
    }
}
