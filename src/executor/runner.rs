//! Remote test runner
//!
//! Runs the configured test classes in this process and streams their
//! lifecycle events to the server.

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::emitter::{EventEmitter, EventForwarder};
use crate::config::ClientConfig;
use crate::engine::{
    Coordinator, StopToken, SummaryRecorder, Test, TestFactory, TestListener, TestSuite,
};
use crate::models::{Event, EventType, Summary};
use crate::transport::{split_stream, SocketHandle, Transport};

/// Errors that prevent a run from starting
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("No test class specified")]
    NoTestClasses,

    #[error("No server port specified")]
    NoPort,

    #[error("Failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of a completed run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    pub correlation_id: Uuid,
    pub summary: Summary,
    /// The run was cut short by a stop request
    pub stopped: bool,
    /// Suites that ran, by class name
    pub suites: Vec<(String, Summary)>,
}

/// Test runner reporting to a remote server
pub struct TestRunner {
    config: ClientConfig,
    correlation_id: Uuid,
    factory: Arc<dyn TestFactory>,
    stop: StopToken,
    /// The stop token belongs to the caller and is never reset here
    shared_stop: bool,
}

impl TestRunner {
    /// Create a new test runner
    pub fn new(config: ClientConfig, factory: Arc<dyn TestFactory>) -> Self {
        Self {
            config,
            correlation_id: Uuid::new_v4(),
            factory,
            stop: StopToken::new(),
            shared_stop: false,
        }
    }

    /// Use an existing stop token. Once stopped, every later run of this
    /// runner ends as stopped without starting a suite.
    pub fn with_stop_token(mut self, stop: StopToken) -> Self {
        self.stop = stop;
        self.shared_stop = true;
        self
    }

    pub fn add_test_class_name(&mut self, name: impl Into<String>) {
        self.config.class_names.push(name.into());
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Cleared when a run starts, unless supplied through `with_stop_token`
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect, run every resolvable class and report the results.
    ///
    /// Only pre-flight problems are errors: an empty class list, a missing
    /// port, or an unreachable server. Anything that goes wrong after the
    /// connection is established is logged and the run continues.
    pub async fn run(&self) -> Result<RunReport, ClientError> {
        if self.config.class_names.is_empty() {
            return Err(ClientError::NoTestClasses);
        }
        let port = self.config.port.ok_or(ClientError::NoPort)?;
        let (transport, socket) = self.connect(port).await?;

        if !self.shared_stop {
            self.stop.reset();
        }

        let stop_listener = spawn_stop_listener(transport.clone(), self.stop.clone());
        let (emitter, writer) =
            EventEmitter::spawn(transport.clone(), self.correlation_id, self.config.debug);

        let report = self.run_tests(&emitter).await;

        emitter.close();
        if let Err(e) = writer.await {
            debug!("Event writer task failed: {}", e);
        }
        shut_down(&transport, socket).await;
        stop_listener.abort();

        Ok(report)
    }

    async fn connect(&self, port: u16) -> Result<(Arc<Transport>, SocketHandle), ClientError> {
        let host = self.config.host.clone();
        info!("Connecting to {} on port {}...", host, port);

        let connect_error = |source| ClientError::Connect {
            host: host.clone(),
            port,
            source,
        };
        let stream = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(connect_error)?;
        let (stream, socket) = split_stream(stream).map_err(connect_error)?;
        Ok((Arc::new(Transport::new(stream)), socket))
    }

    /// Resolve class names into named suites, skipping the ones that fail
    fn suites(&self) -> Vec<(String, Arc<dyn Test>)> {
        let names = &self.config.class_names;
        info!("Extracting testcases from {} classnames...", names.len());

        let suites: Vec<(String, Arc<dyn Test>)> = names
            .iter()
            .filter_map(|name| {
                let Some(test) = self.factory.create(name) else {
                    warn!("Could not get Test instance from {}", name);
                    return None;
                };
                let suite: Arc<dyn Test> = if test.is_case() {
                    Arc::new(TestSuite::new(name.clone()).with_test(test))
                } else {
                    test
                };
                Some((name.clone(), suite))
            })
            .collect();

        info!("Extracted {} testcases.", suites.len());
        suites
    }

    async fn run_tests(&self, emitter: &EventEmitter) -> RunReport {
        let coordinator = Arc::new(Coordinator::with_stop_token(self.stop.clone()));
        let forwarder: Arc<dyn TestListener> = Arc::new(EventForwarder::new(emitter.clone()));
        coordinator.add_listener(forwarder.clone());

        let suites = self.suites();
        let total: usize = suites.iter().map(|(_, s)| s.count_test_cases()).sum();
        info!("Total tests to run: {}", total);

        emitter.emit(Event::run_started(self.correlation_id));
        let run_recorder = SummaryRecorder::start(&coordinator, "run");

        let mut completed = Vec::new();
        for (name, suite) in suites {
            if coordinator.should_stop() {
                info!("Stop requested, not starting {}", name);
                break;
            }
            let summary = self.run_suite(&coordinator, emitter, &name, suite).await;
            completed.push((name, summary));
        }

        let summary = run_recorder.stop(&coordinator);
        coordinator.remove_listener(&forwarder);

        let stopped = coordinator.should_stop();
        let event = if stopped {
            Event::run_stopped(self.correlation_id, process_properties(), summary)
        } else {
            Event::run_ended(self.correlation_id, process_properties(), summary)
        };
        emitter.emit(event);
        info!("Finished after {}ms", summary.elapsed_time);

        RunReport {
            correlation_id: self.correlation_id,
            summary,
            stopped,
            suites: completed,
        }
    }

    async fn run_suite(
        &self,
        coordinator: &Arc<Coordinator>,
        emitter: &EventEmitter,
        name: &str,
        suite: Arc<dyn Test>,
    ) -> Summary {
        emitter.emit(Event::suite_started(self.correlation_id, name));
        let recorder = SummaryRecorder::start(coordinator, name);

        let worker = {
            let coordinator = coordinator.clone();
            tokio::task::spawn_blocking(move || coordinator.run(suite.as_ref()))
        };
        if let Err(e) = worker.await {
            warn!("Suite {} did not complete: {}", name, e);
        }

        let summary = recorder.stop(coordinator);
        emitter.emit(Event::suite_ended(self.correlation_id, name, summary));
        summary
    }
}

/// Wait for one event from the server. A stop request, or a broken channel,
/// stops the run.
fn spawn_stop_listener(transport: Arc<Transport>, stop: StopToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        match transport.read().await {
            Ok(Some(event)) if event.event_type() == EventType::RunStop => {
                info!("Server requested the run to stop");
                stop.stop();
            }
            Ok(Some(event)) => debug!("Ignoring {} from server", event.event_type()),
            Ok(None) => debug!("Server closed the control channel"),
            Err(e) => {
                debug!("Control channel failed, stopping run: {}", e);
                stop.stop();
            }
        }
    })
}

async fn shut_down(transport: &Transport, socket: SocketHandle) {
    if let Err(e) = transport.close().await {
        debug!("Error closing transport: {}", e);
    }
    if let Err(e) = socket.close() {
        debug!("Error closing socket: {}", e);
    }
}

/// Snapshot of the process environment at the end of a run
pub fn process_properties() -> BTreeMap<String, String> {
    let mut properties: BTreeMap<String, String> = std::env::vars_os()
        .map(|(k, v)| {
            (
                k.to_string_lossy().into_owned(),
                v.to_string_lossy().into_owned(),
            )
        })
        .collect();

    properties.insert("os.name".to_string(), std::env::consts::OS.to_string());
    properties.insert("os.arch".to_string(), std::env::consts::ARCH.to_string());
    properties.insert("process.id".to_string(), std::process::id().to_string());
    if let Ok(dir) = std::env::current_dir() {
        properties.insert("user.dir".to_string(), dir.display().to_string());
    }
    properties
}
