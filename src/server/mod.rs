//! Event aggregation server
//!
//! Accepts one runner connection at a time, dispatches every event it sends
//! and can ask it to stop.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dispatcher::Dispatcher;
use crate::models::Event;
use crate::transport::{split_stream, SocketHandle, Transport, TransportError};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to listen on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to accept client: {0}")]
    Accept(#[source] std::io::Error),

    #[error("Failed to set up client session: {0}")]
    Session(#[source] std::io::Error),
}

pub struct Server {
    port: u16,
    dispatcher: Arc<Dispatcher>,
    listener: Mutex<Option<Arc<TcpListener>>>,
    client: Mutex<Option<SocketHandle>>,
    transport: Mutex<Option<Arc<Transport>>>,
    correlation_id: Mutex<Option<Uuid>>,
    shutdown: watch::Sender<bool>,
}

impl Server {
    /// Create a server for `port`; port 0 picks an ephemeral port at bind time
    pub fn new(port: u16) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            port,
            dispatcher: Arc::new(Dispatcher::new()),
            listener: Mutex::new(None),
            client: Mutex::new(None),
            transport: Mutex::new(None),
            correlation_id: Mutex::new(None),
            shutdown,
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Bind the listening socket if not bound yet and return its address
    pub async fn bind(&self) -> Result<SocketAddr, ServerError> {
        let listener = self.listen().await?;
        listener.local_addr().map_err(|source| ServerError::Bind {
            port: self.port,
            source,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.listener)
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
    }

    /// Accept a client and pump its events into the dispatcher until it
    /// disconnects. With `looping`, accept the next client afterwards; only
    /// one session is ever active at a time. Returns once `shutdown` is called
    /// or, without `looping`, after the first session.
    pub async fn start(&self, looping: bool) -> Result<(), ServerError> {
        let listener = self.listen().await?;
        let mut shutdown = self.shutdown.subscribe();

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => Some(accepted),
                _ = shutdown.wait_for(|stop| *stop) => None,
            };
            let Some(accepted) = accepted else {
                debug!("Server shut down while waiting for a client");
                break;
            };

            let (stream, peer) = accepted.map_err(ServerError::Accept)?;
            info!("Client connected from {}", peer);
            self.run_session(stream).await?;
            info!("Client {} disconnected", peer);

            if !looping || *shutdown.borrow() {
                break;
            }
        }

        Ok(())
    }

    /// Best-effort request for the connected runner to stop
    pub async fn cancel(&self) {
        let transport = lock(&self.transport).clone();
        let Some(transport) = transport else {
            debug!("No client connected, nothing to cancel");
            return;
        };

        let correlation_id = lock(&self.correlation_id).unwrap_or_else(Uuid::nil);
        match transport.write_event(&Event::run_stop(correlation_id)).await {
            Ok(()) => info!("Sent stop request to client"),
            Err(e) => debug!("Failed to send stop request: {}", e),
        }
    }

    /// Release the transport, the client socket and the listening socket, in
    /// that order. Each step is attempted regardless of the previous one.
    /// Safe to call any number of times.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        self.release_session().await;

        if lock(&self.listener).take().is_some() {
            debug!("Listening socket released");
        }
    }

    /// Client socket, listening socket and transport are all present.
    /// Advisory only.
    pub fn is_running(&self) -> bool {
        lock(&self.client).is_some()
            && lock(&self.listener).is_some()
            && lock(&self.transport).is_some()
    }

    async fn listen(&self) -> Result<Arc<TcpListener>, ServerError> {
        if let Some(listener) = lock(&self.listener).clone() {
            return Ok(listener);
        }

        let listener = TcpListener::bind(("0.0.0.0", self.port))
            .await
            .map_err(|source| ServerError::Bind {
                port: self.port,
                source,
            })?;
        let listener = Arc::new(listener);
        if let Ok(addr) = listener.local_addr() {
            info!("Listening for test runners on {}", addr);
        }

        let mut slot = lock(&self.listener);
        match slot.as_ref() {
            // a concurrent bind won the race
            Some(existing) => Ok(existing.clone()),
            None => {
                self.shutdown.send_replace(false);
                *slot = Some(listener.clone());
                Ok(listener)
            }
        }
    }

    async fn run_session(&self, stream: TcpStream) -> Result<(), ServerError> {
        let (stream, socket) = split_stream(stream).map_err(ServerError::Session)?;
        let transport = Arc::new(Transport::new(stream));
        *lock(&self.client) = Some(socket);
        *lock(&self.transport) = Some(transport.clone());

        self.pump(&transport).await;
        self.release_session().await;
        Ok(())
    }

    async fn pump(&self, transport: &Transport) {
        let mut received = 0usize;
        loop {
            match transport.read().await {
                Ok(Some(event)) => {
                    received += 1;
                    let event_type = event.event_type();
                    debug!("Received {} (code {})", event_type, event_type.code());
                    lock(&self.correlation_id).get_or_insert(event.correlation_id());
                    self.dispatcher.dispatch(&event);
                }
                Ok(None) => break,
                Err(TransportError::Decode(e)) => {
                    debug!("Skipping unrecognized event frame: {}", e);
                }
                Err(e) => {
                    warn!("Event stream failed: {}", e);
                    break;
                }
            }
        }
        debug!("Session ended after {} events", received);
    }

    async fn release_session(&self) {
        let transport = lock(&self.transport).take();
        if let Some(transport) = transport {
            if let Err(e) = transport.close().await {
                debug!("Error closing transport: {}", e);
            }
        }

        let client = lock(&self.client).take();
        if let Some(client) = client {
            if let Err(e) = client.close() {
                debug!("Error closing client socket: {}", e);
            }
        }

        lock(&self.correlation_id).take();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::TestRunListener;
    use crate::models::EventType;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[derive(Default)]
    struct Types {
        seen: Mutex<Vec<EventType>>,
    }

    impl Types {
        fn seen(&self) -> Vec<EventType> {
            self.seen.lock().unwrap().clone()
        }

        /// Poll until `count` events have been dispatched
        async fn wait_for(&self, count: usize) {
            for _ in 0..250 {
                if self.seen.lock().unwrap().len() >= count {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }
    }

    impl TestRunListener for Types {
        fn on_run_started(&self, event: &Event) {
            self.seen.lock().unwrap().push(event.event_type());
        }
        fn on_run_ended(&self, event: &Event) {
            self.seen.lock().unwrap().push(event.event_type());
        }
        fn on_suite_started(&self, event: &Event) {
            self.seen.lock().unwrap().push(event.event_type());
        }
    }

    async fn serve(looping: bool) -> (Arc<Server>, Arc<Types>, u16, ServerTask) {
        let server = Arc::new(Server::new(0));
        let types = Arc::new(Types::default());
        server.dispatcher().add_listener(types.clone());
        let port = server.bind().await.unwrap().port();
        let running = {
            let server = server.clone();
            tokio::spawn(async move { server.start(looping).await })
        };
        (server, types, port, running)
    }

    type ServerTask = tokio::task::JoinHandle<Result<(), ServerError>>;

    #[tokio::test]
    async fn test_shutdown_twice() {
        let server = Server::new(0);
        assert!(server.bind().await.is_ok());
        assert!(server.local_addr().is_some());

        server.shutdown().await;
        assert!(!server.is_running());
        server.shutdown().await;
        assert!(!server.is_running());
        assert!(server.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_without_start() {
        let server = Server::new(0);
        server.shutdown().await;
        server.shutdown().await;
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_cancel_without_client_is_noop() {
        let server = Server::new(0);
        server.cancel().await;
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_accept() {
        let server = Arc::new(Server::new(0));
        server.bind().await.unwrap();

        let running = {
            let server = server.clone();
            tokio::spawn(async move { server.start(true).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        server.shutdown().await;

        let result = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_session_dispatches_and_cancels() {
        let (server, types, port, running) = serve(false).await;

        let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let client = Transport::new(stream);
        let id = Uuid::new_v4();
        client.write_event(&Event::run_started(id)).await.unwrap();
        client
            .write_event(&Event::suite_started(id, "math"))
            .await
            .unwrap();

        // the server now has a live session and can reach the client
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(server.is_running());
        server.cancel().await;
        let stop = client.read().await.unwrap().unwrap();
        assert_eq!(stop.event_type(), EventType::RunStop);
        assert_eq!(stop.correlation_id(), id);

        client.close().await.unwrap();
        running.await.unwrap().unwrap();

        assert!(!server.is_running());
        assert_eq!(
            types.seen(),
            vec![EventType::RunStarted, EventType::SuiteStarted]
        );
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_frames_do_not_end_session() {
        let (server, types, port, running) = serve(false).await;

        let mut raw = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let id = Uuid::new_v4();
        let started = serde_json::to_string(&Event::run_started(id)).unwrap();
        let suite = serde_json::to_string(&Event::suite_started(id, "math")).unwrap();

        raw.write_all(b"{\"type\":\"\xff\"}\n").await.unwrap();
        raw.write_all(format!("{started}\n").as_bytes()).await.unwrap();
        raw.write_all(b"not an event\n").await.unwrap();
        raw.write_all(b"{\"type\":\"RUN_PAUSED\"}\n").await.unwrap();
        raw.write_all(format!("{suite}\n").as_bytes()).await.unwrap();
        raw.shutdown().await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(
            types.seen(),
            vec![EventType::RunStarted, EventType::SuiteStarted]
        );
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_loop_serves_sequential_sessions() {
        let (server, types, port, running) = serve(true).await;

        for session in 1..=2 {
            let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            let client = Transport::new(stream);
            let id = Uuid::new_v4();
            client.write_event(&Event::run_started(id)).await.unwrap();
            client
                .write_event(&Event::suite_started(id, "math"))
                .await
                .unwrap();
            client
                .write_event(&Event::run_ended(id, Default::default(), Default::default()))
                .await
                .unwrap();

            types.wait_for(3 * session).await;
            client.close().await.unwrap();
        }

        server.shutdown().await;
        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        let session = vec![
            EventType::RunStarted,
            EventType::SuiteStarted,
            EventType::RunEnded,
        ];
        assert_eq!(types.seen(), [session.clone(), session].concat());
    }
}
