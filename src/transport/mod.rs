//! Event transport
//!
//! A full-duplex channel of whole events over one TCP connection. Frames are
//! newline-delimited JSON objects.
//!
//! The read half and the write half live behind separate locks, so a task
//! blocked in `read` never holds up a task calling `write_event`.

mod socket;

pub use socket::{split_stream, SocketHandle};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tracing::{debug, trace};

use crate::models::Event;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed event frame: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Transport is closed")]
    Closed,
}

pub struct Transport {
    reader: Mutex<Option<BufReader<OwnedReadHalf>>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    closed: watch::Sender<bool>,
}

impl Transport {
    pub fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (closed, _) = watch::channel(false);
        Self {
            reader: Mutex::new(Some(BufReader::new(read_half))),
            writer: Mutex::new(Some(write_half)),
            closed,
        }
    }

    /// Wait for the next event.
    ///
    /// Returns `Ok(None)` at end of stream or once the transport is closed,
    /// including when `close` is called while a read is pending. A frame that
    /// does not decode yields `TransportError::Decode`; the stream stays
    /// aligned on the next frame.
    pub async fn read(&self) -> Result<Option<Event>, TransportError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Ok(None);
        }

        let mut guard = self.reader.lock().await;
        let Some(reader) = guard.as_mut() else {
            return Ok(None);
        };

        // raw bytes, so a frame that is not UTF-8 is a decode error too
        let mut line = Vec::new();
        loop {
            line.clear();
            let outcome = tokio::select! {
                read = reader.read_until(b'\n', &mut line) => Some(read),
                _ = closed.wait_for(|closed| *closed) => None,
            };

            let Some(read) = outcome else {
                guard.take();
                return Ok(None);
            };

            if read? == 0 {
                trace!("Event stream reached end of file");
                return Ok(None);
            }

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return serde_json::from_slice(&line)
                .map(Some)
                .map_err(TransportError::Decode);
        }
    }

    /// Encode and flush exactly one event
    pub async fn write_event(&self, event: &Event) -> Result<(), TransportError> {
        let mut frame = serde_json::to_vec(event).map_err(TransportError::Encode)?;
        frame.push(b'\n');

        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::Closed)?;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        trace!("Sent {}", event.event_type());
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Release both directions. Idempotent.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.closed.send_replace(true);

        // a pending read owns the reader lock and drops the half itself
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }

        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            writer.shutdown().await?;
            debug!("Transport closed");
        }
        Ok(())
    }
}
