//! Raw socket handles
//!
//! The transport owns the stream halves; the session keeps a second handle to
//! the same socket so both directions can be shut down explicitly.

use std::io;
use std::net::{Shutdown, SocketAddr};
use tokio::net::TcpStream;
use tracing::debug;

/// Second handle onto a connected socket
#[derive(Debug)]
pub struct SocketHandle {
    inner: std::net::TcpStream,
}

impl SocketHandle {
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }

    /// Shut down the read and the write direction. Each direction is
    /// attempted even if the other fails; the first error is returned.
    pub fn close(&self) -> io::Result<()> {
        let read = self.inner.shutdown(Shutdown::Read);
        if let Err(e) = &read {
            debug!("Failed to shut down socket read side: {}", e);
        }

        let write = self.inner.shutdown(Shutdown::Write);
        if let Err(e) = &write {
            debug!("Failed to shut down socket write side: {}", e);
        }

        read.and(write)
    }
}

/// Split a connected stream into the stream handed to a transport and an
/// independent handle onto the same socket
pub fn split_stream(stream: TcpStream) -> io::Result<(TcpStream, SocketHandle)> {
    let std_stream = stream.into_std()?;
    let handle = std_stream.try_clone()?;
    let stream = TcpStream::from_std(std_stream)?;
    Ok((stream, SocketHandle { inner: handle }))
}
