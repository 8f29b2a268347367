//! Outbound TCP over `std::net` (lwIP sockets on the device).
//!
//! Implements [`Dialer`] / [`Connection`].  Socket creation and connect
//! are split so that running out of sockets (fatal) can be told apart
//! from an unreachable peer (retry after backoff).

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddrV4, TcpStream};
use std::time::Duration;

use log::debug;

use crate::app::ports::{Connection, DialError, Dialer, TransportError};

/// Connect timeout for one dial.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TcpDialer {
    read_timeout: Option<Duration>,
}

impl TcpDialer {
    /// `read_timeout: None` blocks on read until the peer sends or closes.
    pub fn new(read_timeout: Option<Duration>) -> Self {
        Self { read_timeout }
    }
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self::new(None)
    }
}

// errno values shared by newlib (lwIP) and Linux.
const ENFILE: i32 = 23;
const EMFILE: i32 = 24;
const ENOBUFS: i32 = 105;

/// No socket could be created, as opposed to the peer refusing us.
fn is_allocation_failure(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::OutOfMemory
        || matches!(e.raw_os_error(), Some(ENFILE | EMFILE | ENOBUFS))
}

impl Dialer for TcpDialer {
    type Conn = TcpConnection;

    fn dial(&mut self, peer: SocketAddrV4) -> Result<TcpConnection, DialError> {
        let stream = TcpStream::connect_timeout(&peer.into(), CONNECT_TIMEOUT).map_err(|e| {
            debug!("TCP: connect {} failed: {}", peer, e);
            if is_allocation_failure(&e) {
                DialError::Allocate
            } else {
                DialError::Connect
            }
        })?;
        // Best effort: an unsupported option leaves the default behaviour.
        let _ = stream.set_nodelay(true);
        let _ = stream.set_read_timeout(self.read_timeout);
        Ok(TcpConnection { stream })
    }
}

pub struct TcpConnection {
    stream: TcpStream,
}

impl Connection for TcpConnection {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.stream.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::ConnectionReset => Err(TransportError::Closed),
            Err(_) => Err(TransportError::Io),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(data).map_err(|e| match e.kind() {
            ErrorKind::BrokenPipe | ErrorKind::ConnectionReset => TransportError::Closed,
            _ => TransportError::Io,
        })?;
        self.stream.flush().map_err(|_| TransportError::Io)
    }

    fn close(self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}
