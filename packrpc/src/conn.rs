//! A single owned socket connection over TCP or a Unix-domain socket.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::addr::Endpoint;
use crate::error::{Error, Result};

/// Connected socket of either transport.
#[derive(Debug)]
pub(crate) enum Stream {
    /// TCP stream.
    Tcp(TcpStream),
    /// Unix-domain stream.
    Unix(UnixStream),
}

impl Stream {
    /// Dials `endpoint`, bounding each TCP attempt by `timeout`.
    fn open(endpoint: &Endpoint, timeout: Duration) -> io::Result<Self> {
        match endpoint {
            Endpoint::Tcp(addr) => {
                let mut last = None;
                for sa in addr.to_socket_addrs()? {
                    match TcpStream::connect_timeout(&sa, timeout) {
                        Ok(s) => {
                            // Requests are small and latency bound.
                            let _ = s.set_nodelay(true);
                            return Ok(Self::Tcp(s));
                        }
                        Err(e) => last = Some(e),
                    }
                }
                Err(last.unwrap_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("{addr} did not resolve to any address"),
                    )
                }))
            }
            // Unix sockets have no connect timeout; connect never blocks long.
            Endpoint::Unix(path) => UnixStream::connect(path).map(Self::Unix),
        }
    }

    /// Switches between blocking and non-blocking I/O.
    pub(crate) fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.set_nonblocking(nonblocking),
            Self::Unix(s) => s.set_nonblocking(nonblocking),
        }
    }

    /// Shuts down both directions.
    fn shutdown(&self) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.shutdown(Shutdown::Both),
            Self::Unix(s) => s.shutdown(Shutdown::Both),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.read(buf),
            Self::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.write(buf),
            Self::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.flush(),
            Self::Unix(s) => s.flush(),
        }
    }
}

impl AsFd for Stream {
    fn as_fd(&self) -> BorrowedFd<'_> {
        match self {
            Self::Tcp(s) => s.as_fd(),
            Self::Unix(s) => s.as_fd(),
        }
    }
}

/// Exclusively owned connection to one endpoint.
///
/// Holds at most one live socket. The socket is closed by [`close`] or when
/// the connection is dropped, whichever comes first.
///
/// [`close`]: Connection::close
#[derive(Debug)]
pub struct Connection {
    /// Address to dial.
    endpoint: Endpoint,
    /// Bound on each connect attempt.
    timeout: Duration,
    /// Live socket, if connected.
    stream: Option<Stream>,
}

impl Connection {
    /// Creates a disconnected connection. No I/O happens until [`connect`].
    ///
    /// [`connect`]: Connection::connect
    pub const fn new(endpoint: Endpoint, timeout: Duration) -> Self {
        Self {
            endpoint,
            timeout,
            stream: None,
        }
    }

    /// Opens the socket unless it is already open.
    pub fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = Stream::open(&self.endpoint, self.timeout).map_err(|source| Error::Connect {
            endpoint: self.endpoint.to_string(),
            source,
        })?;
        tracing::debug!(endpoint = %self.endpoint, "connected");
        self.stream = Some(stream);
        Ok(())
    }

    /// Whether a socket is currently open.
    pub const fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Address this connection dials.
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Live socket, if connected.
    pub(crate) fn stream_mut(&mut self) -> Option<&mut Stream> {
        self.stream.as_mut()
    }

    /// Releases the socket if open. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            // Peer may already be gone; the fd is released on drop regardless.
            let _ = stream.shutdown();
            tracing::debug!(endpoint = %self.endpoint, "closed");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::os::unix::net::UnixListener;

    use super::*;
    use crate::ErrorKind;

    #[test]
    fn connect_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut conn = Connection::new(Endpoint::tcp(addr.to_string()), Duration::from_secs(5));

        assert!(!conn.is_connected());
        conn.connect().unwrap();
        conn.connect().unwrap();
        assert!(conn.is_connected());

        // Exactly one connection reached the listener.
        listener.accept().unwrap();
        listener.set_nonblocking(true).unwrap();
        let second = listener.accept().unwrap_err();
        assert_eq!(second.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn refused_connect_is_connect_error() {
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let mut conn = Connection::new(Endpoint::tcp(addr.to_string()), Duration::from_secs(5));

        let err = conn.connect().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connect);
        assert!(err.to_string().contains(&addr.to_string()));
        assert!(!conn.is_connected());
    }

    #[test]
    fn missing_unix_socket_is_connect_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = Connection::new(
            Endpoint::unix(dir.path().join("absent.sock")),
            Duration::from_secs(1),
        );
        assert_eq!(conn.connect().unwrap_err().kind(), ErrorKind::Connect);
    }

    #[test]
    fn close_releases_socket_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rpc.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let mut conn = Connection::new(Endpoint::unix(&path), Duration::from_secs(1));
        conn.connect().unwrap();
        let (mut peer, _) = listener.accept().unwrap();

        conn.close();
        conn.close();
        assert!(!conn.is_connected());

        // Peer observes EOF.
        let mut buf = [0u8; 1];
        assert_eq!(peer.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn drop_closes_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        {
            let mut conn = Connection::new(Endpoint::tcp(addr.to_string()), Duration::from_secs(5));
            conn.connect().unwrap();
        }
        let (mut peer, _) = listener.accept().unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(peer.read(&mut buf).unwrap(), 0);
    }
}
