//! Write-then-poll transport loop.
//!
//! The request is written with the socket in blocking mode. The response is
//! then read in non-blocking mode: wait for readability with `poll(2)`, read
//! up to one chunk, feed the decoder, repeat until a complete value decodes.

use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use packrpc_proto::{Decoder, Value};

use crate::conn::Stream;
use crate::debug_log::DebugLog;
use crate::error::{Error, Result};

/// Sockets whose blocking mode is switched between the write and read phases.
pub(crate) trait IoMode {
    /// Switches between blocking and non-blocking I/O.
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()>;
}

impl IoMode for Stream {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        Self::set_nonblocking(self, nonblocking)
    }
}

/// Writes the whole request in blocking mode, then leaves the socket
/// non-blocking for the read phase.
///
/// Failing to switch back after the write is still a [`Error::Write`], with
/// `sent == len`: the request went out, but the socket is unusable for the
/// read phase.
pub(crate) fn send<S: Write + IoMode>(stream: &mut S, packed: &[u8]) -> Result<()> {
    let len = packed.len();
    stream.set_nonblocking(false).map_err(|e| Error::Write {
        sent: 0,
        len,
        source: Some(e),
    })?;
    write_counted(stream, packed)?;
    stream.set_nonblocking(true).map_err(|e| Error::Write {
        sent: len,
        len,
        source: Some(e),
    })
}

/// Writes `packed` fully, or fails with the number of bytes that got through.
pub(crate) fn write_counted<W: Write>(w: &mut W, packed: &[u8]) -> Result<()> {
    let len = packed.len();
    let mut sent = 0;
    while sent < len {
        match w.write(&packed[sent..]) {
            Ok(0) => {
                return Err(Error::Write {
                    sent,
                    len,
                    source: None,
                });
            }
            Ok(n) => sent += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                return Err(Error::Write {
                    sent,
                    len,
                    source: Some(e),
                });
            }
        }
    }
    w.flush().map_err(|e| Error::Write {
        sent,
        len,
        source: Some(e),
    })?;
    tracing::debug!(bytes = sent, "request written");
    Ok(())
}

/// Reads until `decoder` yields one complete value.
///
/// `stream` must be in non-blocking mode. Each readiness wait is bounded by
/// `timeout`; an elapsed wait is [`Error::Timeout`].
pub(crate) fn recv<S: Read + AsFd>(
    stream: &mut S,
    decoder: &mut Decoder,
    chunk_size: usize,
    timeout: Duration,
    mut log: Option<&mut DebugLog>,
) -> Result<Value> {
    let mut chunk = vec![0u8; chunk_size];
    loop {
        if let Some(value) = decoder.try_next()? {
            return Ok(value);
        }

        if !wait_readable(stream.as_fd(), timeout)? {
            tracing::debug!(?timeout, buffered = decoder.buffered(), "readiness wait timed out");
            return Err(Error::Timeout(timeout));
        }

        match stream.read(&mut chunk) {
            Ok(0) => {
                return Err(Error::Read(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed before a complete response arrived",
                )));
            }
            Ok(n) => {
                tracing::debug!(bytes = n, "read chunk");
                if let Some(log) = log.as_deref_mut() {
                    log.record("read", format_args!("Read from socket - length: {n}"));
                }
                decoder.feed(&chunk[..n]);
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {}
            Err(e) => return Err(Error::Read(e)),
        }
    }
}

/// Blocks until `fd` is readable (`true`) or `timeout` elapses (`false`).
fn wait_readable(fd: BorrowedFd<'_>, timeout: Duration) -> Result<bool> {
    let timeout = PollTimeout::try_from(Duration::from_millis(poll_millis(timeout))).unwrap_or(PollTimeout::MAX);
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    loop {
        match poll(&mut fds, timeout) {
            Ok(0) => return Ok(false),
            // POLLHUP / POLLERR also count: the following read reports them.
            Ok(_) => return Ok(true),
            Err(Errno::EINTR) => {}
            Err(e) => return Err(Error::Read(e.into())),
        }
    }
}

/// Whole milliseconds for `poll(2)`, rounded up so a sub-millisecond
/// timeout still waits instead of returning at once.
fn poll_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::os::unix::net::UnixStream;
    use std::thread;
    use std::time::Instant;

    use packrpc_proto::{Response, encode};

    use super::*;
    use crate::ErrorKind;

    /// Accepts at most `cap` bytes in total, then refuses further writes.
    struct Limited {
        cap: usize,
        got: Vec<u8>,
    }

    impl Write for Limited {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.cap - self.got.len());
            self.got.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Accepts one byte per call and is interrupted every other call.
    struct Trickle {
        calls: usize,
        got: Vec<u8>,
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.calls += 1;
            if self.calls % 2 == 0 {
                return Err(io::ErrorKind::Interrupted.into());
            }
            self.got.push(buf[0]);
            Ok(1)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Records writes and mode switches; refuses to go back to non-blocking.
    #[derive(Default)]
    struct Stuck {
        modes: RefCell<Vec<bool>>,
        got: Vec<u8>,
    }

    impl Write for Stuck {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.got.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl IoMode for Stuck {
        fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
            self.modes.borrow_mut().push(nonblocking);
            if nonblocking {
                return Err(io::Error::other("fcntl failed"));
            }
            Ok(())
        }
    }

    fn nonblocking_pair() -> (UnixStream, UnixStream) {
        let (client, server) = UnixStream::pair().unwrap();
        client.set_nonblocking(true).unwrap();
        (client, server)
    }

    #[test]
    fn short_write_is_write_error() {
        let mut w = Limited {
            cap: 5,
            got: Vec::new(),
        };
        let err = write_counted(&mut w, &[7u8; 12]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Write);
        assert!(matches!(err, Error::Write { sent: 5, len: 12, .. }));
    }

    #[test]
    fn partial_writes_are_completed() {
        let mut w = Trickle {
            calls: 0,
            got: Vec::new(),
        };
        write_counted(&mut w, b"hello").unwrap();
        assert_eq!(w.got, b"hello");
    }

    #[test]
    fn send_writes_whole_request() {
        let (client, mut server) = UnixStream::pair().unwrap();
        let mut stream = Stream::Unix(client);
        let payload = vec![0xa5u8; 64 * 1024];
        let reader = thread::spawn(move || {
            let mut got = vec![0u8; 64 * 1024];
            server.read_exact(&mut got).unwrap();
            got
        });
        send(&mut stream, &payload).unwrap();
        assert_eq!(reader.join().unwrap(), payload);
    }

    #[test]
    fn failed_switch_after_write_is_complete_write_error() {
        let mut stream = Stuck::default();
        let err = send(&mut stream, b"request").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Write);
        assert!(matches!(err, Error::Write { sent: 7, len: 7, source: Some(_) }));
        assert_eq!(stream.got, b"request");
        assert_eq!(*stream.modes.borrow(), [false, true]);
    }

    #[test]
    fn stitches_response_from_small_chunks() {
        let (mut client, mut server) = nonblocking_pair();
        let reply = Response::success(7, Value::Array(vec![Value::from("hi")]))
            .encode()
            .unwrap();
        let writer = thread::spawn(move || {
            for b in reply {
                server.write_all(&[b]).unwrap();
                thread::sleep(Duration::from_millis(1));
            }
            server
        });

        let mut dec = Decoder::new();
        let value = recv(&mut client, &mut dec, 3, Duration::from_secs(5), None).unwrap();
        assert_eq!(
            value,
            Response::success(7, Value::Array(vec![Value::from("hi")])).to_value()
        );
        drop(writer.join().unwrap());
    }

    #[test]
    fn leftover_bytes_serve_next_response() {
        let (mut client, mut server) = nonblocking_pair();
        let mut bytes = encode(&Value::from(1)).unwrap();
        bytes.extend(encode(&Value::from(2)).unwrap());
        server.write_all(&bytes).unwrap();

        let mut dec = Decoder::new();
        let t = Duration::from_secs(1);
        assert_eq!(recv(&mut client, &mut dec, 1024, t, None).unwrap(), Value::from(1));
        // No more socket data needed for the second value.
        assert_eq!(recv(&mut client, &mut dec, 1024, t, None).unwrap(), Value::from(2));
    }

    #[test]
    fn silence_is_timeout() {
        let (mut client, _server) = nonblocking_pair();
        let mut dec = Decoder::new();
        let err = recv(&mut client, &mut dec, 1024, Duration::from_millis(50), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn poll_timeout_rounds_up_to_whole_millis() {
        assert_eq!(poll_millis(Duration::ZERO), 0);
        assert_eq!(poll_millis(Duration::from_micros(1)), 1);
        assert_eq!(poll_millis(Duration::from_micros(900)), 1);
        assert_eq!(poll_millis(Duration::from_millis(1)), 1);
        assert_eq!(poll_millis(Duration::from_micros(1001)), 2);
        assert_eq!(poll_millis(Duration::from_secs(30)), 30_000);
    }

    #[test]
    fn sub_millisecond_timeout_still_waits() {
        let (mut client, _server) = nonblocking_pair();
        let mut dec = Decoder::new();
        let start = Instant::now();
        let err = recv(&mut client, &mut dec, 1024, Duration::from_micros(900), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(start.elapsed() >= Duration::from_micros(900));
    }

    #[test]
    fn multi_mebibyte_response_reassembles_in_linear_time() {
        let (mut client, mut server) = nonblocking_pair();
        let items: Vec<Value> = (0..2 * 1024 * 1024).map(|i| Value::from(i % 100)).collect();
        let reply = Response::success(3, Value::Array(items)).encode().unwrap();
        assert!(reply.len() > 2 * 1024 * 1024);
        let writer = thread::spawn(move || {
            server.write_all(&reply).unwrap();
            server
        });

        let mut dec = Decoder::new();
        let start = Instant::now();
        let value = recv(&mut client, &mut dec, 1024, Duration::from_secs(30), None).unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed < Duration::from_secs(10), "took {elapsed:?}");
        drop(writer.join().unwrap());

        let reply = Response::from_value(value).unwrap();
        assert_eq!(reply.result.as_array().map(Vec::len), Some(2 * 1024 * 1024));
    }

    #[test]
    fn peer_close_mid_message_is_read_error() {
        let (mut client, mut server) = nonblocking_pair();
        let reply = Response::success(1, Value::from("truncated")).encode().unwrap();
        server.write_all(&reply[..reply.len() - 2]).unwrap();
        drop(server);

        let mut dec = Decoder::new();
        let err = recv(&mut client, &mut dec, 1024, Duration::from_secs(1), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Read);
    }

    #[test]
    fn logs_each_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.log");
        let mut log = DebugLog::open(&path).unwrap();

        let (mut client, mut server) = nonblocking_pair();
        server.write_all(&encode(&Value::from("abc")).unwrap()).unwrap();
        let mut dec = Decoder::new();
        recv(&mut client, &mut dec, 1024, Duration::from_secs(1), Some(&mut log)).unwrap();
        drop(log);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("read: Read from socket - length: 4"));
    }
}
