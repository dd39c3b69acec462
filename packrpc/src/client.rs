//! The call cycle: connect, frame, write, read, classify.

use std::io;
use std::time::Duration;

use packrpc_proto::{Decoder, Request, Response, Value};

use crate::config::Config;
use crate::conn::Connection;
use crate::debug_log::DebugLog;
use crate::error::{Error, Result};
use crate::transport;

/// Synchronous MessagePack-RPC client owning exactly one connection.
///
/// Calls block until the response is classified or a failure occurs. The
/// socket is opened on the first call (or [`connect`](Self::connect)) and
/// closed when the client is dropped.
///
/// ```no_run
/// use packrpc::{Client, Config, Value};
///
/// let mut client = Client::new(Config::default());
/// let reply = client.call("echo", vec![Value::from("hi")])?;
/// assert_eq!(reply, Value::Array(vec![Value::from("hi")]));
/// # Ok::<(), packrpc::Error>(())
/// ```
#[derive(Debug)]
pub struct Client {
    /// The only socket this client uses.
    conn: Connection,
    /// Reassembles responses; reset whenever the connection is dropped.
    decoder: Decoder,
    /// Maximum bytes per read.
    chunk_size: usize,
    /// Bound on each readiness wait.
    timeout: Duration,
    /// Id for the next auto-numbered request.
    next_id: u32,
    /// Optional debug log file.
    log: Option<DebugLog>,
}

impl Client {
    /// Creates a client. No connection is made until the first call.
    ///
    /// If `config.debug` is set and the log file cannot be opened, file
    /// logging is disabled and a `tracing` warning is emitted.
    pub fn new(config: Config) -> Self {
        let log = if config.debug {
            match DebugLog::open(&config.log_path) {
                Ok(log) => Some(log),
                Err(e) => {
                    tracing::warn!(
                        path = %config.log_path.display(),
                        error = %e,
                        "cannot open debug log; file logging disabled"
                    );
                    None
                }
            }
        } else {
            None
        };

        Self {
            conn: Connection::new(config.address, config.timeout),
            decoder: Decoder::new(),
            chunk_size: config.chunk_size,
            timeout: config.timeout,
            next_id: 0,
            log,
        }
    }

    /// Builds a client for `address` with default settings and connects it.
    pub fn connect_to(address: &str) -> Result<Self> {
        let mut client = Self::new(Config::builder().address(address).build()?);
        client.connect()?;
        Ok(client)
    }

    /// Opens the socket. A no-op when already connected.
    pub fn connect(&mut self) -> Result<()> {
        if self.conn.is_connected() {
            return Ok(());
        }
        match self.conn.connect() {
            Ok(()) => {
                let endpoint = self.conn.endpoint().to_string();
                self.debug("connect", format_args!("Connected to Remote Socket: {endpoint}"));
                Ok(())
            }
            Err(e) => {
                self.debug("ERROR", &e);
                Err(e)
            }
        }
    }

    /// Whether the socket is open.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Closes the socket and drops any partially received data.
    ///
    /// The next call reconnects.
    pub fn close(&mut self) {
        self.conn.close();
        self.decoder.reset();
    }

    /// Underlying connection.
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Calls `method` with an automatically assigned message id.
    pub fn call(&mut self, method: &str, params: Vec<Value>) -> Result<Value> {
        let msgid = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.call_with_id(method, params, msgid)
    }

    /// Calls `method` with an explicit message id.
    ///
    /// The response must carry the same id. Failures that may leave unread
    /// bytes on the socket close the connection.
    pub fn call_with_id(&mut self, method: &str, params: Vec<Value>, msgid: u32) -> Result<Value> {
        let outcome = self.round_trip(&Request::new(msgid, method, params));
        if let Err(e) = &outcome {
            tracing::debug!(method, msgid, kind = %e.kind(), error = %e, "call failed");
            self.debug("ERROR", e);
            if e.desyncs_stream() {
                self.close();
            }
        }
        outcome
    }

    /// One full call cycle for `request`.
    fn round_trip(&mut self, request: &Request) -> Result<Value> {
        self.connect()?;
        let packed = request.encode()?;
        tracing::debug!(method = %request.method, msgid = request.msgid, bytes = packed.len(), "calling");

        let Self {
            conn,
            decoder,
            chunk_size,
            timeout,
            log,
            ..
        } = self;
        let stream = conn.stream_mut().ok_or_else(|| {
            Error::Write {
                sent: 0,
                len: packed.len(),
                source: Some(io::ErrorKind::NotConnected.into()),
            }
        })?;

        transport::send(stream, &packed)?;
        if let Some(log) = log.as_mut() {
            log.record("write", format_args!("Write to socket: {}", request.to_value()));
        }

        let reply = transport::recv(stream, decoder, *chunk_size, *timeout, log.as_mut())?;
        if let Some(log) = log.as_mut() {
            log.record("read", format_args!("Unpack received data: {reply}"));
        }

        classify(reply, request.msgid)
    }

    /// Appends to the debug log, if enabled.
    fn debug(&mut self, context: &str, message: impl std::fmt::Display) {
        if let Some(log) = self.log.as_mut() {
            log.record(context, message);
        }
    }
}

/// Turns a decoded response into the call result.
///
/// Order: envelope shape, type tag, message id, application error.
fn classify(reply: Value, msgid: u32) -> Result<Value> {
    let response = Response::from_value(reply)?;
    response.expect_id(msgid)?;
    response.into_result().map_err(Error::Server)
}
