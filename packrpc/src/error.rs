//! Error types for packrpc calls.

use std::io;
use std::time::Duration;

use packrpc_proto::{CodecError, EnvelopeError, Value};
use serde::{Deserialize, Serialize};

/// Alias for `Result<T, packrpc::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced from a call cycle.
///
/// Every failure is terminal for the current call; nothing is retried.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The transport-level connect attempt failed.
    #[error("could not connect to {endpoint}: {source}")]
    Connect {
        /// Address that was dialed.
        endpoint: String,
        /// Underlying transport error.
        #[source]
        source: io::Error,
    },

    /// Fewer bytes reached the socket than the encoded request holds.
    #[error("could not write to the socket (sent/tried): ({sent}/{len})")]
    Write {
        /// Bytes accepted by the socket.
        sent: usize,
        /// Length of the encoded request.
        len: usize,
        /// I/O error that stopped the write, if any.
        #[source]
        source: Option<io::Error>,
    },

    /// The socket failed while waiting for or reading the response.
    #[error("could not read from socket: {0}")]
    Read(#[source] io::Error),

    /// The decoded response is not a valid envelope for this request.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// The remote side reported an application error.
    #[error("got an error from server: {0}")]
    Server(Value),

    /// The socket did not become readable within the configured timeout.
    #[error("no response within {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// The request could not be encoded or the response bytes are invalid.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Machine-readable category of an [`Error`], with a stable numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// See [`Error::Connect`].
    Connect,
    /// See [`Error::Write`].
    Write,
    /// See [`Error::Read`].
    Read,
    /// Response is not a four-element array.
    Response,
    /// Response type tag is not `1`.
    Type,
    /// See [`Error::Server`].
    Server,
    /// See [`Error::Timeout`].
    Timeout,
    /// Response id does not match the request id.
    MsgId,
    /// See [`Error::Codec`].
    Codec,
    /// See [`Error::Config`].
    Config,
}

impl ErrorKind {
    /// Stable numeric code reported in [`Fault::code`].
    pub const fn code(self) -> u16 {
        match self {
            Self::Connect => 1,
            Self::Write => 2,
            Self::Read => 3,
            Self::Response => 4,
            Self::Type => 5,
            Self::Server => 6,
            Self::Timeout => 7,
            Self::MsgId => 8,
            Self::Codec => 9,
            Self::Config => 10,
        }
    }

    /// Name of the kind, e.g. `"ConnectError"`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "ConnectError",
            Self::Write => "WriteError",
            Self::Read => "ReadError",
            Self::Response => "ResponseError",
            Self::Type => "TypeError",
            Self::Server => "ServerError",
            Self::Timeout => "TimeoutError",
            Self::MsgId => "MsgIdError",
            Self::Codec => "CodecError",
            Self::Config => "ConfigError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connect { .. } => ErrorKind::Connect,
            Self::Write { .. } => ErrorKind::Write,
            Self::Read(_) => ErrorKind::Read,
            Self::Envelope(EnvelopeError::MessageType(_)) => ErrorKind::Type,
            Self::Envelope(EnvelopeError::MsgId { .. }) => ErrorKind::MsgId,
            Self::Envelope(_) => ErrorKind::Response,
            Self::Server(_) => ErrorKind::Server,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Codec(_) => ErrorKind::Codec,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Shorthand for `self.kind().code()`.
    pub fn code(&self) -> u16 {
        self.kind().code()
    }

    /// Remote error value, for [`Error::Server`].
    pub fn server_error(&self) -> Option<&Value> {
        match self {
            Self::Server(v) => Some(v),
            _ => None,
        }
    }

    /// Whether the connection may hold unread or stale bytes after this error.
    pub(crate) fn desyncs_stream(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Write
                | ErrorKind::Read
                | ErrorKind::Timeout
                | ErrorKind::MsgId
                | ErrorKind::Codec
        )
    }

    /// Converts into the data-shaped form returned in trap mode.
    pub fn to_fault(&self) -> Fault {
        Fault {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

/// A failure represented as data: `{code, message}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// [`ErrorKind::code`] of the failure.
    pub code: u16,
    /// Human-readable description.
    pub message: String,
}

impl Fault {
    /// MessagePack map `{"code": .., "message": ..}`.
    pub fn to_value(&self) -> Value {
        Value::Map(vec![
            (Value::from("code"), Value::from(self.code)),
            (Value::from("message"), Value::from(self.message.as_str())),
        ])
    }
}

impl From<&Error> for Fault {
    fn from(err: &Error) -> Self {
        err.to_fault()
    }
}

impl From<Error> for Fault {
    fn from(err: Error) -> Self {
        err.to_fault()
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}
