//! Synchronous MessagePack-RPC client.
//!
//! `packrpc` speaks the MessagePack-RPC request/response protocol over a TCP
//! or Unix-domain stream socket. Each [`Client`] owns exactly one connection
//! and performs one call at a time:
//!
//! 1. connect (once, lazily),
//! 2. encode `[0, msgid, method, params]` and write it in blocking mode,
//! 3. poll the socket in non-blocking mode, feeding chunks to an incremental
//!    decoder until one value is complete,
//! 4. classify `[1, msgid, error, result]` into a result or an [`Error`].
//!
//! # Quick start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use packrpc::{Api, Client, Config, Value};
//!
//! let config = Config::builder()
//!     .address("tcp://127.0.0.1:18800")
//!     .timeout(Duration::from_secs(5))
//!     .build()?;
//!
//! let mut client = Client::new(config.clone());
//! let sum = client.call("add", vec![Value::from(1), Value::from(2)])?;
//!
//! // Failures as data instead of errors.
//! let mut api = Api::new(config);
//! let reply = api.call("add", vec![Value::from(1), Value::from(2)])?;
//! # let _ = (sum, reply);
//! # Ok::<(), packrpc::Error>(())
//! ```
//!
//! # Logging
//!
//! Call-cycle events are emitted through [`tracing`]; install a subscriber to
//! see them. Setting [`Config::debug`] additionally appends timestamped lines
//! to [`Config::log_path`].

mod addr;
#[cfg(unix)]
mod api;
#[cfg(unix)]
mod client;
mod config;
#[cfg(unix)]
mod conn;
mod debug_log;
mod error;
#[cfg(unix)]
mod transport;

pub use addr::Endpoint;
#[cfg(unix)]
pub use api::Api;
#[cfg(unix)]
pub use client::Client;
pub use config::{Config, ConfigBuilder, DEFAULT_CHUNK_SIZE, DEFAULT_LOG_PATH, DEFAULT_TIMEOUT};
#[cfg(unix)]
pub use conn::Connection;
pub use debug_log::DebugLog;
pub use error::{Error, ErrorKind, Fault, Result};
pub use packrpc_proto::{Request, Response, Value};
