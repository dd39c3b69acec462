//! Name-forwarding convenience layer with trap and throw modes.

use packrpc_proto::Value;

use crate::client::Client;
use crate::config::Config;
use crate::error::{Fault, Result};

/// Invokes remote methods by name.
///
/// In trap mode (the default) every failure is returned as a
/// `{code, message}` map instead of an error. Switch to throw mode with
/// [`throw_errors(true)`](Self::throw_errors) to get [`Error`](crate::Error)s.
///
/// ```no_run
/// use packrpc::{Api, Config, Value};
///
/// let mut api = Api::new(Config::default());
/// // Trap mode: failures come back as data.
/// let _trapped = api.call("echo", vec![Value::from("hi")])?;
///
/// api.throw_errors(true);
/// let _thrown = api.call("echo", vec![Value::from("hi")])?;
/// # Ok::<(), packrpc::Error>(())
/// ```
#[derive(Debug)]
pub struct Api {
    /// Client performing the call cycle.
    client: Client,
    /// Throw mode when set, trap mode otherwise.
    throw: bool,
}

impl Api {
    /// Creates an API wrapper in trap mode.
    pub fn new(config: Config) -> Self {
        Self::from_client(Client::new(config))
    }

    /// Wraps an existing client in trap mode.
    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            throw: false,
        }
    }

    /// Selects throw mode (`true`) or trap mode (`false`).
    pub fn throw_errors(&mut self, throw: bool) {
        self.throw = throw;
    }

    /// Whether failures are returned as errors.
    pub const fn throws(&self) -> bool {
        self.throw
    }

    /// Invokes `method` with positional `args`.
    ///
    /// In trap mode failures come back as [`Fault::to_value`] maps, so this
    /// never returns `Err`.
    pub fn call(&mut self, method: &str, args: Vec<Value>) -> Result<Value> {
        match self.client.call(method, args) {
            Ok(v) => Ok(v),
            Err(e) if self.throw => Err(e),
            Err(e) => Ok(e.to_fault().to_value()),
        }
    }

    /// Invokes `method`, returning failures as a typed [`Fault`] regardless
    /// of mode.
    pub fn call_fault(&mut self, method: &str, args: Vec<Value>) -> std::result::Result<Value, Fault> {
        self.client.call(method, args).map_err(Fault::from)
    }

    /// Underlying client.
    pub const fn client(&self) -> &Client {
        &self.client
    }

    /// Underlying client, mutably.
    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }

    /// Unwraps the client.
    pub fn into_client(self) -> Client {
        self.client
    }
}
