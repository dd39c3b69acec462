//! Request and response envelopes.

use rmpv::Value;

use crate::codec::{self, CodecError};

/// Message type tag of a request envelope.
pub const REQUEST: u8 = 0;

/// Message type tag of a response envelope.
pub const RESPONSE: u8 = 1;

/// Number of slots in both request and response envelopes.
const SLOTS: usize = 4;

/// Ways a decoded value can fail to be the envelope expected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum EnvelopeError {
    /// The value is not an array at all.
    #[error("number of elements within received data is wrong: not an array")]
    NotArray,

    /// The array does not have exactly four elements.
    #[error("number of elements within received data is wrong: expected 4, found {0}")]
    ElementCount(usize),

    /// The first element is not the expected message type tag.
    #[error("received data has the wrong type: {0}")]
    MessageType(Value),

    /// A request envelope whose id, method or params slot has the wrong type.
    #[error("malformed request envelope: {0}")]
    InvalidRequest(&'static str),

    /// The response answers a different request.
    #[error("response id {got} does not match request id {expected}")]
    MsgId {
        /// Id sent with the request.
        expected: u32,
        /// Id slot of the response.
        got: Value,
    },
}

/// A MessagePack-RPC request: `[0, msgid, method, params]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlates this request with its response.
    pub msgid: u32,
    /// Remote method name.
    pub method: String,
    /// Positional parameters.
    pub params: Vec<Value>,
}

impl Request {
    /// Creates a request envelope.
    pub fn new(msgid: u32, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            msgid,
            method: method.into(),
            params,
        }
    }

    /// Builds the four-slot envelope value.
    pub fn to_value(&self) -> Value {
        Value::Array(vec![
            Value::from(REQUEST),
            Value::from(self.msgid),
            Value::from(self.method.as_str()),
            Value::Array(self.params.clone()),
        ])
    }

    /// Encodes the envelope as MessagePack bytes.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode(&self.to_value())
    }

    /// Parses a request envelope on the answering side of a call.
    ///
    /// The method slot must be a string and the params slot an array.
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        let [kind, msgid, method, params] = slots(value)?;
        if kind.as_u64() != Some(u64::from(REQUEST)) {
            return Err(EnvelopeError::MessageType(kind));
        }
        let Some(id) = msgid.as_u64().and_then(|id| u32::try_from(id).ok()) else {
            return Err(EnvelopeError::InvalidRequest("msgid is not a u32"));
        };
        let Some(method) = method.as_str().map(str::to_owned) else {
            return Err(EnvelopeError::InvalidRequest("method is not a string"));
        };
        let Value::Array(params) = params else {
            return Err(EnvelopeError::InvalidRequest("params is not an array"));
        };
        Ok(Self {
            msgid: id,
            method,
            params,
        })
    }
}

/// A MessagePack-RPC response: `[1, msgid, error, result]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Raw id slot; validated with [`Response::expect_id`].
    pub msgid: Value,
    /// Application error, `nil` (or an empty string) on success.
    pub error: Value,
    /// Return value of the remote method.
    pub result: Value,
}

impl Response {
    /// A successful response carrying `result`, as a server sends it.
    pub fn success(msgid: u32, result: Value) -> Self {
        Self {
            msgid: Value::from(msgid),
            error: Value::Nil,
            result,
        }
    }

    /// A failed response carrying an application `error`, as a server
    /// sends it.
    pub fn failure(msgid: u32, error: Value) -> Self {
        Self {
            msgid: Value::from(msgid),
            error,
            result: Value::Nil,
        }
    }

    /// Validates envelope shape and type tag.
    ///
    /// Shape is checked before the type tag, so a malformed envelope is
    /// reported as such even if it also carries an error payload.
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        let [kind, msgid, error, result] = slots(value)?;
        if kind.as_u64() != Some(u64::from(RESPONSE)) {
            return Err(EnvelopeError::MessageType(kind));
        }
        Ok(Self {
            msgid,
            error,
            result,
        })
    }

    /// Builds the four-slot envelope value.
    pub fn to_value(&self) -> Value {
        Value::Array(vec![
            Value::from(RESPONSE),
            self.msgid.clone(),
            self.error.clone(),
            self.result.clone(),
        ])
    }

    /// Encodes the envelope as MessagePack bytes.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode(&self.to_value())
    }

    /// Checks that this response answers request `expected`.
    pub fn expect_id(&self, expected: u32) -> Result<(), EnvelopeError> {
        if self.msgid.as_u64() == Some(u64::from(expected)) {
            Ok(())
        } else {
            Err(EnvelopeError::MsgId {
                expected,
                got: self.msgid.clone(),
            })
        }
    }

    /// Whether the error slot reports an application failure.
    pub fn is_error(&self) -> bool {
        match &self.error {
            Value::Nil => false,
            Value::String(s) => !s.as_bytes().is_empty(),
            _ => true,
        }
    }

    /// Splits into the remote result or the remote error value.
    pub fn into_result(self) -> Result<Value, Value> {
        if self.is_error() {
            Err(self.error)
        } else {
            Ok(self.result)
        }
    }
}

/// Destructures a four-element array envelope.
fn slots(value: Value) -> Result<[Value; SLOTS], EnvelopeError> {
    let Value::Array(items) = value else {
        return Err(EnvelopeError::NotArray);
    };
    let len = items.len();
    <[Value; SLOTS]>::try_from(items).map_err(|_| EnvelopeError::ElementCount(len))
}
