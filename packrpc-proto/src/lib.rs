//! Wire protocol for the packrpc MessagePack-RPC client.
//!
//! Requests and responses are MessagePack arrays:
//!
//! ```text
//! request:  [0, msgid, method, params]
//! response: [1, msgid, error, result]
//! ```
//!
//! The encoding is plain MessagePack ([`rmpv`]) with no extra framing, so a
//! reader must stitch partial reads together until a complete value is
//! available. [`Decoder`] does exactly that.
//!
//! Both envelopes can be built and parsed in either direction. The client
//! frames [`Request`]s and classifies [`Response`]s; [`Request::from_value`]
//! and [`Response::success`] / [`Response::failure`] are the server side of
//! the same contract, for peers and test doubles that answer calls.

mod codec;
mod message;

pub use codec::{CodecError, Decoder, MAX_MESSAGE, encode};
pub use message::{EnvelopeError, REQUEST, RESPONSE, Request, Response};
pub use rmpv::Value;
