//! Incremental MessagePack codec over an unframed byte stream.
//!
//! MessagePack values carry their own length prefixes, so no outer frame
//! header is needed: bytes are buffered until one complete value is present.
//! Completeness is tracked by a resumable scan over markers and length
//! prefixes, so every received byte is inspected once no matter how finely
//! the stream is chunked. The value itself is decoded only once it is whole.

use rmp::Marker;
use rmpv::Value;

/// Maximum bytes buffered while waiting for one complete message (16 MiB).
pub const MAX_MESSAGE: usize = 16 * 1024 * 1024;

/// Errors produced while encoding or decoding MessagePack values.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CodecError {
    /// The value could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(String),

    /// The buffered bytes are not valid MessagePack.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// More than `limit` bytes were buffered without completing a message.
    #[error("message exceeds {limit} byte limit ({buffered} bytes buffered)")]
    TooLarge {
        /// Bytes currently buffered.
        buffered: usize,
        /// Configured limit.
        limit: usize,
    },
}

/// Serializes `value` as MessagePack.
pub fn encode(value: &Value) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, value).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Streaming decoder that assembles one value from arbitrarily split chunks.
///
/// Bytes following a completed value stay buffered for the next call to
/// [`try_next`](Self::try_next), so one decoder serves a whole connection.
#[derive(Debug)]
pub struct Decoder {
    /// Bytes received but not yet consumed by a decoded value.
    buf: Vec<u8>,
    /// Upper bound on `buf` while a value is incomplete.
    limit: usize,
    /// Offset of the first item in `buf` not yet scanned.
    scanned: usize,
    /// Items still expected at each open nesting level, innermost last.
    pending: Vec<u64>,
}

/// Layout of one MessagePack item as announced by its header.
#[derive(Debug, PartialEq, Eq)]
struct Item {
    /// Marker, length prefix and ext type byte.
    head: usize,
    /// Payload bytes following the header.
    body: u64,
    /// Nested items that follow (array elements, map keys and values).
    children: u64,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    /// Creates a decoder with the default [`MAX_MESSAGE`] limit.
    pub const fn new() -> Self {
        Self::with_limit(MAX_MESSAGE)
    }

    /// Creates a decoder that gives up once `limit` bytes are buffered
    /// without a complete value.
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            scanned: 0,
            pending: Vec::new(),
        }
    }

    /// Appends a chunk of received bytes.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Decodes the next complete value, if one is buffered.
    ///
    /// Returns `Ok(None)` when more input is needed; the buffer is left
    /// untouched in that case and the next call resumes where this one
    /// stopped.
    pub fn try_next(&mut self) -> Result<Option<Value>, CodecError> {
        let Some(end) = self.scan()? else {
            if self.buf.len() > self.limit {
                return Err(self.too_large());
            }
            return Ok(None);
        };

        let mut whole = &self.buf[..end];
        let value = rmpv::decode::read_value(&mut whole).map_err(|e| CodecError::Malformed(e.to_string()));
        self.buf.drain(..end);
        self.scanned = 0;
        self.pending.clear();
        value.map(Some)
    }

    /// Number of bytes buffered but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Discards all buffered bytes.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.scanned = 0;
        self.pending.clear();
    }

    /// Advances the scan over whole items, returning the end offset of the
    /// first value once it is complete.
    fn scan(&mut self) -> Result<Option<usize>, CodecError> {
        if self.scanned == 0 && self.pending.is_empty() {
            self.pending.push(1);
        }
        loop {
            while self.pending.last() == Some(&0) {
                self.pending.pop();
            }
            if self.pending.is_empty() {
                return Ok(Some(self.scanned));
            }

            let Some(item) = item_at(&self.buf[self.scanned..])? else {
                return Ok(None);
            };
            let end = (self.scanned as u64)
                .saturating_add(item.head as u64)
                .saturating_add(item.body);
            if end > self.limit as u64 {
                return Err(self.too_large());
            }
            if end > self.buf.len() as u64 {
                return Ok(None);
            }

            if let Some(left) = self.pending.last_mut() {
                *left -= 1;
            }
            // `end` is within `buf`, so it fits.
            self.scanned = usize::try_from(end).unwrap_or(self.buf.len());
            if item.children > 0 {
                self.pending.push(item.children);
            }
        }
    }

    /// Size error for the current buffer.
    const fn too_large(&self) -> CodecError {
        CodecError::TooLarge {
            buffered: self.buf.len(),
            limit: self.limit,
        }
    }
}

/// Reads the header of the item at the start of `buf`.
///
/// Returns `Ok(None)` while the header itself is still incomplete.
fn item_at(buf: &[u8]) -> Result<Option<Item>, CodecError> {
    let Some(&byte) = buf.first() else {
        return Ok(None);
    };
    let fixed = |body: u64| Ok(Some(Item { head: 1, body, children: 0 }));
    match Marker::from_u8(byte) {
        Marker::FixPos(_) | Marker::FixNeg(_) | Marker::Null | Marker::True | Marker::False => fixed(0),
        Marker::U8 | Marker::I8 => fixed(1),
        Marker::U16 | Marker::I16 => fixed(2),
        Marker::U32 | Marker::I32 | Marker::F32 => fixed(4),
        Marker::U64 | Marker::I64 | Marker::F64 => fixed(8),
        Marker::FixStr(len) => fixed(u64::from(len)),
        Marker::FixArray(n) => Ok(Some(Item { head: 1, body: 0, children: u64::from(n) })),
        Marker::FixMap(n) => Ok(Some(Item { head: 1, body: 0, children: 2 * u64::from(n) })),
        Marker::Str8 | Marker::Bin8 => Ok(sized(buf, 1, 0)),
        Marker::Str16 | Marker::Bin16 => Ok(sized(buf, 2, 0)),
        Marker::Str32 | Marker::Bin32 => Ok(sized(buf, 4, 0)),
        Marker::Array16 => Ok(counted(buf, 2, 1)),
        Marker::Array32 => Ok(counted(buf, 4, 1)),
        Marker::Map16 => Ok(counted(buf, 2, 2)),
        Marker::Map32 => Ok(counted(buf, 4, 2)),
        Marker::FixExt1 => Ok(Some(Item { head: 2, body: 1, children: 0 })),
        Marker::FixExt2 => Ok(Some(Item { head: 2, body: 2, children: 0 })),
        Marker::FixExt4 => Ok(Some(Item { head: 2, body: 4, children: 0 })),
        Marker::FixExt8 => Ok(Some(Item { head: 2, body: 8, children: 0 })),
        Marker::FixExt16 => Ok(Some(Item { head: 2, body: 16, children: 0 })),
        Marker::Ext8 => Ok(sized(buf, 1, 1)),
        Marker::Ext16 => Ok(sized(buf, 2, 1)),
        Marker::Ext32 => Ok(sized(buf, 4, 1)),
        _ => Err(CodecError::Malformed(format!("reserved marker {byte:#04x}"))),
    }
}

/// Big-endian length prefix of `width` bytes following the marker.
fn prefix(buf: &[u8], width: usize) -> Option<u64> {
    let bytes = buf.get(1..=width)?;
    Some(bytes.iter().fold(0, |n, &b| (n << 8) | u64::from(b)))
}

/// Str, bin or ext item whose prefix gives the payload length.
fn sized(buf: &[u8], width: usize, ext_type: usize) -> Option<Item> {
    Some(Item {
        head: 1 + width + ext_type,
        body: prefix(buf, width)?,
        children: 0,
    })
}

/// Array or map item whose prefix gives the entry count.
fn counted(buf: &[u8], width: usize, per_entry: u64) -> Option<Item> {
    Some(Item {
        head: 1 + width,
        body: 0,
        children: prefix(buf, width)?.saturating_mul(per_entry),
    })
}
