//! Encoding of calls and events.
//!
//! The scheduler core works on decoded `Call`/`Event` values only; the codec
//! decides how they look on the wire and which media type is negotiated.

use bytes::Bytes;
use thiserror::Error;

use crate::scheduler::{Call, Event};

/// Errors produced while encoding or decoding a message.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A call could not be encoded.
    #[error("failed to encode call: {0}")]
    Encode(String),

    /// A record could not be decoded into an event.
    #[error("failed to decode event: {0}")]
    Decode(String),
}

impl CodecError {
    /// Returns true if this error came from decoding an inbound record.
    pub fn is_decode(&self) -> bool {
        matches!(self, CodecError::Decode(_))
    }
}

/// A wire encoding for scheduler messages.
pub trait Codec: Send + Sync + 'static {
    /// Media type sent as `Content-Type` and requested via `Accept`.
    fn content_type(&self) -> &'static str;

    /// Encodes an outbound call.
    fn encode_call(&self, call: &Call) -> Result<Bytes, CodecError>;

    /// Decodes one record of the event stream.
    fn decode_event(&self, record: &[u8]) -> Result<Event, CodecError>;
}

/// JSON encoding as served by the manager for `application/json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode_call(&self, call: &Call) -> Result<Bytes, CodecError> {
        serde_json::to_vec(call)
            .map(Bytes::from)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode_event(&self, record: &[u8]) -> Result<Event, CodecError> {
        serde_json::from_slice(record).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
