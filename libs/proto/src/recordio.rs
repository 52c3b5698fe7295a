//! RecordIO framing of the event stream.
//!
//! Each record is its payload length in ASCII decimal, a `\n`, then exactly
//! that many payload bytes:
//!
//! ```text
//! 20\n{"type":"HEARTBEAT"}
//! ```
//!
//! Framing is independent of payload validity, so a consumer can drop a
//! record it fails to decode and carry on with the next one. A corrupt length
//! header, on the other hand, loses the framing for good.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

/// Upper bound for a single record, and for a length header still waiting
/// for its newline.
pub const DEFAULT_MAX_RECORD_LEN: usize = 64 * 1024 * 1024;

/// Longest length header accepted (enough digits for any `usize`).
const MAX_HEADER_LEN: usize = 20;

/// Errors that make the stream unreadable from this point on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// The length header contains something other than decimal digits.
    #[error("invalid record length header: {0:?}")]
    InvalidHeader(String),

    /// The declared record length exceeds the configured maximum.
    #[error("record of {len} bytes exceeds limit of {max} bytes")]
    RecordTooLarge { len: usize, max: usize },
}

/// Frames one payload as a record.
pub fn encode(payload: &[u8]) -> Bytes {
    let header = format!("{}\n", payload.len());
    let mut buf = BytesMut::with_capacity(header.len() + payload.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(payload);
    buf.freeze()
}

/// Incremental record decoder.
///
/// Feed arbitrary chunks with [`push`](Self::push) and pull complete records
/// with [`next_record`](Self::next_record). Partial headers and payloads are
/// held until the rest arrives.
#[derive(Debug)]
pub struct RecordIoDecoder {
    buf: BytesMut,
    pending_len: Option<usize>,
    max_record_len: usize,
}

impl Default for RecordIoDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECORD_LEN)
    }
}

impl RecordIoDecoder {
    pub fn new(max_record_len: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            pending_len: None,
            max_record_len,
        }
    }

    /// Appends a chunk read from the stream.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Returns true if bytes of an incomplete record are buffered.
    pub fn has_partial(&self) -> bool {
        self.pending_len.is_some() || !self.buf.is_empty()
    }

    /// Returns the next complete record, or `None` if more input is needed.
    pub fn next_record(&mut self) -> Result<Option<Bytes>, FramingError> {
        let len = match self.pending_len {
            Some(len) => len,
            None => match self.read_header()? {
                Some(len) => len,
                None => return Ok(None),
            },
        };

        if self.buf.len() < len {
            self.pending_len = Some(len);
            return Ok(None);
        }

        self.pending_len = None;
        Ok(Some(self.buf.split_to(len).freeze()))
    }

    fn read_header(&mut self) -> Result<Option<usize>, FramingError> {
        let Some(newline) = self.buf.iter().position(|b| *b == b'\n') else {
            if self.buf.len() > MAX_HEADER_LEN {
                return Err(FramingError::InvalidHeader(lossy_prefix(&self.buf)));
            }
            return Ok(None);
        };

        let header = &self.buf[..newline];
        let text = std::str::from_utf8(header)
            .map_err(|_| FramingError::InvalidHeader(lossy_prefix(header)))?
            .trim();

        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FramingError::InvalidHeader(lossy_prefix(header)));
        }

        let len: usize = text
            .parse()
            .map_err(|_| FramingError::InvalidHeader(lossy_prefix(header)))?;

        if len > self.max_record_len {
            return Err(FramingError::RecordTooLarge {
                len,
                max: self.max_record_len,
            });
        }

        self.buf.advance(newline + 1);
        Ok(Some(len))
    }
}

fn lossy_prefix(bytes: &[u8]) -> String {
    let end = bytes.len().min(32);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn drain(decoder: &mut RecordIoDecoder) -> Vec<Bytes> {
        let mut records = Vec::new();
        while let Some(record) = decoder.next_record().unwrap() {
            records.push(record);
        }
        records
    }

    #[test]
    fn test_encode_prefixes_length() {
        assert_eq!(&encode(b"hello")[..], b"5\nhello");
        assert_eq!(&encode(b"")[..], b"0\n");
    }

    #[test]
    fn test_decodes_back_to_back_records() {
        let mut decoder = RecordIoDecoder::default();
        decoder.push(b"3\nabc2\nde");
        let records = drain(&mut decoder);
        assert_eq!(records, vec![Bytes::from("abc"), Bytes::from("de")]);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn test_holds_partial_header_and_payload() {
        let mut decoder = RecordIoDecoder::default();
        decoder.push(b"1");
        assert_eq!(decoder.next_record().unwrap(), None);
        decoder.push(b"1\nhello");
        assert_eq!(decoder.next_record().unwrap(), None);
        assert!(decoder.has_partial());
        decoder.push(b" world");
        assert_eq!(
            decoder.next_record().unwrap(),
            Some(Bytes::from("hello world"))
        );
    }

    #[test]
    fn test_rejects_non_numeric_header() {
        let mut decoder = RecordIoDecoder::default();
        decoder.push(b"{\"type\":\"HEARTBEAT\"}\n");
        assert!(matches!(
            decoder.next_record(),
            Err(FramingError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_rejects_oversized_record() {
        let mut decoder = RecordIoDecoder::new(4);
        decoder.push(b"5\nhello");
        assert_eq!(
            decoder.next_record(),
            Err(FramingError::RecordTooLarge { len: 5, max: 4 })
        );
    }

    #[test]
    fn test_rejects_runaway_header() {
        let mut decoder = RecordIoDecoder::default();
        decoder.push(b"123456789012345678901234");
        assert!(decoder.next_record().is_err());
    }

    proptest! {
        #[test]
        fn prop_any_chunking_yields_same_records(
            payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..8),
            chunk in 1usize..17,
        ) {
            let mut wire = Vec::new();
            for payload in &payloads {
                wire.extend_from_slice(&encode(payload));
            }

            let mut decoder = RecordIoDecoder::default();
            let mut records = Vec::new();
            for piece in wire.chunks(chunk) {
                decoder.push(piece);
                records.extend(drain(&mut decoder));
            }

            let expected: Vec<Bytes> = payloads.into_iter().map(Bytes::from).collect();
            prop_assert_eq!(records, expected);
            prop_assert!(!decoder.has_partial());
        }
    }
}
