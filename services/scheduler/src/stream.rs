//! Decoding of the subscription response into events.

use std::pin::Pin;
use std::sync::Arc;

use futures_core::Stream;
use futures_util::{stream, StreamExt};
use mesos_proto::recordio::RecordIoDecoder;
use mesos_proto::{Codec, Event};
use tracing::warn;

use crate::client::BodyStream;
use crate::error::StreamError;

/// Events in arrival order.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Event, StreamError>> + Send>>;

/// Turns a RecordIO framed body into events.
///
/// Records that fail to decode are logged and skipped. A transport or framing
/// error is yielded once and ends the stream, as does the end of the body.
pub fn decode_events(body: BodyStream, codec: Arc<dyn Codec>) -> EventStream {
    let state = Decoder {
        body,
        codec,
        records: RecordIoDecoder::default(),
        skipped: 0,
        done: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        let item = state.next_event().await?;
        Some((item, state))
    }))
}

struct Decoder {
    body: BodyStream,
    codec: Arc<dyn Codec>,
    records: RecordIoDecoder,
    skipped: u64,
    done: bool,
}

impl Decoder {
    async fn next_event(&mut self) -> Option<Result<Event, StreamError>> {
        if self.done {
            return None;
        }

        loop {
            match self.records.next_record() {
                Ok(Some(record)) => match self.codec.decode_event(&record) {
                    Ok(event) => return Some(Ok(event)),
                    Err(e) => {
                        self.skipped += 1;
                        warn!(
                            error = %e,
                            record_len = record.len(),
                            skipped = self.skipped,
                            "Discarding undecodable event record"
                        );
                        continue;
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.records.push(&chunk),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
                None => {
                    self.done = true;
                    if self.records.has_partial() {
                        warn!("Event stream ended inside a record");
                    }
                    return None;
                }
            }
        }
    }
}
