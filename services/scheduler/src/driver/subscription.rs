//! The persistent subscription: subscribing, pumping the event stream into
//! the dispatcher queue, and resubscribing when the stream is lost.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use mesos_proto::{Codec, Event, EventType};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::state::{stopped, DriverState, Shared, StopReason};
use crate::client::BodyStream;
use crate::error::{DriverError, StreamError};
use crate::stream::{decode_events, EventStream};

/// Issues `SUBSCRIBE` and returns the event stream body.
pub(crate) async fn subscribe(shared: &Shared) -> Result<BodyStream, DriverError> {
    let call = shared.subscribe_call();
    info!(
        framework = %shared.framework.name,
        framework_id = call.framework_id.as_ref().map(|id| id.as_str()).unwrap_or(""),
        "Subscribing"
    );

    let response = shared.transport.send(&call).await?;
    if response.status != 200 {
        let status = response.status;
        let body = response.text().await;
        return Err(DriverError::Protocol { status, body });
    }

    debug!(
        stream_id = response.stream_id.as_deref().unwrap_or(""),
        "Subscription accepted"
    );
    Ok(response.body)
}

/// Why one event stream stopped being read.
#[derive(Debug)]
enum StreamEnd {
    Shutdown,
    QueueClosed,
    Eof,
    Failed(StreamError),
    Silent(Duration),
}

/// Reads events until shutdown, resubscribing per the reconnect policy.
/// Returning drops the queue sender, which lets the dispatcher finish.
///
/// Reconnect attempts accumulate across streams that end before delivering
/// `SUBSCRIBED`; only a stream that delivers one resets the count.
pub(crate) async fn pump(
    shared: Arc<Shared>,
    codec: Arc<dyn Codec>,
    body: BodyStream,
    events: mpsc::UnboundedSender<Event>,
) {
    let mut shutdown = shared.shutdown_signal();
    let mut body = body;
    let mut window = None;
    let mut attempts = 0;

    loop {
        let stream = decode_events(body, Arc::clone(&codec));
        let end = read_stream(
            &shared,
            stream,
            &events,
            &mut window,
            &mut attempts,
            &mut shutdown,
        )
        .await;
        match end {
            StreamEnd::Shutdown | StreamEnd::QueueClosed => break,
            StreamEnd::Eof => info!("Event stream closed by master"),
            StreamEnd::Failed(e) => warn!(error = %e, "Event stream failed"),
            StreamEnd::Silent(window) => warn!(
                window_ms = window.as_millis() as u64,
                "No events within liveness window; dropping stream"
            ),
        }

        match resubscribe(&shared, &mut attempts, &mut shutdown).await {
            Some(next) => body = next,
            None => break,
        }
    }

    debug!("Event pump exiting");
}

async fn read_stream(
    shared: &Shared,
    mut stream: EventStream,
    events: &mpsc::UnboundedSender<Event>,
    window: &mut Option<Duration>,
    attempts: &mut u32,
    shutdown: &mut watch::Receiver<bool>,
) -> StreamEnd {
    loop {
        let current = *window;
        let next = async {
            match current {
                Some(window) => tokio::time::timeout(window, stream.next())
                    .await
                    .map_err(|_| window),
                None => Ok(stream.next().await),
            }
        };

        tokio::select! {
            biased;
            _ = stopped(shutdown) => return StreamEnd::Shutdown,
            next = next => match next {
                Err(window) => return StreamEnd::Silent(window),
                Ok(None) => return StreamEnd::Eof,
                Ok(Some(Err(e))) => return StreamEnd::Failed(e),
                Ok(Some(Ok(event))) => {
                    if event.kind == EventType::Subscribed {
                        *attempts = 0;
                    }
                    if let Some(announced) = liveness_window(&event, shared.options.missed_heartbeats) {
                        debug!(window_ms = announced.as_millis() as u64, "Event stream liveness window set");
                        *window = Some(announced);
                    }
                    if events.send(event).is_err() {
                        return StreamEnd::QueueClosed;
                    }
                }
            },
        }
    }
}

/// Longest silence tolerated after a `SUBSCRIBED` announcing heartbeats.
fn liveness_window(event: &Event, missed_heartbeats: u32) -> Option<Duration> {
    let seconds = event.subscribed.as_ref()?.heartbeat_interval_seconds?;
    if missed_heartbeats == 0 {
        return None;
    }
    if !seconds.is_finite() || seconds <= 0.0 {
        warn!(seconds, "Ignoring invalid heartbeat interval");
        return None;
    }
    Some(Duration::from_secs_f64(seconds * f64::from(missed_heartbeats)))
}

async fn resubscribe(
    shared: &Shared,
    attempts: &mut u32,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<BodyStream> {
    let policy = &shared.options.reconnect;
    if !policy.is_enabled() {
        return None;
    }
    // A stream lost before its SUBSCRIBED leaves the driver in Subscribing.
    if !shared.transition(DriverState::Subscribing)
        && shared.state() != DriverState::Subscribing
    {
        return None;
    }

    while *attempts < policy.max_attempts {
        let attempt = *attempts;
        *attempts += 1;
        let delay = policy.backoff.delay(attempt);
        info!(
            attempt = attempt + 1,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Resubscribing"
        );
        tokio::select! {
            biased;
            _ = stopped(shutdown) => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        match subscribe(shared).await {
            Ok(body) => {
                info!(attempt = attempt + 1, "Resubscribed");
                return Some(body);
            }
            Err(e) => warn!(attempt = attempt + 1, error = %e, "Resubscribe failed"),
        }
    }

    error!(attempts = policy.max_attempts, "Giving up on resubscribing");
    shared.record_stop_reason(StopReason::ReconnectExhausted {
        attempts: policy.max_attempts,
    });
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesos_id::FrameworkId;

    #[test]
    fn test_liveness_window_from_subscribed() {
        let subscribed = Event::subscribed(FrameworkId::new("fw-1"), Some(15.0));
        assert_eq!(liveness_window(&subscribed, 5), Some(Duration::from_secs(75)));
        assert_eq!(liveness_window(&subscribed, 0), None);
    }

    #[test]
    fn test_liveness_window_ignores_other_events() {
        assert_eq!(liveness_window(&Event::heartbeat(), 5), None);
        let silent = Event::subscribed(FrameworkId::new("fw-1"), None);
        assert_eq!(liveness_window(&silent, 5), None);
        let bogus = Event::subscribed(FrameworkId::new("fw-1"), Some(-3.0));
        assert_eq!(liveness_window(&bogus, 5), None);
    }
}
