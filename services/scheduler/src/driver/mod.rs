//! The scheduler driver.
//!
//! [`Driver::start`] subscribes and, once the master accepted the
//! subscription, spawns two tasks:
//!
//! - the event pump, which decodes the stream into an unbounded queue and
//!   resubscribes when the stream is lost
//! - the dispatcher, which drains that queue in order and fans offers and
//!   updates out to a bounded pool of handlers
//!
//! Stopping discards queued events, waits for running handlers, then resolves
//! the [`Completion`] with the [`StopReason`].

mod dispatcher;
mod offers;
mod policy;
mod pool;
mod state;
mod subscription;
mod update;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use mesos_id::FrameworkId;
use mesos_proto::{Codec, FrameworkInfo, JsonCodec};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info};

pub use offers::{next_task_id, LaunchDecision, TaskRecord};
pub use policy::{DriverOptions, ResourcePolicy, TaskTemplate, TerminalPolicy};
pub use state::{CounterSnapshot, DriverState, StopReason};

use crate::client::{SchedulerClient, Transport};
use crate::error::DriverError;
use state::Shared;

/// Handle to a scheduler driver.
pub struct Driver {
    shared: Arc<Shared>,
    codec: Arc<dyn Codec>,
}

impl Driver {
    /// Creates a driver for the master at `endpoint` with default options.
    pub fn new(
        endpoint: &str,
        framework: FrameworkInfo,
        policy: ResourcePolicy,
    ) -> Result<Self, DriverError> {
        Self::with_options(endpoint, framework, policy, DriverOptions::default())
    }

    pub fn with_options(
        endpoint: &str,
        framework: FrameworkInfo,
        policy: ResourcePolicy,
        options: DriverOptions,
    ) -> Result<Self, DriverError> {
        let client = SchedulerClient::new(endpoint)?;
        let codec = client.codec();
        let mut driver = Self::with_transport(Arc::new(client), framework, policy, options)?;
        driver.codec = codec;
        Ok(driver)
    }

    /// Creates a driver over a custom transport. Events are decoded as JSON.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        framework: FrameworkInfo,
        policy: ResourcePolicy,
        options: DriverOptions,
    ) -> Result<Self, DriverError> {
        policy.validate()?;
        Ok(Self {
            shared: Arc::new(Shared::new(transport, framework, policy, options)),
            codec: Arc::new(JsonCodec),
        })
    }

    /// Subscribes and starts processing events.
    ///
    /// Returns once the master accepted the subscription. Failing to
    /// subscribe leaves the driver stopped.
    pub async fn start(&self) -> Result<Completion, DriverError> {
        if !self.shared.begin_start() {
            return Err(DriverError::AlreadyStarted);
        }

        let body = match subscription::subscribe(&self.shared).await {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "Subscription failed");
                self.shared.transition(DriverState::Stopped);
                return Err(e);
            }
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(subscription::pump(
            Arc::clone(&self.shared),
            Arc::clone(&self.codec),
            body,
            events_tx,
        ));
        tokio::spawn(dispatcher::run(Arc::clone(&self.shared), events_rx, done_tx));

        info!(
            max_tasks = self.shared.policy.max_tasks,
            cpu_per_task = self.shared.policy.cpu_per_task,
            mem_per_task = self.shared.policy.mem_per_task,
            "Driver started"
        );
        Ok(Completion { rx: done_rx })
    }

    /// Requests a stop. Safe to call any number of times, from any state.
    pub fn stop(&self) {
        if self.shared.state() == DriverState::Stopped {
            return;
        }
        self.shared.request_stop(StopReason::Requested);
    }

    pub fn state(&self) -> DriverState {
        self.shared.state()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<DriverState> {
        self.shared.watch_state()
    }

    pub fn framework_id(&self) -> Option<FrameworkId> {
        self.shared.framework_id().cloned()
    }

    pub fn stream_id(&self) -> Option<String> {
        self.shared.transport.stream_id()
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.shared.counters()
    }
}

/// Resolves with the stop reason once the driver reached `Stopped`.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<StopReason>,
}

impl Completion {
    /// Waits for the driver to stop.
    pub async fn wait(self) -> StopReason {
        self.await
    }
}

impl Future for Completion {
    type Output = StopReason;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(StopReason::StreamClosed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::RecordingTransport;

    fn driver(transport: Arc<RecordingTransport>) -> Driver {
        Driver::with_transport(
            transport,
            FrameworkInfo::new("root", "test"),
            ResourcePolicy::default(),
            DriverOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_invalid_policy() {
        let result = Driver::with_transport(
            Arc::new(RecordingTransport::accepting()),
            FrameworkInfo::new("root", "test"),
            ResourcePolicy::new(1.0, 128.0, 0),
            DriverOptions::default(),
        );
        assert!(matches!(result, Err(DriverError::InvalidPolicy(_))));
    }

    #[tokio::test]
    async fn test_subscribe_status_other_than_200_fails_start() {
        // The recording transport answers everything with 202.
        let transport = Arc::new(RecordingTransport::accepting());
        let driver = driver(transport.clone());

        let err = driver.start().await.unwrap_err();
        assert!(matches!(err, DriverError::Protocol { status: 202, .. }));
        assert_eq!(driver.state(), DriverState::Stopped);
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_fails_start() {
        let driver = driver(Arc::new(RecordingTransport::failing()));
        assert!(matches!(
            driver.start().await,
            Err(DriverError::Transport(_))
        ));
        assert_eq!(driver.state(), DriverState::Stopped);
        assert!(matches!(driver.start().await, Err(DriverError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let driver = driver(Arc::new(RecordingTransport::accepting()));
        driver.stop();
        driver.stop();
        assert_eq!(driver.state(), DriverState::Stopped);
        assert!(matches!(driver.start().await, Err(DriverError::AlreadyStarted)));
    }
}
