//! Error types for the scheduler driver.
//!
//! Only a failed initial subscription surfaces to the caller. Everything that
//! goes wrong after that is logged and the driver keeps running, except for a
//! task reaching a failure state under the fail-fast policy.

use mesos_id::TaskId;
use mesos_proto::recordio::FramingError;
use mesos_proto::{CodecError, TaskState};
use thiserror::Error;

/// Failure issuing a call or reading a response body.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The master endpoint could not be turned into a URL.
    #[error("invalid master endpoint {endpoint:?}: {message}")]
    InvalidEndpoint { endpoint: String, message: String },

    /// The call could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Dial, write or protocol failure issuing the request.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The response body could not be read.
    #[error("response body read failed: {0}")]
    Body(#[source] reqwest::Error),
}

/// Failure that ends an event stream.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("event stream transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("event stream framing lost: {0}")]
    Framing(#[from] FramingError),
}

/// Errors returned to the caller of the driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The subscription call could not be issued.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The master answered the subscription with an unexpected status.
    #[error("subscribe returned unexpected status {status}: {body}")]
    Protocol { status: u16, body: String },

    /// The resource policy cannot launch anything sensible.
    #[error("invalid resource policy: {0}")]
    InvalidPolicy(String),

    /// `start` was called on a driver that already left the initial state.
    #[error("driver already started")]
    AlreadyStarted,
}

impl DriverError {
    /// Returns true if the master was reached but refused the subscription.
    pub fn is_protocol(&self) -> bool {
        matches!(self, DriverError::Protocol { .. })
    }
}

/// A task reached lost, killed or failed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "task {task_id} is in unexpected state {state} with reason {} from source {}: {}",
    .reason.as_deref().unwrap_or("-"),
    .origin.as_deref().unwrap_or("-"),
    .message.as_deref().unwrap_or("")
)]
pub struct TaskTerminalError {
    pub task_id: TaskId,
    pub state: TaskState,
    pub reason: Option<String>,
    /// Component that reported the state (master, agent or executor).
    pub origin: Option<String>,
    pub message: Option<String>,
}
