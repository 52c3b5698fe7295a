//! Driver lifecycle state and the data shared by its tasks.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use mesos_id::{FrameworkId, TaskId};
use mesos_proto::{Call, FrameworkInfo};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::policy::{DriverOptions, ResourcePolicy};
use crate::client::Transport;
use crate::error::TaskTerminalError;

// =============================================================================
// Lifecycle
// =============================================================================

/// Lifecycle of a driver.
///
/// ```text
/// Init -> Subscribing -> Subscribed -> Stopping -> Stopped
///              ^              |
///              +--------------+   (stream lost, resubscribing)
/// ```
///
/// `Stopping` and `Stopped` are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Init,
    Subscribing,
    Subscribed,
    Stopping,
    Stopped,
}

impl DriverState {
    fn can_become(self, next: DriverState) -> bool {
        use DriverState::*;
        matches!(
            (self, next),
            (Init, Subscribing)
                | (Init, Stopped)
                | (Subscribing, Subscribed)
                | (Subscribing, Stopping)
                | (Subscribing, Stopped)
                | (Subscribed, Subscribing)
                | (Subscribed, Stopping)
                | (Stopping, Stopped)
        )
    }

    /// Returns true once a stop has been requested.
    pub fn is_stopping(self) -> bool {
        matches!(self, DriverState::Stopping | DriverState::Stopped)
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DriverState::Init => "init",
            DriverState::Subscribing => "subscribing",
            DriverState::Subscribed => "subscribed",
            DriverState::Stopping => "stopping",
            DriverState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Why a driver stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// As many tasks finished as the policy asked for.
    AllTasksFinished,

    /// `stop` was called.
    Requested,

    /// A task failed under the fail-fast policy.
    TaskTerminal(TaskTerminalError),

    /// The event stream ended and reconnecting is disabled.
    StreamClosed,

    /// Every resubscribe attempt failed.
    ReconnectExhausted { attempts: u32 },
}

impl StopReason {
    /// Returns true if the run should be reported as failed.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            StopReason::TaskTerminal(_) | StopReason::ReconnectExhausted { .. }
        )
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::AllTasksFinished => f.write_str("all tasks finished"),
            StopReason::Requested => f.write_str("stop requested"),
            StopReason::TaskTerminal(err) => write!(f, "{err}"),
            StopReason::StreamClosed => f.write_str("event stream closed"),
            StopReason::ReconnectExhausted { attempts } => {
                write!(f, "gave up after {attempts} resubscribe attempts")
            }
        }
    }
}

// =============================================================================
// Counters
// =============================================================================

/// Task accounting, mutated only under the driver's lock.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub launched: u32,
    pub finished: u32,
    pub failed: u32,
    completed: HashSet<TaskId>,
}

impl Counters {
    /// Counts a task as completed. Returns false if it already was.
    pub fn record_completion(&mut self, task_id: &TaskId, failed: bool) -> bool {
        if !self.completed.insert(task_id.clone()) {
            return false;
        }
        self.finished += 1;
        if failed {
            self.failed += 1;
        }
        true
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            launched: self.launched,
            finished: self.finished,
            failed: self.failed,
        }
    }
}

/// Point-in-time copy of the task counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub launched: u32,
    pub finished: u32,
    pub failed: u32,
}

// =============================================================================
// Shared
// =============================================================================

/// Outcome of recording the framework ID from a `SUBSCRIBED` event.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Assignment {
    Assigned,
    Unchanged,
    Conflict,
}

/// State shared by the driver handle, the event pump, the dispatcher and
/// the handlers.
pub(crate) struct Shared {
    pub transport: Arc<dyn Transport>,
    pub framework: FrameworkInfo,
    pub policy: ResourcePolicy,
    pub options: DriverOptions,
    framework_id: OnceLock<FrameworkId>,
    counters: Mutex<Counters>,
    state: watch::Sender<DriverState>,
    stop_reason: OnceLock<StopReason>,
    shutdown: watch::Sender<bool>,
}

impl Shared {
    pub fn new(
        transport: Arc<dyn Transport>,
        framework: FrameworkInfo,
        policy: ResourcePolicy,
        options: DriverOptions,
    ) -> Self {
        let framework_id = OnceLock::new();
        if let Some(id) = framework.id.clone() {
            let _ = framework_id.set(id);
        }

        Self {
            transport,
            framework,
            policy,
            options,
            framework_id,
            counters: Mutex::new(Counters::default()),
            state: watch::Sender::new(DriverState::Init),
            stop_reason: OnceLock::new(),
            shutdown: watch::Sender::new(false),
        }
    }

    pub fn framework_id(&self) -> Option<&FrameworkId> {
        self.framework_id.get()
    }

    pub fn assign_framework_id(&self, id: FrameworkId) -> Assignment {
        match self.framework_id.get() {
            Some(current) if *current == id => Assignment::Unchanged,
            Some(_) => Assignment::Conflict,
            None => match self.framework_id.set(id) {
                Ok(()) => Assignment::Assigned,
                Err(_) => Assignment::Conflict,
            },
        }
    }

    /// `SUBSCRIBE` for the framework, carrying its ID once assigned.
    pub fn subscribe_call(&self) -> Call {
        let mut info = self.framework.clone();
        info.id = self.framework_id().cloned();
        Call::subscribe(info)
    }

    pub fn with_counters<R>(&self, f: impl FnOnce(&mut Counters) -> R) -> R {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut counters)
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.with_counters(|c| c.snapshot())
    }

    // -------------------------------------------------------------------------
    // State
    // -------------------------------------------------------------------------

    pub fn state(&self) -> DriverState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<DriverState> {
        self.state.subscribe()
    }

    /// Moves to `next` if the current state allows it.
    pub fn transition(&self, next: DriverState) -> bool {
        let mut from = None;
        let changed = self.state.send_if_modified(|state| {
            if state.can_become(next) {
                from = Some(*state);
                *state = next;
                true
            } else {
                false
            }
        });
        if let Some(from) = from {
            debug!(from = %from, to = %next, "Driver state changed");
        }
        changed
    }

    /// Moves from `Init` to `Subscribing`; fails for any other state.
    pub fn begin_start(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == DriverState::Init {
                *state = DriverState::Subscribing;
                true
            } else {
                false
            }
        })
    }

    // -------------------------------------------------------------------------
    // Stopping
    // -------------------------------------------------------------------------

    /// Records why the driver stops. The first reason wins.
    pub fn record_stop_reason(&self, reason: StopReason) -> bool {
        self.stop_reason.set(reason).is_ok()
    }

    pub fn stop_reason(&self) -> StopReason {
        self.stop_reason
            .get()
            .cloned()
            .unwrap_or(StopReason::StreamClosed)
    }

    /// Records `reason` and signals every driver task to wind down.
    pub fn request_stop(&self, reason: StopReason) {
        if self.record_stop_reason(reason) {
            info!(reason = %self.stop_reason(), "Driver stopping");
        }
        // Never started: nothing runs that could finish the stop.
        let never_started = self.state.send_if_modified(|state| {
            if *state == DriverState::Init {
                *state = DriverState::Stopped;
                true
            } else {
                false
            }
        });
        if !never_started {
            self.transition(DriverState::Stopping);
        }
        self.shutdown.send_replace(true);
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    // -------------------------------------------------------------------------
    // Calls
    // -------------------------------------------------------------------------

    /// Sends a call whose only acceptable answer is 202. Failures are logged.
    pub async fn issue(&self, call: &Call) -> bool {
        match self.transport.send(call).await {
            Ok(response) if response.status == 202 => true,
            Ok(response) => {
                let status = response.status;
                let body = response.text().await;
                warn!(call = %call.kind, status, body = %body, "Call returned unexpected status");
                false
            }
            Err(e) => {
                warn!(call = %call.kind, error = %e, "Failed to send call");
                false
            }
        }
    }
}

/// Resolves once a stop has been signalled.
pub(crate) async fn stopped(signal: &mut watch::Receiver<bool>) {
    let _ = signal.wait_for(|stop| *stop).await;
}
