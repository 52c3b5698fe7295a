//! Task status updates and their acknowledgment.

use mesos_proto::{Call, TaskState, TaskStatus};
use tracing::{debug, error, info, warn};

use super::policy::TerminalPolicy;
use super::state::{Counters, Shared, StopReason};
use crate::error::TaskTerminalError;

/// Effect of one status update on the task accounting.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StatusOutcome {
    /// Not terminal; nothing counted.
    Progress,

    /// A terminal update for a task that was already counted.
    Duplicate,

    /// Counted, with more tasks still to go.
    Completed { finished: u32 },

    /// Counted, and the target number of tasks has finished.
    AllFinished { finished: u32 },

    /// A task failed and the policy says to stop.
    Fatal(TaskTerminalError),
}

/// Applies a status to the counters.
pub(crate) fn apply_status(
    status: &TaskStatus,
    policy: TerminalPolicy,
    max_tasks: u32,
    counters: &mut Counters,
) -> StatusOutcome {
    let failed = match status.state {
        TaskState::Finished => false,
        TaskState::Error => true,
        state if state.is_terminal_failure() => match policy {
            TerminalPolicy::FailFast => return StatusOutcome::Fatal(terminal_error(status)),
            TerminalPolicy::FailOpen => true,
        },
        _ => return StatusOutcome::Progress,
    };

    if !counters.record_completion(&status.task_id, failed) {
        return StatusOutcome::Duplicate;
    }
    if counters.finished >= max_tasks {
        StatusOutcome::AllFinished {
            finished: counters.finished,
        }
    } else {
        StatusOutcome::Completed {
            finished: counters.finished,
        }
    }
}

fn terminal_error(status: &TaskStatus) -> TaskTerminalError {
    TaskTerminalError {
        task_id: status.task_id.clone(),
        state: status.state,
        reason: status.reason.clone(),
        origin: status.source.clone(),
        message: status.message.clone(),
    }
}

/// Acknowledges the update if it asks for it, then accounts for it.
pub(crate) async fn handle_update(shared: &Shared, status: TaskStatus) {
    debug!(
        task_id = %status.task_id,
        state = %status.state,
        source = status.source.as_deref().unwrap_or(""),
        "Received status update"
    );

    if status.ack_token().is_some() {
        acknowledge(shared, &status).await;
    }

    let outcome = shared.with_counters(|counters| {
        apply_status(
            &status,
            shared.options.terminal_policy,
            shared.policy.max_tasks,
            counters,
        )
    });

    match outcome {
        StatusOutcome::Progress => {}
        StatusOutcome::Duplicate => {
            debug!(task_id = %status.task_id, state = %status.state, "Ignoring repeated terminal update");
        }
        StatusOutcome::Completed { finished } => {
            info!(
                task_id = %status.task_id,
                state = %status.state,
                finished,
                max_tasks = shared.policy.max_tasks,
                "Task completed"
            );
        }
        StatusOutcome::AllFinished { finished } => {
            info!(finished, "All tasks finished");
            shared.request_stop(StopReason::AllTasksFinished);
        }
        StatusOutcome::Fatal(err) => {
            error!(
                task_id = %err.task_id,
                state = %err.state,
                reason = err.reason.as_deref().unwrap_or(""),
                source = err.origin.as_deref().unwrap_or(""),
                message = err.message.as_deref().unwrap_or(""),
                "Task reached unexpected state"
            );
            shared.request_stop(StopReason::TaskTerminal(err));
        }
    }
}

async fn acknowledge(shared: &Shared, status: &TaskStatus) {
    let (Some(framework_id), Some(agent_id), Some(uuid)) = (
        shared.framework_id().cloned(),
        status.agent_id.clone(),
        status.ack_token(),
    ) else {
        warn!(task_id = %status.task_id, "Cannot acknowledge update without framework and agent id");
        return;
    };

    let call = Call::acknowledge(framework_id, agent_id, status.task_id.clone(), uuid);
    if shared.issue(&call).await {
        debug!(task_id = %status.task_id, state = %status.state, "Acknowledged status update");
    }
}
