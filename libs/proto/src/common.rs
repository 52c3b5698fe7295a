//! Objects shared by scheduler calls and events.
//!
//! These correspond to the manager's common protobuf messages in their JSON
//! mapping. Optional fields are skipped when unset so calls stay minimal.

use mesos_id::{AgentId, ExecutorId, FrameworkId, TaskId};
use serde::{Deserialize, Serialize};

// =============================================================================
// Framework
// =============================================================================

/// Identity a framework registers with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkInfo {
    /// OS user tasks run as on the agents.
    pub user: String,

    /// Human readable framework name.
    pub name: String,

    /// Assigned by the manager on first subscription.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<FrameworkId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Authentication principal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,

    /// Seconds the manager keeps the framework's tasks after it disconnects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failover_timeout: Option<f64>,
}

impl FrameworkInfo {
    /// Creates framework info with the required fields set.
    pub fn new(user: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            name: name.into(),
            id: None,
            hostname: None,
            principal: None,
            failover_timeout: None,
        }
    }
}

// =============================================================================
// Resources
// =============================================================================

/// Resource name for CPU shares.
pub const CPUS: &str = "cpus";

/// Resource name for memory in megabytes.
pub const MEM: &str = "mem";

/// Kind of value a resource carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    Scalar,
    Ranges,
    Set,
    Text,
    #[serde(other)]
    Unknown,
}

/// A floating point quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scalar {
    pub value: f64,
}

/// A named resource dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: ValueType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scalar: Option<Scalar>,
}

impl Resource {
    /// Creates a scalar resource.
    pub fn scalar(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            kind: ValueType::Scalar,
            scalar: Some(Scalar { value }),
        }
    }

    /// Returns the quantity if this is a scalar resource.
    pub fn scalar_value(&self) -> Option<f64> {
        match self.kind {
            ValueType::Scalar => self.scalar.map(|s| s.value),
            _ => None,
        }
    }
}

// =============================================================================
// Task Descriptions
// =============================================================================

/// Command to run for a task or executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Run `value` through `/bin/sh -c`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<bool>,
}

impl CommandInfo {
    /// A command executed through the shell.
    pub fn shell(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            shell: Some(true),
        }
    }
}

/// A custom executor tasks are launched under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorInfo {
    pub executor_id: ExecutorId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub command: CommandInfo,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Description of a task to launch on an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub name: String,
    pub task_id: TaskId,
    pub agent_id: AgentId,

    #[serde(default)]
    pub resources: Vec<Resource>,

    /// Set for command tasks; mutually exclusive with `executor`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Option<ExecutorInfo>,
}

/// Hints attached to an accept or decline.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Filters {
    /// Seconds before the declined resources are offered again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refuse_seconds: Option<f64>,
}

// =============================================================================
// Task Status
// =============================================================================

/// Task lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    #[serde(rename = "TASK_STAGING")]
    Staging,
    #[serde(rename = "TASK_STARTING")]
    Starting,
    #[serde(rename = "TASK_RUNNING")]
    Running,
    #[serde(rename = "TASK_KILLING")]
    Killing,
    #[serde(rename = "TASK_FINISHED")]
    Finished,
    #[serde(rename = "TASK_FAILED")]
    Failed,
    #[serde(rename = "TASK_KILLED")]
    Killed,
    #[serde(rename = "TASK_LOST")]
    Lost,
    #[serde(rename = "TASK_ERROR")]
    Error,
    /// A state introduced by a newer manager.
    #[serde(other)]
    Unknown,
}

impl TaskState {
    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Staging => "TASK_STAGING",
            TaskState::Starting => "TASK_STARTING",
            TaskState::Running => "TASK_RUNNING",
            TaskState::Killing => "TASK_KILLING",
            TaskState::Finished => "TASK_FINISHED",
            TaskState::Failed => "TASK_FAILED",
            TaskState::Killed => "TASK_KILLED",
            TaskState::Lost => "TASK_LOST",
            TaskState::Error => "TASK_ERROR",
            TaskState::Unknown => "TASK_UNKNOWN",
        }
    }

    /// Returns true for states the task never leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Finished
                | TaskState::Failed
                | TaskState::Killed
                | TaskState::Lost
                | TaskState::Error
        )
    }

    /// Returns true for terminal states reached after the task started
    /// (lost, killed or failed).
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, TaskState::Failed | TaskState::Killed | TaskState::Lost)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task state transition reported by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<ExecutorId>,

    /// Acknowledgment token; present when the update expects an ACKNOWLEDGE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl TaskStatus {
    /// Returns the acknowledgment token if one is present and non-empty.
    pub fn ack_token(&self) -> Option<&str> {
        self.uuid.as_deref().filter(|uuid| !uuid.is_empty())
    }
}

// =============================================================================
// Tests
// =============================================================================
