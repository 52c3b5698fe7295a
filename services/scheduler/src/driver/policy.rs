//! Knobs that shape how the driver launches tasks and reacts to their fate.

use mesos_proto::{CommandInfo, ExecutorInfo, Filters, Resource, TaskInfo, CPUS, MEM};

use crate::backoff::ReconnectPolicy;
use crate::error::DriverError;

/// Resources claimed per task and how many tasks to run in total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourcePolicy {
    pub cpu_per_task: f64,
    pub mem_per_task: f64,
    pub max_tasks: u32,
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        Self {
            cpu_per_task: 1.0,
            mem_per_task: 128.0,
            max_tasks: 5,
        }
    }
}

impl ResourcePolicy {
    pub fn new(cpu_per_task: f64, mem_per_task: f64, max_tasks: u32) -> Self {
        Self {
            cpu_per_task,
            mem_per_task,
            max_tasks,
        }
    }

    pub fn validate(&self) -> Result<(), DriverError> {
        for (name, value) in [(CPUS, self.cpu_per_task), (MEM, self.mem_per_task)] {
            if !value.is_finite() || value < 0.0 {
                return Err(DriverError::InvalidPolicy(format!(
                    "{name} per task must be a non-negative number, got {value}"
                )));
            }
        }
        if self.max_tasks == 0 {
            return Err(DriverError::InvalidPolicy(
                "max tasks must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resources attached to every launched task.
    pub fn task_resources(&self) -> Vec<Resource> {
        vec![
            Resource::scalar(CPUS, self.cpu_per_task),
            Resource::scalar(MEM, self.mem_per_task),
        ]
    }
}

/// Reaction to a task reaching lost, killed or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TerminalPolicy {
    /// Stop the driver with an error.
    #[default]
    FailFast,

    /// Count the task as completed (and failed) and keep going.
    FailOpen,
}

/// What each launched task runs.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskTemplate {
    /// A shell command run by the default command executor.
    Command(CommandInfo),

    /// A custom executor.
    Executor(ExecutorInfo),
}

impl Default for TaskTemplate {
    fn default() -> Self {
        TaskTemplate::Command(CommandInfo::shell("echo Hello"))
    }
}

impl TaskTemplate {
    pub(crate) fn apply(&self, task: &mut TaskInfo) {
        match self {
            TaskTemplate::Command(command) => {
                task.command = Some(command.clone());
                task.executor = None;
            }
            TaskTemplate::Executor(executor) => {
                task.command = None;
                task.executor = Some(executor.clone());
            }
        }
    }
}

/// Optional driver behavior. The defaults match a plain command scheduler.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub terminal_policy: TerminalPolicy,

    /// Offer and update handlers allowed to run at once.
    pub max_concurrent_handlers: usize,

    pub reconnect: ReconnectPolicy,

    /// Heartbeat intervals without any event before the stream counts as dead.
    pub missed_heartbeats: u32,

    /// `refuse_seconds` filter sent with every accept.
    pub refuse_seconds: Option<f64>,

    pub task_template: TaskTemplate,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            terminal_policy: TerminalPolicy::default(),
            max_concurrent_handlers: 8,
            reconnect: ReconnectPolicy::default(),
            missed_heartbeats: 5,
            refuse_seconds: Some(1.0),
            task_template: TaskTemplate::default(),
        }
    }
}

impl DriverOptions {
    pub(crate) fn filters(&self) -> Option<Filters> {
        self.refuse_seconds.map(|secs| Filters {
            refuse_seconds: Some(secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesos_id::{AgentId, ExecutorId, TaskId};
    use rstest::rstest;

    #[rstest]
    #[case(ResourcePolicy::new(1.0, 128.0, 5), true)]
    #[case(ResourcePolicy::new(0.0, 0.0, 1), true)]
    #[case(ResourcePolicy::new(-1.0, 128.0, 5), false)]
    #[case(ResourcePolicy::new(1.0, f64::NAN, 5), false)]
    #[case(ResourcePolicy::new(1.0, f64::INFINITY, 5), false)]
    #[case(ResourcePolicy::new(1.0, 128.0, 0), false)]
    fn test_policy_validation(#[case] policy: ResourcePolicy, #[case] valid: bool) {
        assert_eq!(policy.validate().is_ok(), valid);
    }

    #[test]
    fn test_executor_template_replaces_command() {
        let mut task = TaskInfo {
            name: "task-1".to_string(),
            task_id: TaskId::new("1"),
            agent_id: AgentId::new("a"),
            resources: vec![],
            command: Some(CommandInfo::shell("true")),
            executor: None,
        };
        let executor = ExecutorInfo {
            executor_id: ExecutorId::new("default"),
            name: Some("Rust-HTTP-Executor".to_string()),
            command: CommandInfo {
                value: Some("/opt/executor".to_string()),
                shell: None,
            },
            source: None,
        };

        TaskTemplate::Executor(executor.clone()).apply(&mut task);
        assert_eq!(task.command, None);
        assert_eq!(task.executor, Some(executor));
    }

    #[test]
    fn test_filters_follow_refuse_seconds() {
        let mut options = DriverOptions::default();
        assert_eq!(options.filters().unwrap().refuse_seconds, Some(1.0));
        options.refuse_seconds = None;
        assert_eq!(options.filters(), None);
    }
}
