//! Configuration for the scheduler binary.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use mesos_id::ExecutorId;
use mesos_proto::{CommandInfo, ExecutorInfo, FrameworkInfo};

use crate::backoff::ReconnectPolicy;
use crate::driver::{DriverOptions, ResourcePolicy, TaskTemplate, TerminalPolicy};

const HOSTNAME_FILE: &str = "/proc/sys/kernel/hostname";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Launches a fixed number of tasks on a Mesos cluster.
#[derive(Debug, Clone, Parser)]
#[command(name = "mesos-scheduler")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Master address as host:port or URL.
    #[arg(long, env = "MESOS_MASTER", default_value = "127.0.0.1:5050")]
    pub master: String,

    /// User tasks run as. Defaults to the current user.
    #[arg(long, env = "MESOS_USER")]
    pub user: Option<String>,

    /// Framework name.
    #[arg(long, env = "MESOS_FRAMEWORK_NAME", default_value = "Rust-HTTP-Scheduler")]
    pub name: String,

    /// Hostname reported to the master.
    #[arg(long, env = "MESOS_HOSTNAME")]
    pub hostname: Option<String>,

    /// Authentication principal.
    #[arg(long, env = "MESOS_PRINCIPAL")]
    pub principal: Option<String>,

    #[arg(long, env = "MESOS_CPU_PER_TASK", default_value_t = 1.0)]
    pub cpu_per_task: f64,

    /// Memory per task in MB.
    #[arg(long, env = "MESOS_MEM_PER_TASK", default_value_t = 128.0)]
    pub mem_per_task: f64,

    /// Tasks to run before exiting.
    #[arg(long, env = "MESOS_MAX_TASKS", default_value_t = 5)]
    pub max_tasks: u32,

    /// Shell command each task runs.
    #[arg(long, env = "MESOS_TASK_COMMAND", default_value = "echo Hello")]
    pub command: String,

    /// Path of a custom executor; replaces --command.
    #[arg(long, env = "MESOS_EXECUTOR")]
    pub executor: Option<PathBuf>,

    /// Seconds before declined resources are offered again.
    #[arg(long, env = "MESOS_REFUSE_SECONDS", default_value_t = 1.0)]
    pub refuse_seconds: f64,

    /// What to do when a task is lost, killed or failed.
    #[arg(long, env = "MESOS_TERMINAL_POLICY", value_enum, default_value_t = TerminalPolicy::FailFast)]
    pub terminal_policy: TerminalPolicy,

    /// Offer and update handlers running at once.
    #[arg(long, env = "MESOS_MAX_CONCURRENT_HANDLERS", default_value_t = 8)]
    pub max_concurrent_handlers: usize,

    /// Resubscribe attempts after losing the event stream (0 disables).
    #[arg(long, env = "MESOS_RECONNECT_ATTEMPTS", default_value_t = 10)]
    pub reconnect_attempts: u32,

    /// Log filter (trace, debug, info, warn, error), overridden by RUST_LOG.
    #[arg(long, env = "MESOS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "MESOS_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

impl Config {
    /// Framework identity to subscribe with.
    pub fn framework_info(&self) -> Result<FrameworkInfo> {
        let user = match self.user.as_deref().filter(|u| !u.is_empty()) {
            Some(user) => user.to_string(),
            None => current_user()?,
        };

        let mut info = FrameworkInfo::new(user, self.name.clone());
        info.hostname = Some(
            self.hostname
                .clone()
                .filter(|h| !h.is_empty())
                .unwrap_or_else(local_hostname),
        );
        info.principal = self.principal.clone();
        Ok(info)
    }

    pub fn resource_policy(&self) -> ResourcePolicy {
        ResourcePolicy::new(self.cpu_per_task, self.mem_per_task, self.max_tasks)
    }

    pub fn driver_options(&self) -> DriverOptions {
        let task_template = match &self.executor {
            Some(path) => TaskTemplate::Executor(ExecutorInfo {
                executor_id: ExecutorId::new("default"),
                name: Some("Rust-HTTP-Executor".to_string()),
                command: CommandInfo {
                    value: Some(path.display().to_string()),
                    shell: None,
                },
                source: Some("mesos-scheduler".to_string()),
            }),
            None => TaskTemplate::Command(CommandInfo::shell(self.command.clone())),
        };

        DriverOptions {
            terminal_policy: self.terminal_policy,
            max_concurrent_handlers: self.max_concurrent_handlers,
            reconnect: ReconnectPolicy {
                max_attempts: self.reconnect_attempts,
                ..ReconnectPolicy::default()
            },
            refuse_seconds: Some(self.refuse_seconds).filter(|s| *s >= 0.0),
            task_template,
            ..DriverOptions::default()
        }
    }
}

fn current_user() -> Result<String> {
    for var in ["USER", "LOGNAME"] {
        if let Ok(user) = std::env::var(var) {
            if !user.is_empty() {
                return Ok(user);
            }
        }
    }
    bail!("Unable to determine the current user; pass --user")
}

fn local_hostname() -> String {
    std::fs::read_to_string(HOSTNAME_FILE)
        .ok()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty()))
        .unwrap_or_else(|| "UNKNOWN".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["mesos-scheduler", "--user", "root"]).unwrap();
        assert_eq!(config.master, "127.0.0.1:5050");
        assert_eq!(config.name, "Rust-HTTP-Scheduler");
        assert_eq!(config.resource_policy(), ResourcePolicy::new(1.0, 128.0, 5));
        assert_eq!(config.terminal_policy, TerminalPolicy::FailFast);

        let options = config.driver_options();
        assert_eq!(options.max_concurrent_handlers, 8);
        assert_eq!(options.reconnect.max_attempts, 10);
        assert_eq!(options.refuse_seconds, Some(1.0));
        assert_eq!(
            options.task_template,
            TaskTemplate::Command(CommandInfo::shell("echo Hello"))
        );
    }

    #[test]
    fn test_framework_info_uses_flags() {
        let config = Config::try_parse_from([
            "mesos-scheduler",
            "--user",
            "alice",
            "--name",
            "batch",
            "--hostname",
            "sched-1",
            "--principal",
            "ops",
        ])
        .unwrap();

        let info = config.framework_info().unwrap();
        assert_eq!(info.user, "alice");
        assert_eq!(info.name, "batch");
        assert_eq!(info.hostname.as_deref(), Some("sched-1"));
        assert_eq!(info.principal.as_deref(), Some("ops"));
        assert_eq!(info.id, None);
    }

    #[test]
    fn test_executor_and_policies() {
        let config = Config::try_parse_from([
            "mesos-scheduler",
            "--user",
            "root",
            "--executor",
            "/opt/executor",
            "--terminal-policy",
            "fail-open",
            "--reconnect-attempts",
            "0",
            "--log-format",
            "pretty",
        ])
        .unwrap();

        let options = config.driver_options();
        assert_eq!(options.terminal_policy, TerminalPolicy::FailOpen);
        assert!(!options.reconnect.is_enabled());
        assert_eq!(config.log_format, LogFormat::Pretty);
        let TaskTemplate::Executor(executor) = options.task_template else {
            panic!("expected executor template");
        };
        assert_eq!(executor.command.value.as_deref(), Some("/opt/executor"));
        assert_eq!(executor.executor_id, ExecutorId::new("default"));
    }
}
