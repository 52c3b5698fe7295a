//! Greedy packing of tasks into offers.
//!
//! Quantities are compared in thousandths so that packing `N` tasks into an
//! offer sized for exactly `N` never falls short by a rounding error.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use mesos_id::{AgentId, FrameworkId, OfferId, TaskId};
use mesos_proto::{Call, Filters, Offer, Resource, TaskInfo, CPUS, MEM};
use tracing::{debug, info, warn};

use super::policy::{ResourcePolicy, TaskTemplate};
use super::state::{Counters, Shared};

const MILLIS_PER_UNIT: f64 = 1000.0;

fn to_millis(value: f64) -> i64 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    (value * MILLIS_PER_UNIT).round() as i64
}

fn from_millis(value: i64) -> f64 {
    value as f64 / MILLIS_PER_UNIT
}

/// Scalar `cpus` and `mem` of an offer, in thousandths. Other resources and
/// non-scalar values are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Capacity {
    cpus: i64,
    mem: i64,
}

impl Capacity {
    fn of(resources: &[Resource]) -> Self {
        let mut capacity = Capacity::default();
        for resource in resources {
            let Some(value) = resource.scalar_value() else {
                continue;
            };
            match resource.name.as_str() {
                CPUS => capacity.cpus += to_millis(value),
                MEM => capacity.mem += to_millis(value),
                _ => {}
            }
        }
        capacity
    }

    fn fits(&self, need: &Capacity) -> bool {
        self.cpus >= need.cpus && self.mem >= need.mem
    }

    fn take(&mut self, need: &Capacity) {
        self.cpus -= need.cpus;
        self.mem -= need.mem;
    }
}

/// A task the scheduler decided to launch.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub resources: Vec<Resource>,
    pub launched_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn name(&self) -> String {
        format!("task-{}", self.task_id)
    }

    fn into_task_info(self, template: &TaskTemplate) -> TaskInfo {
        let mut task = TaskInfo {
            name: self.name(),
            task_id: self.task_id,
            agent_id: self.agent_id,
            resources: self.resources,
            command: None,
            executor: None,
        };
        template.apply(&mut task);
        task
    }
}

/// Tasks to launch on one offer. An empty decision declines the offer.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchDecision {
    pub offer_id: OfferId,
    pub agent_id: AgentId,
    pub tasks: Vec<TaskRecord>,
    pub remaining_cpus: f64,
    pub remaining_mem: f64,
}

impl LaunchDecision {
    pub fn is_decline(&self) -> bool {
        self.tasks.is_empty()
    }

    /// The single `ACCEPT` answering the offer.
    pub fn into_call(
        self,
        framework_id: FrameworkId,
        template: &TaskTemplate,
        filters: Option<Filters>,
    ) -> Call {
        let tasks = self
            .tasks
            .into_iter()
            .map(|task| task.into_task_info(template))
            .collect();
        Call::accept(framework_id, self.offer_id, tasks, filters)
    }
}

/// Packs as many tasks as fit into `offer`, bounded by the tasks the policy
/// still allows. Each task is counted as launched before it is returned.
pub(crate) fn match_offer(offer: &Offer, policy: &ResourcePolicy, counters: &mut Counters) -> LaunchDecision {
    let mut available = Capacity::of(&offer.resources);
    let need = Capacity {
        cpus: to_millis(policy.cpu_per_task),
        mem: to_millis(policy.mem_per_task),
    };

    let mut tasks = Vec::new();
    while counters.launched < policy.max_tasks && available.fits(&need) {
        tasks.push(TaskRecord {
            task_id: next_task_id(),
            agent_id: offer.agent_id.clone(),
            resources: policy.task_resources(),
            launched_at: Utc::now(),
        });
        counters.launched += 1;
        available.take(&need);
    }

    LaunchDecision {
        offer_id: offer.id.clone(),
        agent_id: offer.agent_id.clone(),
        tasks,
        remaining_cpus: from_millis(available.cpus),
        remaining_mem: from_millis(available.mem),
    }
}

static LAST_TASK_ID: AtomicI64 = AtomicI64::new(0);

/// Wall-clock nanoseconds, bumped so IDs strictly increase within a process.
pub fn next_task_id() -> TaskId {
    let now = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
    let mut last = LAST_TASK_ID.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last.saturating_add(1));
        match LAST_TASK_ID.compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => return TaskId::new(candidate.to_string()),
            Err(actual) => last = actual,
        }
    }
}

/// Answers one offer with exactly one `ACCEPT`.
pub(crate) async fn handle_offer(shared: &Shared, offer: Offer) {
    let Some(framework_id) = shared.framework_id().cloned() else {
        warn!(offer_id = %offer.id, "Dropping offer received before subscription");
        return;
    };

    let decision = shared.with_counters(|counters| match_offer(&offer, &shared.policy, counters));
    if decision.is_decline() {
        debug!(
            offer_id = %decision.offer_id,
            agent_id = %decision.agent_id,
            "Declining offer"
        );
    } else {
        info!(
            offer_id = %decision.offer_id,
            agent_id = %decision.agent_id,
            hostname = offer.hostname.as_deref().unwrap_or(""),
            tasks = decision.tasks.len(),
            remaining_cpus = decision.remaining_cpus,
            remaining_mem = decision.remaining_mem,
            "Launching tasks"
        );
    }

    let call = decision.into_call(
        framework_id,
        &shared.options.task_template,
        shared.options.filters(),
    );
    shared.issue(&call).await;
}
