//! Scheduler calls and events.
//!
//! A scheduler POSTs `Call`s to the manager's scheduler endpoint. The response
//! to `SUBSCRIBE` stays open and carries the `Event`s for the framework.

use mesos_id::{AgentId, ExecutorId, FrameworkId, OfferId, TaskId};
use serde::{Deserialize, Serialize};

use crate::common::{Filters, FrameworkInfo, Resource, TaskInfo, TaskStatus};

// =============================================================================
// Calls
// =============================================================================

/// Call kinds a scheduler issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallType {
    Subscribe,
    Accept,
    /// Never sent by this scheduler; an accept without tasks declines.
    Decline,
    Acknowledge,
}

impl std::fmt::Display for CallType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallType::Subscribe => write!(f, "SUBSCRIBE"),
            CallType::Accept => write!(f, "ACCEPT"),
            CallType::Decline => write!(f, "DECLINE"),
            CallType::Acknowledge => write!(f, "ACKNOWLEDGE"),
        }
    }
}

/// A request from the scheduler to the manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// Required on every call except the first `SUBSCRIBE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework_id: Option<FrameworkId>,

    #[serde(rename = "type")]
    pub kind: CallType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<Subscribe>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept: Option<Accept>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledge: Option<Acknowledge>,
}

impl Call {
    fn empty(kind: CallType, framework_id: Option<FrameworkId>) -> Self {
        Self {
            framework_id,
            kind,
            subscribe: None,
            accept: None,
            acknowledge: None,
        }
    }

    /// Builds a `SUBSCRIBE`. A framework re-subscribing after a disconnect
    /// carries its assigned ID both on the call and inside the info.
    pub fn subscribe(framework_info: FrameworkInfo) -> Self {
        let mut call = Self::empty(CallType::Subscribe, framework_info.id.clone());
        call.subscribe = Some(Subscribe { framework_info });
        call
    }

    /// Builds an `ACCEPT` launching `tasks` on a single offer.
    ///
    /// An empty `tasks` list still produces one launch operation; the manager
    /// treats the unused resources as declined.
    pub fn accept(
        framework_id: FrameworkId,
        offer_id: OfferId,
        tasks: Vec<TaskInfo>,
        filters: Option<Filters>,
    ) -> Self {
        let mut call = Self::empty(CallType::Accept, Some(framework_id));
        call.accept = Some(Accept {
            offer_ids: vec![offer_id],
            operations: vec![Operation::launch(tasks)],
            filters,
        });
        call
    }

    /// Builds an `ACKNOWLEDGE` for a status update.
    pub fn acknowledge(
        framework_id: FrameworkId,
        agent_id: AgentId,
        task_id: TaskId,
        uuid: impl Into<String>,
    ) -> Self {
        let mut call = Self::empty(CallType::Acknowledge, Some(framework_id));
        call.acknowledge = Some(Acknowledge {
            agent_id,
            task_id,
            uuid: uuid.into(),
        });
        call
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscribe {
    pub framework_info: FrameworkInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accept {
    pub offer_ids: Vec<OfferId>,

    #[serde(default)]
    pub operations: Vec<Operation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filters>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Launch,
    #[serde(other)]
    Unknown,
}

/// An operation applied to accepted offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub kind: OperationType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch: Option<Launch>,
}

impl Operation {
    pub fn launch(task_infos: Vec<TaskInfo>) -> Self {
        Self {
            kind: OperationType::Launch,
            launch: Some(Launch { task_infos }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Launch {
    #[serde(default)]
    pub task_infos: Vec<TaskInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledge {
    pub agent_id: AgentId,
    pub task_id: TaskId,
    pub uuid: String,
}

// =============================================================================
// Events
// =============================================================================

/// Event kinds delivered on the subscription stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Subscribed,
    Offers,
    Rescind,
    Update,
    Message,
    Failure,
    Error,
    Heartbeat,
    /// An event kind introduced by a newer manager.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventType::Subscribed => "SUBSCRIBED",
            EventType::Offers => "OFFERS",
            EventType::Rescind => "RESCIND",
            EventType::Update => "UPDATE",
            EventType::Message => "MESSAGE",
            EventType::Failure => "FAILURE",
            EventType::Error => "ERROR",
            EventType::Heartbeat => "HEARTBEAT",
            EventType::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

/// An event pushed by the manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribed: Option<Subscribed>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offers: Option<Offers>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rescind: Option<Rescind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Update>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
}

impl Event {
    fn empty(kind: EventType) -> Self {
        Self {
            kind,
            subscribed: None,
            offers: None,
            rescind: None,
            update: None,
            message: None,
            failure: None,
            error: None,
        }
    }

    pub fn subscribed(framework_id: FrameworkId, heartbeat_interval_seconds: Option<f64>) -> Self {
        let mut event = Self::empty(EventType::Subscribed);
        event.subscribed = Some(Subscribed {
            framework_id,
            heartbeat_interval_seconds,
        });
        event
    }

    pub fn offers(offers: Vec<Offer>) -> Self {
        let mut event = Self::empty(EventType::Offers);
        event.offers = Some(Offers { offers });
        event
    }

    pub fn update(status: TaskStatus) -> Self {
        let mut event = Self::empty(EventType::Update);
        event.update = Some(Update { status });
        event
    }

    pub fn error(message: impl Into<String>) -> Self {
        let mut event = Self::empty(EventType::Error);
        event.error = Some(Error {
            message: message.into(),
        });
        event
    }

    pub fn heartbeat() -> Self {
        Self::empty(EventType::Heartbeat)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscribed {
    pub framework_id: FrameworkId,

    /// Interval at which the manager sends `HEARTBEAT` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offers {
    #[serde(default)]
    pub offers: Vec<Offer>,
}

/// Resources of one agent offered to the framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework_id: Option<FrameworkId>,

    pub agent_id: AgentId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(default)]
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rescind {
    pub offer_id: OfferId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub status: TaskStatus,
}

/// Opaque data sent by an executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub agent_id: AgentId,
    pub executor_id: ExecutorId,

    /// Base64 encoded payload.
    #[serde(default)]
    pub data: String,
}

/// An agent was lost or an executor terminated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<ExecutorId>,

    /// Exit status of a terminated executor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Error {
    pub message: String,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{CommandInfo, TaskState, CPUS, MEM};

    #[test]
    fn test_subscribe_call_without_id() {
        let call = Call::subscribe(FrameworkInfo::new("root", "fw"));
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "SUBSCRIBE",
                "subscribe": {"framework_info": {"user": "root", "name": "fw"}}
            })
        );
    }

    #[test]
    fn test_resubscribe_carries_framework_id() {
        let mut info = FrameworkInfo::new("root", "fw");
        info.id = Some(FrameworkId::new("fw-1"));
        let call = Call::subscribe(info);
        assert_eq!(call.framework_id, Some(FrameworkId::new("fw-1")));
    }

    #[test]
    fn test_accept_call_wire_format() {
        let task = TaskInfo {
            name: "task-1".to_string(),
            task_id: TaskId::new("1"),
            agent_id: AgentId::new("agent-1"),
            resources: vec![Resource::scalar(CPUS, 1.0), Resource::scalar(MEM, 128.0)],
            command: Some(CommandInfo::shell("echo Hello")),
            executor: None,
        };
        let call = Call::accept(
            FrameworkId::new("fw-1"),
            OfferId::new("offer-1"),
            vec![task],
            Some(Filters {
                refuse_seconds: Some(1.0),
            }),
        );

        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["type"], "ACCEPT");
        assert_eq!(json["framework_id"]["value"], "fw-1");
        assert_eq!(json["accept"]["offer_ids"][0]["value"], "offer-1");
        assert_eq!(json["accept"]["operations"][0]["type"], "LAUNCH");
        assert_eq!(
            json["accept"]["operations"][0]["launch"]["task_infos"][0]["command"]["value"],
            "echo Hello"
        );
        assert_eq!(json["accept"]["filters"]["refuse_seconds"], 1.0);
    }

    #[test]
    fn test_empty_accept_keeps_launch_operation() {
        let call = Call::accept(FrameworkId::new("fw"), OfferId::new("o"), vec![], None);
        let accept = call.accept.unwrap();
        assert_eq!(accept.operations.len(), 1);
        assert!(accept.operations[0].launch.as_ref().unwrap().task_infos.is_empty());
    }

    #[test]
    fn test_offers_event_from_manager_json() {
        let json = r#"{
            "type": "OFFERS",
            "offers": {
                "offers": [{
                    "id": {"value": "offer-1"},
                    "framework_id": {"value": "fw-1"},
                    "agent_id": {"value": "agent-1"},
                    "hostname": "worker-1",
                    "resources": [
                        {"name": "cpus", "type": "SCALAR", "scalar": {"value": 4}, "role": "*"},
                        {"name": "mem", "type": "SCALAR", "scalar": {"value": 1024}, "role": "*"}
                    ]
                }]
            }
        }"#;

        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.kind, EventType::Offers);
        let offers = event.offers.unwrap().offers;
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].resources[0].scalar_value(), Some(4.0));
    }

    #[test]
    fn test_update_event_from_manager_json() {
        let json = r#"{
            "type": "UPDATE",
            "update": {
                "status": {
                    "task_id": {"value": "1700"},
                    "state": "TASK_FINISHED",
                    "source": "SOURCE_EXECUTOR",
                    "agent_id": {"value": "agent-1"},
                    "uuid": "dGVzdA==",
                    "timestamp": 1700000000.5
                }
            }
        }"#;

        let event: Event = serde_json::from_str(json).unwrap();
        let status = event.update.unwrap().status;
        assert_eq!(status.state, TaskState::Finished);
        assert_eq!(status.ack_token(), Some("dGVzdA=="));
    }

    #[test]
    fn test_unknown_event_type_decodes() {
        let event: Event =
            serde_json::from_str(r#"{"type":"INVERSE_OFFERS","inverse_offers":{}}"#).unwrap();
        assert_eq!(event.kind, EventType::Unknown);
    }
}
