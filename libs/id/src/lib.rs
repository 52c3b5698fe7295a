//! # mesos-id
//!
//! Typed identifiers for the objects exchanged with the resource manager's
//! scheduler API.
//!
//! ## Design Principles
//!
//! - IDs are opaque: the manager assigns agent, offer and framework IDs and the
//!   scheduler never interprets them
//! - IDs are typed to prevent passing an offer ID where a task ID is expected
//! - IDs serialize the way the manager's JSON API expects: `{"value": "..."}`
//!
//! ## Example
//!
//! ```
//! use mesos_id::TaskId;
//!
//! let id = TaskId::new("1700000000000000000");
//! assert_eq!(serde_json::to_string(&id).unwrap(), r#"{"value":"1700000000000000000"}"#);
//! ```

mod macros;
mod types;

pub use types::*;
