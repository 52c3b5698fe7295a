//! # mesos-proto
//!
//! Wire model of the resource manager's v1 scheduler API.
//!
//! ## Modules
//!
//! - `common`: objects shared by calls and events (framework info, resources,
//!   task descriptions, task status)
//! - `scheduler`: the `Call` messages a scheduler sends and the `Event`
//!   messages it receives on its subscription stream
//! - `codec`: the pluggable encoding of calls and events
//! - `recordio`: length-prefixed framing of the event stream
//!
//! The model mirrors the manager's JSON mapping: message fields are
//! snake_case, enum values are upper-case strings, and IDs are
//! `{"value": "..."}` objects. Unknown fields are ignored so newer managers
//! stay compatible.

pub mod codec;
pub mod common;
pub mod recordio;
pub mod scheduler;

pub use codec::{Codec, CodecError, JsonCodec};
pub use common::*;
pub use scheduler::*;
