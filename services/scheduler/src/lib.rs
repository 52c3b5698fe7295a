//! Mesos HTTP Scheduler Driver
//!
//! Subscribes a framework to a Mesos master over the v1 scheduler HTTP API,
//! launches a fixed number of tasks on the offers it receives, acknowledges
//! status updates, and stops once the tasks are done.
//!
//! ## Architecture
//!
//! ```text
//! Driver::start
//! ├── event pump    (RecordIO stream -> queue, resubscribes on loss)
//! └── dispatcher    (queue -> handlers, in order)
//!     └── worker pool
//!         ├── offer handler   (greedy packing, one ACCEPT per offer)
//!         └── update handler  (ACKNOWLEDGE, completion accounting)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use mesos_proto::FrameworkInfo;
//! use mesos_scheduler::{Driver, ResourcePolicy};
//!
//! # async fn run() -> Result<(), mesos_scheduler::DriverError> {
//! let framework = FrameworkInfo::new("root", "example");
//! let driver = Driver::new("127.0.0.1:5050", framework, ResourcePolicy::default())?;
//! let reason = driver.start().await?.await;
//! println!("stopped: {reason}");
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod stream;

pub use backoff::{BackoffPolicy, ReconnectPolicy};
pub use client::{Response, SchedulerClient, Transport};
pub use driver::{
    Completion, CounterSnapshot, Driver, DriverOptions, DriverState, ResourcePolicy, StopReason,
    TaskTemplate, TerminalPolicy,
};
pub use error::{DriverError, StreamError, TaskTerminalError, TransportError};
