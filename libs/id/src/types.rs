//! Typed ID definitions for scheduler API objects.
//!
//! Every ID here is assigned by someone other than its holder: the manager
//! assigns framework, agent and offer IDs, the scheduler assigns task IDs, and
//! the operator names executors.

use crate::define_id;

// =============================================================================
// Framework and Cluster
// =============================================================================

define_id!(FrameworkId);
define_id!(AgentId);

// =============================================================================
// Offers and Tasks
// =============================================================================

define_id!(OfferId);
define_id!(TaskId);
define_id!(ExecutorId);

// =============================================================================
// Tests
// =============================================================================
