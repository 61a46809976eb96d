//! Block invalidation scheduling
//!
//! Datanodes accumulate backlogs of block replicas the coordinator wants
//! deleted. Each maintenance pass drains a bounded slice of that work:
//! - at most `node_budget` datanodes are served per pass
//! - at most `L` blocks are taken from any one datanode per pass
//! - datanodes are served in a stable rotation that resumes where the
//!   previous pass stopped, so small budgets still reach every node
//!
//! Nothing in this module synchronizes. The owner (see
//! [`crate::coordinator::Coordinator`]) holds the coordinator-wide lock
//! around every call.

mod cursor;
mod scheduler;
mod sink;
mod store;
pub mod telemetry;

pub use cursor::PassCursor;
pub use scheduler::{InvalidationScheduler, NodeBatch, PassReport};
pub use sink::{ChannelSink, CommandQueue, InvalidateCommand, InvalidationSink};
pub use store::{InvalidateSummary, NodeBacklogSummary, PendingInvalidations};

use crate::cluster::DatanodeId;

/// Liveness oracle consulted when the rotation reaches a datanode.
pub trait NodeLiveness {
    fn is_alive(&self, node: &DatanodeId) -> bool;
}

/// Treats every datanode as alive.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeAlive;

impl NodeLiveness for AssumeAlive {
    fn is_alive(&self, _node: &DatanodeId) -> bool {
        true
    }
}
