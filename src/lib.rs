//! # blockreaper
//!
//! Block invalidation scheduling for a distributed file system's metadata
//! coordinator.
//!
//! Datanodes accumulate backlogs of block replicas that should be deleted:
//! over-replicated copies, stale replicas, blocks of deleted files. Pushing
//! all of that at once would flood datanode command queues and hold the
//! coordinator lock for too long, so deletions are throttled:
//!
//! - **Per-pass node budget**: each maintenance pass serves a bounded number
//!   of datanodes
//! - **Per-node rate limit**: each served datanode receives at most `L` blocks
//! - **Round-robin fairness**: passes resume where the previous one stopped
//!
//! ## Architecture
//!
//! - [`invalidate`]: pending-invalidation store, pass cursor and scheduler
//! - [`cluster`]: datanode registry supplying liveness
//! - [`coordinator`]: lock ownership and the periodic maintenance loop

pub mod block;
pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod invalidate;
pub mod telemetry;

mod error;

pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::block::{Block, BlockId, FIRST_VALID_STAMP};
    pub use crate::cluster::{DatanodeId, DatanodeInfo, DatanodeRegistry, DatanodeStatus};
    pub use crate::config::InvalidateConfig;
    pub use crate::coordinator::{Coordinator, CycleReport};
    pub use crate::invalidate::{
        AssumeAlive, CommandQueue, InvalidationScheduler, InvalidationSink, NodeLiveness,
        PassReport,
    };
    pub use crate::{Error, Result};
}
