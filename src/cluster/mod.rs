//! Cluster membership as seen by the coordinator
//!
//! The registry is the coordinator's view of which datanodes exist and
//! whether they are still heartbeating. Registration and the heartbeat
//! transport live elsewhere; this module only keeps the resulting state.

pub mod node_registry;

pub use node_registry::{ClusterStats, DatanodeId, DatanodeInfo, DatanodeRegistry, DatanodeStatus};
