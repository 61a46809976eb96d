//! Datanode registry for tracking live cluster members
//!
//! Maintains the set of datanodes known to the coordinator, with heartbeat
//! tracking and failure detection. The invalidation scheduler only consumes
//! liveness from here; everything else about a datanode is bookkeeping for
//! the coordinator and operators.

use crate::invalidate::NodeLiveness;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Storage identity of a datanode.
///
/// Ordered so the scheduler can rotate over nodes in a stable order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DatanodeId(String);

impl DatanodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatanodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DatanodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DatanodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Status of a datanode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatanodeStatus {
    /// Heartbeating normally
    Healthy,
    /// Missed heartbeats, not yet declared dead
    Suspected,
    /// Declared dead; its pending work is discarded
    Dead,
    /// Being retired; still receives deletion commands
    Decommissioning,
}

/// Information about a datanode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatanodeInfo {
    /// Storage identity
    pub id: DatanodeId,
    /// Data transfer address
    pub addr: SocketAddr,
    /// Node status
    pub status: DatanodeStatus,
    /// Last heartbeat time
    #[serde(skip, default = "Instant::now")]
    pub last_heartbeat: Instant,
    /// Raw capacity in bytes
    pub capacity_bytes: u64,
    /// Remaining capacity in bytes
    pub remaining_bytes: u64,
}

impl DatanodeInfo {
    pub fn new(id: impl Into<DatanodeId>, addr: SocketAddr) -> Self {
        Self {
            id: id.into(),
            addr,
            status: DatanodeStatus::Healthy,
            last_heartbeat: Instant::now(),
            capacity_bytes: 0,
            remaining_bytes: 0,
        }
    }

    /// Whether this node should still receive commands
    pub fn is_alive(&self) -> bool {
        !matches!(self.status, DatanodeStatus::Dead)
    }
}

/// Registry of datanodes keyed by storage identity
#[derive(Debug, Clone)]
pub struct DatanodeRegistry {
    nodes: Arc<RwLock<HashMap<DatanodeId, DatanodeInfo>>>,
    /// Heartbeat expiry; half of it marks a node suspected
    timeout: Duration,
}

impl DatanodeRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            nodes: Arc::new(RwLock::new(HashMap::new())),
            timeout,
        }
    }

    /// Register a new node or replace an existing registration
    pub fn register(&self, node: DatanodeInfo) {
        info!(datanode = %node.id, addr = %node.addr, "Registering datanode");
        self.nodes.write().insert(node.id.clone(), node);
    }

    /// Record a heartbeat. Returns false for unregistered nodes.
    pub fn heartbeat(&self, id: &DatanodeId, capacity_bytes: u64, remaining_bytes: u64) -> bool {
        let mut nodes = self.nodes.write();
        match nodes.get_mut(id) {
            Some(node) => {
                node.last_heartbeat = Instant::now();
                node.capacity_bytes = capacity_bytes;
                node.remaining_bytes = remaining_bytes;
                if matches!(node.status, DatanodeStatus::Suspected) {
                    node.status = DatanodeStatus::Healthy;
                    info!(datanode = %id, "Datanode recovered");
                }
                true
            }
            None => {
                warn!(datanode = %id, "Heartbeat from unregistered datanode");
                false
            }
        }
    }

    /// Start decommissioning a node
    pub fn start_decommission(&self, id: &DatanodeId) -> bool {
        let mut nodes = self.nodes.write();
        match nodes.get_mut(id) {
            Some(node) if node.is_alive() => {
                info!(datanode = %id, "Decommissioning datanode");
                node.status = DatanodeStatus::Decommissioning;
                true
            }
            _ => false,
        }
    }

    /// Remove a node from the registry
    pub fn remove(&self, id: &DatanodeId) -> Option<DatanodeInfo> {
        let removed = self.nodes.write().remove(id);
        if removed.is_some() {
            info!(datanode = %id, "Removed datanode from registry");
        }
        removed
    }

    pub fn get(&self, id: &DatanodeId) -> Option<DatanodeInfo> {
        self.nodes.read().get(id).cloned()
    }

    /// Number of nodes that are not dead
    pub fn live_count(&self) -> usize {
        self.nodes.read().values().filter(|n| n.is_alive()).count()
    }

    /// Identities of all live nodes, sorted
    pub fn live_nodes(&self) -> Vec<DatanodeId> {
        let mut ids: Vec<_> = self
            .nodes
            .read()
            .values()
            .filter(|n| n.is_alive())
            .map(|n| n.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Apply heartbeat expiry as of `now`. Returns nodes newly declared dead.
    pub fn check_heartbeats(&self, now: Instant) -> Vec<DatanodeId> {
        let mut newly_dead = Vec::new();
        let mut nodes = self.nodes.write();

        for node in nodes.values_mut() {
            let elapsed = now.saturating_duration_since(node.last_heartbeat);

            if elapsed > self.timeout {
                if !matches!(node.status, DatanodeStatus::Dead) {
                    warn!(
                        datanode = %node.id,
                        elapsed_secs = elapsed.as_secs(),
                        "Datanode missed heartbeats, declaring dead"
                    );
                    node.status = DatanodeStatus::Dead;
                    newly_dead.push(node.id.clone());
                }
            } else if elapsed > self.timeout / 2 && matches!(node.status, DatanodeStatus::Healthy) {
                debug!(
                    datanode = %node.id,
                    elapsed_secs = elapsed.as_secs(),
                    "Datanode heartbeat late, marking suspected"
                );
                node.status = DatanodeStatus::Suspected;
            }
        }

        newly_dead.sort();
        newly_dead
    }

    pub fn stats(&self) -> ClusterStats {
        let nodes = self.nodes.read();
        let count = |status: DatanodeStatus| nodes.values().filter(|n| n.status == status).count();

        ClusterStats {
            total_nodes: nodes.len(),
            healthy_nodes: count(DatanodeStatus::Healthy),
            suspected_nodes: count(DatanodeStatus::Suspected),
            dead_nodes: count(DatanodeStatus::Dead),
            decommissioning_nodes: count(DatanodeStatus::Decommissioning),
        }
    }
}

impl NodeLiveness for DatanodeRegistry {
    fn is_alive(&self, node: &DatanodeId) -> bool {
        self.nodes
            .read()
            .get(node)
            .map(DatanodeInfo::is_alive)
            .unwrap_or(false)
    }
}

/// Cluster statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub total_nodes: usize,
    pub healthy_nodes: usize,
    pub suspected_nodes: usize,
    pub dead_nodes: usize,
    pub decommissioning_nodes: usize,
}
