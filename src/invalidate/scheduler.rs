//! Rate-limited, round-robin invalidation scheduler

use super::cursor::PassCursor;
use super::sink::InvalidationSink;
use super::store::{InvalidateSummary, PendingInvalidations};
use super::{telemetry, NodeLiveness};
use crate::block::Block;
use crate::cluster::DatanodeId;
use tracing::{debug, info, warn};

/// Blocks drained from one datanode's backlog in one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeBatch {
    pub node: DatanodeId,
    pub blocks: Vec<Block>,
}

/// Outcome of one scheduling pass, before delivery
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Batches in visitation order
    pub batches: Vec<NodeBatch>,
    /// Total blocks across `batches`
    pub blocks_scheduled: usize,
    /// Datanodes found dead during the rotation
    pub discarded_nodes: Vec<DatanodeId>,
    /// Pending blocks dropped with those datanodes
    pub discarded_blocks: usize,
}

impl PassReport {
    pub fn nodes_visited(&self) -> usize {
        self.batches.len()
    }

    /// Scheduled count per visited datanode, in visitation order
    pub fn per_node(&self) -> Vec<(DatanodeId, usize)> {
        self.batches
            .iter()
            .map(|b| (b.node.clone(), b.blocks.len()))
            .collect()
    }

    /// Hand every batch to `sink` and have it forget the discarded datanodes.
    ///
    /// Returns the number of blocks delivered.
    pub fn deliver(self, sink: &dyn InvalidationSink) -> usize {
        let total = self.blocks_scheduled;
        for node in &self.discarded_nodes {
            sink.forget(node);
        }
        for NodeBatch { node, blocks } in self.batches {
            info!(
                datanode = %node,
                blocks = blocks.len(),
                "BLOCK* ask datanode to delete blocks"
            );
            let ids: Vec<_> = blocks.iter().map(Block::id).collect();
            debug!(datanode = %node, blocks = ?ids, "Invalidation batch");
            sink.deliver(&node, blocks);
        }
        total
    }
}

/// Pending invalidations plus the rotation state used to drain them.
///
/// Owned by the coordinator and only touched while its exclusive lock is
/// held. A pass costs `O(node_budget + blocks_scheduled)` map operations
/// regardless of how large the backlogs are.
#[derive(Debug)]
pub struct InvalidationScheduler {
    pending: PendingInvalidations,
    cursor: PassCursor,
    /// Maximum blocks scheduled for one datanode in one pass
    blocks_per_node: usize,
}

impl InvalidationScheduler {
    pub fn new(blocks_per_node: usize) -> Self {
        Self {
            pending: PendingInvalidations::new(),
            cursor: PassCursor::new(),
            blocks_per_node,
        }
    }

    pub fn blocks_per_node(&self) -> usize {
        self.blocks_per_node
    }

    pub fn cursor(&self) -> &PassCursor {
        &self.cursor
    }

    pub fn pending(&self) -> &PendingInvalidations {
        &self.pending
    }

    /// Queue `block` for deletion on `node`. Duplicates are ignored.
    pub fn add_to_invalidates(&mut self, block: Block, node: &DatanodeId) -> bool {
        let added = self.pending.add(node, block);
        if added {
            debug!(datanode = %node, block = %block, "Queued block for invalidation");
        }
        added
    }

    pub fn pending_count(&self, node: &DatanodeId) -> usize {
        self.pending.size(node)
    }

    pub fn nodes_with_work(&self) -> usize {
        self.pending.nodes_with_work()
    }

    pub fn total_pending(&self) -> usize {
        self.pending.total_pending()
    }

    pub fn belongs_to_invalidates(&self, node: &DatanodeId, block: &Block) -> bool {
        self.pending.contains(node, block)
    }

    /// Drop all pending work for a datanode that left the cluster
    pub fn remove_node(&mut self, node: &DatanodeId) -> usize {
        let dropped = self.pending.remove_node(node);
        if dropped > 0 {
            info!(
                datanode = %node,
                blocks = dropped,
                "Discarded pending invalidations for removed datanode"
            );
        }
        dropped
    }

    /// Drop the backlog of every datanode `liveness` reports dead.
    ///
    /// Returns each discarded datanode with the number of blocks dropped.
    pub fn discard_dead_nodes(&mut self, liveness: &dyn NodeLiveness) -> Vec<(DatanodeId, usize)> {
        let dead: Vec<DatanodeId> = self
            .pending
            .nodes()
            .filter(|node| !liveness.is_alive(node))
            .cloned()
            .collect();

        dead.into_iter()
            .map(|node| {
                let dropped = self.pending.remove_node(&node);
                warn!(
                    datanode = %node,
                    blocks = dropped,
                    "Datanode is no longer live, discarding its pending invalidations"
                );
                (node, dropped)
            })
            .collect()
    }

    pub fn summary(&self) -> InvalidateSummary {
        self.pending.summary()
    }

    /// Run one pass and deliver its batches to `sink` immediately.
    ///
    /// Returns the number of blocks scheduled. Callers that want delivery
    /// outside their lock use [`run_pass`](Self::run_pass) instead.
    pub fn compute_invalidate_work(
        &mut self,
        node_budget: usize,
        liveness: &dyn NodeLiveness,
        sink: &dyn InvalidationSink,
    ) -> usize {
        self.run_pass(node_budget, liveness).deliver(sink)
    }

    /// Drain up to `blocks_per_node` blocks from each of at most
    /// `node_budget` datanodes, continuing the rotation from the last pass.
    ///
    /// Datanodes `liveness` reports dead are skipped without using a budget
    /// slot and their backlog is discarded. The cursor moves only when at
    /// least one datanode is served.
    pub fn run_pass(&mut self, node_budget: usize, liveness: &dyn NodeLiveness) -> PassReport {
        let nodes_with_work = self.pending.nodes_with_work();
        if nodes_with_work == 0 || node_budget == 0 {
            return PassReport::default();
        }
        let budget = node_budget.min(nodes_with_work);

        let mut selected = Vec::with_capacity(budget);
        let mut dead = Vec::new();
        for node in self.pending.rotation(self.cursor.position()) {
            if selected.len() == budget {
                break;
            }
            if liveness.is_alive(node) {
                selected.push(node.clone());
            } else {
                dead.push(node.clone());
            }
        }

        let mut report = PassReport::default();

        for node in dead {
            let dropped = self.pending.remove_node(&node);
            warn!(
                datanode = %node,
                blocks = dropped,
                "Datanode is no longer live, discarding its pending invalidations"
            );
            report.discarded_blocks += dropped;
            report.discarded_nodes.push(node);
        }

        for node in selected {
            let blocks = self.pending.drain(&node, self.blocks_per_node);
            report.blocks_scheduled += blocks.len();
            self.cursor.advance(node.clone());
            report.batches.push(NodeBatch { node, blocks });
        }

        debug!(
            node_budget,
            nodes_with_work,
            nodes_visited = report.nodes_visited(),
            blocks_scheduled = report.blocks_scheduled,
            remaining = self.pending.total_pending(),
            "Invalidation pass complete"
        );
        telemetry::record_pass(report.blocks_scheduled as u64, report.nodes_visited() as u64);
        telemetry::record_discarded(report.discarded_blocks as u64, "dead_datanode");

        report
    }
}
