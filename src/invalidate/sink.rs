//! Delivery of computed invalidation batches
//!
//! A sink receives each datanode's batch after the pass has already removed
//! it from the backlog. Delivery is fire-and-forget: a sink that cannot reach
//! the datanode decides on its own whether to re-queue the blocks.

use crate::block::Block;
use crate::cluster::DatanodeId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Destination for per-datanode invalidation batches
pub trait InvalidationSink: Send + Sync {
    fn deliver(&self, node: &DatanodeId, blocks: Vec<Block>);

    /// Drop anything still held for a datanode that left the cluster
    fn forget(&self, _node: &DatanodeId) {}
}

/// Command telling a datanode to delete a set of block replicas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidateCommand {
    pub blocks: Vec<Block>,
    pub issued_at: DateTime<Utc>,
}

impl InvalidateCommand {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self {
            blocks,
            issued_at: Utc::now(),
        }
    }
}

/// Per-datanode command queues, drained when the datanode heartbeats.
///
/// Lives outside the coordinator lock; heartbeat handlers call [`take`]
/// concurrently with passes delivering into it.
///
/// [`take`]: CommandQueue::take
#[derive(Debug, Default)]
pub struct CommandQueue {
    queues: DashMap<DatanodeId, VecDeque<InvalidateCommand>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return every command queued for `node`, oldest first
    pub fn take(&self, node: &DatanodeId) -> Vec<InvalidateCommand> {
        self.queues
            .remove(node)
            .map(|(_, queue)| queue.into_iter().collect())
            .unwrap_or_default()
    }

    /// Number of commands waiting for `node`
    pub fn pending_commands(&self, node: &DatanodeId) -> usize {
        self.queues.get(node).map(|q| q.len()).unwrap_or(0)
    }

    /// Number of blocks across all commands waiting for `node`
    pub fn queued_blocks(&self, node: &DatanodeId) -> usize {
        self.queues
            .get(node)
            .map(|q| q.iter().map(|cmd| cmd.blocks.len()).sum::<usize>())
            .unwrap_or(0)
    }

    /// Number of datanodes with commands waiting
    pub fn nodes_with_commands(&self) -> usize {
        self.queues.len()
    }
}

impl InvalidationSink for CommandQueue {
    fn deliver(&self, node: &DatanodeId, blocks: Vec<Block>) {
        if blocks.is_empty() {
            return;
        }
        self.queues
            .entry(node.clone())
            .or_default()
            .push_back(InvalidateCommand::new(blocks));
    }

    fn forget(&self, node: &DatanodeId) {
        let dropped = self.take(node);
        if !dropped.is_empty() {
            debug!(
                datanode = %node,
                commands = dropped.len(),
                "Dropped undelivered invalidation commands"
            );
        }
    }
}

/// Forwards batches to an async consumer over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(DatanodeId, InvalidateCommand)>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(DatanodeId, InvalidateCommand)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl InvalidationSink for ChannelSink {
    fn deliver(&self, node: &DatanodeId, blocks: Vec<Block>) {
        if blocks.is_empty() {
            return;
        }
        let count = blocks.len();
        if self
            .tx
            .send((node.clone(), InvalidateCommand::new(blocks)))
            .is_err()
        {
            warn!(
                datanode = %node,
                blocks = count,
                "Invalidation consumer is gone, dropping batch"
            );
        }
    }
}
