//! Pending-invalidation store
//!
//! Per-datanode sets of blocks awaiting deletion. A datanode is present in
//! the map only while its backlog is non-empty, so the map size is the
//! number of datanodes with work.

use crate::block::{Block, BlockId};
use crate::cluster::DatanodeId;
use serde::{Deserialize, Serialize};
use std::collections::{btree_map, BTreeMap, BTreeSet};
use std::ops::Bound::{Excluded, Included, Unbounded};

/// Blocks awaiting invalidation, keyed by datanode.
#[derive(Debug, Default, Clone)]
pub struct PendingInvalidations {
    backlogs: BTreeMap<DatanodeId, BTreeSet<Block>>,
    /// Sum of all backlog sizes
    total: usize,
}

impl PendingInvalidations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `block` for deletion on `node`. Returns false if it was already queued.
    pub fn add(&mut self, node: &DatanodeId, block: Block) -> bool {
        let added = match self.backlogs.get_mut(node) {
            Some(backlog) => backlog.insert(block),
            None => {
                self.backlogs.insert(node.clone(), BTreeSet::from([block]));
                true
            }
        };
        if added {
            self.total += 1;
        }
        added
    }

    /// Number of blocks pending for `node`
    pub fn size(&self, node: &DatanodeId) -> usize {
        self.backlogs.get(node).map(BTreeSet::len).unwrap_or(0)
    }

    /// Number of datanodes with a non-empty backlog
    pub fn nodes_with_work(&self) -> usize {
        self.backlogs.len()
    }

    /// Datanodes with a non-empty backlog, in rotation order
    pub fn nodes(&self) -> impl Iterator<Item = &DatanodeId> {
        self.backlogs.keys()
    }

    pub fn contains(&self, node: &DatanodeId, block: &Block) -> bool {
        self.backlogs
            .get(node)
            .map(|backlog| backlog.contains(block))
            .unwrap_or(false)
    }

    /// Total blocks pending across all datanodes
    pub fn total_pending(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.backlogs.is_empty()
    }

    /// Remove up to `max` blocks from `node`'s backlog, lowest block id first.
    ///
    /// The datanode leaves the map once its backlog is empty.
    pub fn drain(&mut self, node: &DatanodeId, max: usize) -> Vec<Block> {
        let Some(backlog) = self.backlogs.get_mut(node) else {
            return Vec::new();
        };

        let take = max.min(backlog.len());
        let drained: Vec<Block> = (0..take).filter_map(|_| backlog.pop_first()).collect();

        if backlog.is_empty() {
            self.backlogs.remove(node);
        }
        self.total -= drained.len();
        drained
    }

    /// Drop every block pending for `node`. Returns how many were dropped.
    pub fn remove_node(&mut self, node: &DatanodeId) -> usize {
        let dropped = self.backlogs.remove(node).map(|b| b.len()).unwrap_or(0);
        self.total -= dropped;
        dropped
    }

    /// Datanodes with work, starting after `after` and wrapping around once.
    ///
    /// `after` need not be present in the map.
    pub(crate) fn rotation<'a>(
        &'a self,
        after: Option<&'a DatanodeId>,
    ) -> impl Iterator<Item = &'a DatanodeId> + 'a {
        let (tail, head): (btree_map::Range<'a, _, _>, Option<btree_map::Range<'a, _, _>>) =
            match after {
                Some(last) => (
                    self.backlogs.range::<DatanodeId, _>((Excluded(last), Unbounded)),
                    Some(self.backlogs.range::<DatanodeId, _>((Unbounded, Included(last)))),
                ),
                None => (self.backlogs.range::<DatanodeId, _>(..), None),
            };

        tail.chain(head.into_iter().flatten()).map(|(node, _)| node)
    }

    /// Snapshot of every backlog for operator dumps
    pub fn summary(&self) -> InvalidateSummary {
        InvalidateSummary {
            total_pending: self.total,
            nodes: self
                .backlogs
                .iter()
                .map(|(node, backlog)| NodeBacklogSummary {
                    node: node.clone(),
                    pending: backlog.len(),
                    block_ids: backlog.iter().map(Block::id).collect(),
                })
                .collect(),
        }
    }
}

/// Serializable view of the pending-invalidation store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidateSummary {
    pub total_pending: usize,
    pub nodes: Vec<NodeBacklogSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeBacklogSummary {
    pub node: DatanodeId,
    pub pending: usize,
    pub block_ids: Vec<BlockId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::FIRST_VALID_STAMP;

    fn block(id: u64) -> Block {
        Block::new(id, 0, FIRST_VALID_STAMP)
    }

    fn dn(id: &str) -> DatanodeId {
        DatanodeId::from(id)
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut store = PendingInvalidations::new();

        assert!(store.add(&dn("a"), block(1)));
        assert!(!store.add(&dn("a"), block(1)));
        // Same id, different stamp: still the same block
        assert!(!store.add(&dn("a"), Block::new(1, 10, FIRST_VALID_STAMP + 1)));
        // Same block on a different node is independent
        assert!(store.add(&dn("b"), block(1)));

        assert_eq!(store.size(&dn("a")), 1);
        assert_eq!(store.size(&dn("b")), 1);
        assert_eq!(store.size(&dn("c")), 0);
        assert_eq!(store.total_pending(), 2);
        assert_eq!(store.nodes_with_work(), 2);
    }

    #[test]
    fn test_drain_partial_and_exhaustive() {
        let mut store = PendingInvalidations::new();
        for id in [5, 3, 9, 1] {
            store.add(&dn("a"), block(id));
        }

        let first = store.drain(&dn("a"), 3);
        assert_eq!(first.iter().map(Block::id).collect::<Vec<_>>(), vec![1, 3, 5]);
        assert_eq!(store.size(&dn("a")), 1);
        assert_eq!(store.nodes_with_work(), 1);

        let rest = store.drain(&dn("a"), 3);
        assert_eq!(rest.iter().map(Block::id).collect::<Vec<_>>(), vec![9]);
        assert_eq!(store.nodes_with_work(), 0);
        assert_eq!(store.total_pending(), 0);
        assert!(!store.contains(&dn("a"), &block(9)));
    }

    #[test]
    fn test_drain_absent_node_and_zero_max() {
        let mut store = PendingInvalidations::new();
        assert!(store.drain(&dn("ghost"), 10).is_empty());

        store.add(&dn("a"), block(1));
        assert!(store.drain(&dn("a"), 0).is_empty());
        assert_eq!(store.nodes_with_work(), 1);
    }

    #[test]
    fn test_remove_node() {
        let mut store = PendingInvalidations::new();
        for id in 0..4 {
            store.add(&dn("a"), block(id));
        }
        store.add(&dn("b"), block(0));

        assert_eq!(store.remove_node(&dn("a")), 4);
        assert_eq!(store.remove_node(&dn("a")), 0);
        assert_eq!(store.total_pending(), 1);
        assert_eq!(store.nodes().cloned().collect::<Vec<_>>(), vec![dn("b")]);
    }

    #[test]
    fn test_rotation_wraps_after_cursor() {
        let mut store = PendingInvalidations::new();
        for node in ["a", "b", "c", "d"] {
            store.add(&dn(node), block(1));
        }

        let order = |after: Option<&DatanodeId>| -> Vec<String> {
            store.rotation(after).map(|n| n.to_string()).collect()
        };

        assert_eq!(order(None), vec!["a", "b", "c", "d"]);
        assert_eq!(order(Some(&dn("b"))), vec!["c", "d", "a", "b"]);
        assert_eq!(order(Some(&dn("d"))), vec!["a", "b", "c", "d"]);
        // Cursor on an identity that has since left the map
        assert_eq!(order(Some(&dn("bb"))), vec!["c", "d", "a", "b"]);
        assert_eq!(order(Some(&dn("zz"))), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_summary() {
        let mut store = PendingInvalidations::new();
        store.add(&dn("b"), block(7));
        store.add(&dn("a"), block(2));
        store.add(&dn("a"), block(1));

        let summary = store.summary();
        assert_eq!(summary.total_pending, 3);
        assert_eq!(summary.nodes.len(), 2);
        assert_eq!(summary.nodes[0].node, dn("a"));
        assert_eq!(summary.nodes[0].block_ids, vec![1, 2]);
        assert_eq!(summary.nodes[1].pending, 1);
    }
}
