//! Coordinator-side driver for block invalidation
//!
//! The coordinator is responsible for:
//! - Owning the invalidation backlog behind the coordinator-wide lock
//! - Accepting new invalidation work from replica management
//! - Running the periodic maintenance loop that schedules deletions
//! - Dropping work for datanodes that die or are removed
//!
//! Batches are handed to the delivery sink only after the lock is released.

use crate::block::Block;
use crate::cluster::{DatanodeId, DatanodeRegistry};
use crate::config::InvalidateConfig;
use crate::invalidate::{
    telemetry, InvalidateSummary, InvalidationScheduler, InvalidationSink, PassReport,
};
use crate::Result;

use parking_lot::{RwLock, RwLockWriteGuard};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of one maintenance cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Datanodes declared dead during this cycle
    pub newly_dead: Vec<DatanodeId>,
    /// Node budget handed to the scheduler
    pub node_budget: usize,
    /// Pending blocks dropped because their datanode is dead
    pub discarded_blocks: usize,
    /// Blocks scheduled for deletion
    pub blocks_scheduled: usize,
}

/// Coordinator service owning the invalidation scheduler
pub struct Coordinator {
    config: InvalidateConfig,
    /// Coordinator-wide exclusive lock; every backlog mutation happens under it
    namesystem: RwLock<InvalidationScheduler>,
    registry: DatanodeRegistry,
    sink: Arc<dyn InvalidationSink>,
    /// Cancellation token for graceful shutdown
    shutdown: CancellationToken,
}

impl Coordinator {
    /// Create a new coordinator. Fails only on invalid configuration.
    pub fn new(
        config: InvalidateConfig,
        registry: DatanodeRegistry,
        sink: Arc<dyn InvalidationSink>,
    ) -> Result<Self> {
        config.validate()?;
        let limit = config.effective_invalidate_limit();
        info!(blocks_per_node = limit, "Invalidation scheduler ready");

        Ok(Self {
            config,
            namesystem: RwLock::new(InvalidationScheduler::new(limit)),
            registry,
            sink,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &InvalidateConfig {
        &self.config
    }

    pub fn registry(&self) -> &DatanodeRegistry {
        &self.registry
    }

    /// Blocks per datanode per pass
    pub fn blocks_per_node(&self) -> usize {
        self.namesystem.read().blocks_per_node()
    }

    /// Get a cancellation token that can be used to trigger graceful shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Acquire the coordinator-wide lock for a sequence of operations.
    ///
    /// Deliver any pass run through the guard with
    /// [`PassReport::deliver`] after dropping it.
    pub fn write_lock(&self) -> RwLockWriteGuard<'_, InvalidationScheduler> {
        self.namesystem.write()
    }

    /// Queue `block` for deletion on `node`
    pub fn add_to_invalidates(&self, block: Block, node: &DatanodeId) -> bool {
        let added = self.namesystem.write().add_to_invalidates(block, node);
        telemetry::record_blocks_added(added as u64);
        added
    }

    /// Queue `block` for deletion on every listed datanode. Returns how many were new.
    pub fn add_to_invalidates_all(&self, block: Block, nodes: &[DatanodeId]) -> usize {
        let added = {
            let mut namesystem = self.namesystem.write();
            nodes
                .iter()
                .filter(|node| namesystem.add_to_invalidates(block, node))
                .count()
        };
        telemetry::record_blocks_added(added as u64);
        added
    }

    /// Run one scheduling pass serving at most `node_budget` datanodes.
    ///
    /// Returns the number of blocks scheduled.
    pub fn compute_invalidate_work(&self, node_budget: usize) -> usize {
        self.run_pass(node_budget).deliver(self.sink.as_ref())
    }

    fn run_pass(&self, node_budget: usize) -> PassReport {
        self.namesystem.write().run_pass(node_budget, &self.registry)
    }

    /// Node budget for the next pass, derived from the live datanode count
    pub fn nodes_to_process(&self) -> usize {
        self.config.nodes_to_process(self.registry.live_count())
    }

    /// Unregister a datanode and drop its pending and undelivered invalidations
    pub fn remove_datanode(&self, node: &DatanodeId) -> usize {
        self.registry.remove(node);
        let dropped = self.namesystem.write().remove_node(node);
        self.sink.forget(node);
        telemetry::record_discarded(dropped as u64, "removed_datanode");
        dropped
    }

    /// Whether `block` is still waiting to be scheduled for deletion on `node`
    pub fn belongs_to_invalidates(&self, node: &DatanodeId, block: &Block) -> bool {
        self.namesystem.read().belongs_to_invalidates(node, block)
    }

    pub fn pending_deletion_blocks(&self) -> usize {
        self.namesystem.read().total_pending()
    }

    pub fn nodes_with_work(&self) -> usize {
        self.namesystem.read().nodes_with_work()
    }

    pub fn pending_count(&self, node: &DatanodeId) -> usize {
        self.namesystem.read().pending_count(node)
    }

    pub fn summary(&self) -> InvalidateSummary {
        self.namesystem.read().summary()
    }

    /// Serialize the backlog summary for operator dumps
    pub fn summary_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.summary())?)
    }

    /// Run the maintenance loop. Returns when the shutdown token is cancelled.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.config.replication_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_cycle(Instant::now());
                }
                _ = self.shutdown.cancelled() => {
                    info!("Invalidation monitor shutting down gracefully");
                    break;
                }
            }
        }
    }

    /// Run a single maintenance cycle as of `now`
    pub fn run_cycle(&self, now: Instant) -> CycleReport {
        let newly_dead = self.registry.check_heartbeats(now);

        // Any dead datanode still holding work, however its death was observed
        let discarded = self.namesystem.write().discard_dead_nodes(&self.registry);
        let discarded_blocks = discarded.iter().map(|(_, dropped)| dropped).sum::<usize>();
        telemetry::record_discarded(discarded_blocks as u64, "dead_datanode");
        for node in newly_dead.iter().chain(discarded.iter().map(|(node, _)| node)) {
            self.sink.forget(node);
        }

        let node_budget = self.nodes_to_process();
        if node_budget == 0 {
            debug!("No live datanodes, skipping invalidation pass");
            return CycleReport {
                newly_dead,
                discarded_blocks,
                ..Default::default()
            };
        }

        let blocks_scheduled = self.compute_invalidate_work(node_budget);
        if blocks_scheduled > 0 {
            debug!(
                node_budget,
                blocks_scheduled,
                pending = self.pending_deletion_blocks(),
                "Invalidation cycle scheduled work"
            );
        }

        CycleReport {
            newly_dead,
            node_budget,
            discarded_blocks,
            blocks_scheduled,
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        let pending = self.namesystem.get_mut().total_pending();
        if pending > 0 {
            warn!(
                pending,
                "Coordinator dropped with pending invalidations; they are not persisted"
            );
        }
    }
}
