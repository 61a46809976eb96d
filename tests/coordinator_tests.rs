//! Integration tests for the coordinator maintenance loop
//!
//! Exercises the coordinator with live registries and sinks: concurrent
//! producers, datanode failure and removal, and graceful shutdown.

use blockreaper::block::{Block, FIRST_VALID_STAMP};
use blockreaper::cluster::{DatanodeId, DatanodeInfo, DatanodeRegistry, DatanodeStatus};
use blockreaper::config::InvalidateConfig;
use blockreaper::coordinator::Coordinator;
use blockreaper::invalidate::{ChannelSink, CommandQueue, InvalidationSink};

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn block(id: u64) -> Block {
    Block::new(id, 1024, FIRST_VALID_STAMP)
}

fn test_config() -> InvalidateConfig {
    InvalidateConfig {
        invalidate_limit: 25,
        heartbeat_interval: Duration::from_secs(1),
        heartbeat_recheck_interval: Duration::from_secs(5),
        invalidate_work_pct: 0.5,
        replication_interval: Duration::from_millis(5),
    }
}

fn registry_with(config: &InvalidateConfig, nodes: usize) -> (DatanodeRegistry, Vec<DatanodeId>) {
    let registry = DatanodeRegistry::new(config.heartbeat_expiry());
    let ids: Vec<DatanodeId> = (0..nodes)
        .map(|i| DatanodeId::new(format!("dn-{i:02}")))
        .collect();
    for (i, id) in ids.iter().enumerate() {
        registry.register(DatanodeInfo::new(
            id.clone(),
            SocketAddr::from(([10, 0, 1, i as u8 + 1], 50010)),
        ));
    }
    (registry, ids)
}

#[tokio::test]
async fn test_concurrent_producers_delivered_exactly_once() {
    let config = test_config();
    let (registry, nodes) = registry_with(&config, 4);
    let (sink, mut rx) = ChannelSink::new();
    let coordinator = Arc::new(Coordinator::new(config, registry, Arc::new(sink)).unwrap());

    let monitor = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.run().await })
    };

    let mut producers = Vec::new();
    for (p, node) in nodes.iter().cloned().enumerate() {
        let coordinator = Arc::clone(&coordinator);
        producers.push(tokio::spawn(async move {
            for id in 0..200u64 {
                coordinator.add_to_invalidates(block(p as u64 * 1_000 + id), &node);
                if id % 50 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }

    let mut received = HashSet::new();
    while received.len() < 800 {
        let (node, cmd) = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("maintenance loop stalled")
            .expect("sink closed");
        assert!(cmd.blocks.len() <= 25);
        for b in cmd.blocks {
            assert!(received.insert((node.clone(), b.block_id)), "block delivered twice");
        }
    }

    assert_eq!(coordinator.pending_deletion_blocks(), 0);
    coordinator.shutdown_token().cancel();
    monitor.await.unwrap();
}

#[test]
fn test_dead_datanode_work_is_dropped() {
    let config = test_config();
    let registry = DatanodeRegistry::new(Duration::from_millis(50));
    let nodes: Vec<DatanodeId> = (0..3).map(|i| DatanodeId::new(format!("dn-{i:02}"))).collect();
    for (i, id) in nodes.iter().enumerate() {
        registry.register(DatanodeInfo::new(
            id.clone(),
            SocketAddr::from(([10, 0, 2, i as u8 + 1], 50010)),
        ));
    }
    let queue = Arc::new(CommandQueue::new());
    let coordinator = Coordinator::new(config, registry, queue.clone()).unwrap();

    for node in &nodes {
        for id in 0..40 {
            coordinator.add_to_invalidates(block(id), node);
        }
    }

    // Everyone but dn-01 heartbeats after the expiry window
    std::thread::sleep(Duration::from_millis(80));
    for node in [&nodes[0], &nodes[2]] {
        assert!(coordinator.registry().heartbeat(node, 0, 0));
    }

    let report = coordinator.run_cycle(Instant::now());
    assert_eq!(report.newly_dead, vec![nodes[1].clone()]);
    // ceil(2 live * 0.5) = 1 node served
    assert_eq!(report.node_budget, 1);
    assert_eq!(report.blocks_scheduled, 25);
    assert_eq!(coordinator.pending_count(&nodes[1]), 0);
    assert_eq!(queue.queued_blocks(&nodes[1]), 0);
    assert_eq!(coordinator.pending_deletion_blocks(), 80 - 25);
    assert_eq!(
        coordinator.registry().get(&nodes[1]).unwrap().status,
        DatanodeStatus::Dead
    );
}

#[test]
fn test_backlog_dropped_when_expiry_seen_outside_cycle() {
    let config = test_config();
    let registry = DatanodeRegistry::new(Duration::from_millis(10));
    let node = DatanodeId::from("dn-00");
    let addr = SocketAddr::from(([10, 0, 3, 1], 50010));
    registry.register(DatanodeInfo::new(node.clone(), addr));
    let queue = Arc::new(CommandQueue::new());
    let coordinator = Coordinator::new(config, registry.clone(), queue).unwrap();
    for id in 0..10 {
        coordinator.add_to_invalidates(block(id), &node);
    }

    std::thread::sleep(Duration::from_millis(20));
    // A separate health check already declared it dead
    assert_eq!(registry.check_heartbeats(Instant::now()), vec![node.clone()]);

    let report = coordinator.run_cycle(Instant::now());
    assert!(report.newly_dead.is_empty());
    assert_eq!(report.node_budget, 0);
    assert_eq!(report.discarded_blocks, 10);
    assert_eq!(coordinator.pending_deletion_blocks(), 0);
}

#[test]
fn test_removed_datanode_leaves_no_queued_commands() {
    let config = test_config();
    let (registry, nodes) = registry_with(&config, 1);
    let queue = Arc::new(CommandQueue::new());
    let coordinator = Coordinator::new(config, registry, queue.clone()).unwrap();
    for id in 0..10 {
        coordinator.add_to_invalidates(block(id), &nodes[0]);
    }

    assert_eq!(coordinator.compute_invalidate_work(1), 10);
    assert_eq!(queue.pending_commands(&nodes[0]), 1);

    assert_eq!(coordinator.remove_datanode(&nodes[0]), 0);
    assert_eq!(queue.queued_blocks(&nodes[0]), 0);
    assert_eq!(queue.nodes_with_commands(), 0);
}

#[test]
fn test_dead_node_skipped_without_budget_cost() {
    let config = test_config();
    let (registry, nodes) = registry_with(&config, 3);
    let queue = Arc::new(CommandQueue::new());
    let coordinator = Coordinator::new(config, registry.clone(), queue.clone()).unwrap();

    for node in &nodes {
        for id in 0..40 {
            coordinator.add_to_invalidates(block(id), node);
        }
    }

    // Unregistered behind the coordinator's back: liveness says gone
    registry.remove(&nodes[0]);

    assert_eq!(coordinator.compute_invalidate_work(2), 50);
    assert_eq!(queue.queued_blocks(&nodes[0]), 0);
    assert_eq!(queue.queued_blocks(&nodes[1]), 25);
    assert_eq!(queue.queued_blocks(&nodes[2]), 25);
    assert_eq!(coordinator.nodes_with_work(), 2);
}

#[test]
fn test_remove_datanode_clears_backlog_and_summary() {
    let config = test_config();
    let (registry, nodes) = registry_with(&config, 2);
    let coordinator = Coordinator::new(config, registry, Arc::new(CommandQueue::new())).unwrap();

    coordinator.add_to_invalidates(block(3), &nodes[0]);
    coordinator.add_to_invalidates(block(1), &nodes[0]);
    coordinator.add_to_invalidates(block(2), &nodes[1]);

    let summary = coordinator.summary();
    assert_eq!(summary.total_pending, 3);
    assert_eq!(summary.nodes[0].block_ids, vec![1, 3]);

    assert_eq!(coordinator.remove_datanode(&nodes[0]), 2);
    let json = coordinator.summary_json().unwrap();
    assert!(json.contains("\"total_pending\": 1"));
    assert!(!json.contains(nodes[0].as_str()));
}

#[test]
fn test_custom_sink_receives_batches_after_lock_release() {
    struct LockProbe {
        coordinator: std::sync::OnceLock<Arc<Coordinator>>,
        seen: parking_lot::Mutex<Vec<(DatanodeId, usize)>>,
    }

    impl InvalidationSink for LockProbe {
        fn deliver(&self, node: &DatanodeId, blocks: Vec<Block>) {
            // Would deadlock if delivery ran under the coordinator lock
            if let Some(coordinator) = self.coordinator.get() {
                let _ = coordinator.pending_deletion_blocks();
            }
            self.seen.lock().push((node.clone(), blocks.len()));
        }
    }

    let config = test_config();
    let (registry, nodes) = registry_with(&config, 2);
    let probe = Arc::new(LockProbe {
        coordinator: std::sync::OnceLock::new(),
        seen: parking_lot::Mutex::new(Vec::new()),
    });
    let coordinator = Arc::new(Coordinator::new(config, registry, probe.clone()).unwrap());
    let _ = probe.coordinator.set(Arc::clone(&coordinator));

    for id in 0..30 {
        coordinator.add_to_invalidates(block(id), &nodes[1]);
    }
    assert_eq!(coordinator.compute_invalidate_work(4), 25);
    assert_eq!(probe.seen.lock().clone(), vec![(nodes[1].clone(), 25)]);
}
