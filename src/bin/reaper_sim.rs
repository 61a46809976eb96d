//! blockreaper simulator
//!
//! Drives the invalidation coordinator against a synthetic cluster: seeds
//! every datanode with a deletion backlog, runs the maintenance loop, and has
//! each simulated datanode pull its commands on every heartbeat.

use blockreaper::block::{Block, FIRST_VALID_STAMP};
use blockreaper::cluster::{DatanodeId, DatanodeInfo, DatanodeRegistry};
use blockreaper::config::InvalidateConfig;
use blockreaper::coordinator::Coordinator;
use blockreaper::invalidate::CommandQueue;
use blockreaper::telemetry::Telemetry;

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

/// blockreaper invalidation simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of simulated datanodes
    #[arg(long, default_value = "8")]
    datanodes: usize,

    /// Blocks queued for deletion on each datanode at start
    #[arg(long, default_value = "5000")]
    blocks_per_datanode: u64,

    /// Blocks per datanode per pass (overrides BLOCKREAPER_INVALIDATE_LIMIT)
    #[arg(long)]
    invalidate_limit: Option<usize>,

    /// Fraction of live datanodes served per pass
    #[arg(long)]
    work_pct: Option<f64>,

    /// Maintenance period in milliseconds
    #[arg(long, default_value = "200")]
    interval_ms: u64,

    /// Print the remaining backlog as JSON on exit
    #[arg(long)]
    dump_summary: bool,

    /// Log level
    #[arg(long, env = "BLOCKREAPER_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let _telemetry = Telemetry::init_for_component("blockreaper-sim", &args.log_level)?;

    let mut config = InvalidateConfig::from_env()?;
    if let Some(limit) = args.invalidate_limit {
        config.invalidate_limit = limit;
    }
    if let Some(pct) = args.work_pct {
        config.invalidate_work_pct = pct;
    }
    let interval = Duration::from_millis(args.interval_ms.max(1));
    config.replication_interval = interval;

    let registry = DatanodeRegistry::new(config.heartbeat_expiry());
    let datanodes: Vec<DatanodeId> = (0..args.datanodes)
        .map(|i| DatanodeId::new(format!("dn-{i:03}")))
        .collect();
    for (i, id) in datanodes.iter().enumerate() {
        let addr = SocketAddr::from(([10, 0, (i / 250) as u8, (i % 250) as u8 + 1], 50010));
        registry.register(DatanodeInfo::new(id.clone(), addr));
    }

    let commands = Arc::new(CommandQueue::new());
    let coordinator = Arc::new(Coordinator::new(config, registry, commands.clone())?);

    for (i, node) in datanodes.iter().enumerate() {
        for j in 0..args.blocks_per_datanode {
            let block = Block::new(i as u64 * args.blocks_per_datanode + j, 0, FIRST_VALID_STAMP);
            coordinator.add_to_invalidates(block, node);
        }
    }

    let seeded = coordinator.pending_deletion_blocks() as u64;
    info!(
        datanodes = args.datanodes,
        pending = seeded,
        blocks_per_node = coordinator.blocks_per_node(),
        node_budget = coordinator.nodes_to_process(),
        "Simulation seeded"
    );

    let shutdown = coordinator.shutdown_token();
    let monitor = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.run().await })
    };

    let heartbeats = {
        let coordinator = Arc::clone(&coordinator);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval);
            let mut deleted: u64 = 0;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        for node in &datanodes {
                            coordinator.registry().heartbeat(node, 0, 0);
                            for cmd in commands.take(node) {
                                deleted += cmd.blocks.len() as u64;
                            }
                        }
                        // Counted on pickup: a pass may still be delivering after the
                        // backlog reads empty
                        if deleted >= seeded {
                            info!(deleted, "Backlog fully delivered");
                            shutdown.cancel();
                            break;
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        })
    };

    tokio::select! {
        _ = shutdown.cancelled() => {},
        _ = shutdown_signal() => shutdown.cancel(),
    }

    monitor.await?;
    heartbeats.await?;

    if args.dump_summary {
        println!("{}", coordinator.summary_json()?);
    }

    info!("Simulator shutting down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
