//! Invalidation telemetry instruments and recording helpers.

use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::KeyValue;
use std::sync::OnceLock;

struct InvalidateInstruments {
    blocks_added: Counter<u64>,
    passes: Counter<u64>,
    blocks_scheduled: Counter<u64>,
    nodes_visited: Counter<u64>,
    pass_blocks: Histogram<u64>,
    discarded_blocks: Counter<u64>,
}

fn instruments() -> &'static InvalidateInstruments {
    static INSTRUMENTS: OnceLock<InvalidateInstruments> = OnceLock::new();
    INSTRUMENTS.get_or_init(|| {
        let meter = global::meter("blockreaper.invalidate");
        InvalidateInstruments {
            blocks_added: meter
                .u64_counter("blockreaper.invalidate.blocks.added")
                .with_description("Block replicas newly queued for invalidation")
                .init(),
            passes: meter
                .u64_counter("blockreaper.invalidate.passes")
                .with_description("Invalidation passes by outcome")
                .init(),
            blocks_scheduled: meter
                .u64_counter("blockreaper.invalidate.blocks.scheduled")
                .with_description("Block replicas handed to datanodes for deletion")
                .init(),
            nodes_visited: meter
                .u64_counter("blockreaper.invalidate.nodes.visited")
                .with_description("Datanodes served by invalidation passes")
                .init(),
            pass_blocks: meter
                .u64_histogram("blockreaper.invalidate.pass.blocks")
                .with_description("Blocks scheduled per invalidation pass")
                .init(),
            discarded_blocks: meter
                .u64_counter("blockreaper.invalidate.blocks.discarded")
                .with_description("Pending blocks dropped because their datanode left the cluster")
                .init(),
        }
    })
}

pub fn record_blocks_added(count: u64) {
    if count > 0 {
        instruments().blocks_added.add(count, &[]);
    }
}

pub fn record_pass(blocks_scheduled: u64, nodes_visited: u64) {
    let i = instruments();
    let outcome = if blocks_scheduled == 0 { "idle" } else { "scheduled" };
    i.passes.add(1, &[KeyValue::new("outcome", outcome)]);
    i.blocks_scheduled.add(blocks_scheduled, &[]);
    i.nodes_visited.add(nodes_visited, &[]);
    i.pass_blocks.record(blocks_scheduled, &[]);
}

pub fn record_discarded(blocks: u64, reason: &'static str) {
    if blocks > 0 {
        instruments()
            .discarded_blocks
            .add(blocks, &[KeyValue::new("reason", reason)]);
    }
}
