//! Matrix Scan Example
//!
//! Scans a small wavetable matrix: a slow phasor moves through the rows while
//! a fast phasor reads across each row. Halfway through, the gain is switched
//! from a constant to an LFO-style stream, then the row driver is removed.
//!
//! Run with: cargo run --example matrix_scan

use std::sync::Arc;
use trellis::prelude::*;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let config = ServerConfig::new(48000.0, 128);
    let mut server = Server::new(config).unwrap();

    // 8 rows of increasingly bright saw-ish waves, 512 samples each
    let matrix = Arc::new(
        Matrix::from_fn(8, 512, |r, c| {
            let phase = c as f64 / 512.0;
            (1..=r + 1)
                .map(|h| (phase * std::f64::consts::TAU * h as f64).sin() / h as f64)
                .sum()
        })
        .unwrap(),
    );

    let row = server.register("row", Phasor::new(0.5)).unwrap();
    let col = server.register("col", Phasor::new(110.0)).unwrap();
    let pointer = server.register("pointer", MatrixPointer::new(matrix, row, col)).unwrap();
    server.bind(pointer, "mul", 0.5).unwrap();

    println!("Graph has {} nodes", server.node_count());

    for tick in 0..4 {
        server.tick().unwrap();
        let block = Block::from_samples(server.output(pointer).unwrap().to_vec());
        println!("tick {}: peak {:.3}, mean {:+.4}", tick, block.peak(), block.mean());
    }

    // Swap the constant gain for a slow tremolo stream
    let tremolo = server.register("tremolo", Phasor::new(4.0)).unwrap();
    server.bind(pointer, "mul", tremolo).unwrap();

    // Rejected: a matrix is not a signal
    if let Err(err) = server.bind(pointer, "add", Matrix::new(1, 1).unwrap()) {
        println!("binding rejected: {}", err);
    }

    for tick in 4..8 {
        server.tick().unwrap();
        let block = Block::from_samples(server.output(pointer).unwrap().to_vec());
        println!("tick {}: peak {:.3}, mean {:+.4}", tick, block.peak(), block.mean());
    }

    // Removing the row driver leaves the pointer with an unavailable input
    server.unregister(row).unwrap();
    server.tick().unwrap();
    println!(
        "after removing row driver: peak {:.3}",
        Block::from_samples(server.output(pointer).unwrap().to_vec()).peak()
    );
}
