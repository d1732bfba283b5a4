//! # Trellis: Block-Computed Signal Graph Nodes
//!
//! `trellis` implements nodes of a pull-based audio graph. Every tick, each
//! node reads the blocks its upstream nodes produced for that tick, writes one
//! block of its own, and finishes with a multiply/add stage whose loop was
//! selected when its operands were last rebound.
//!
//! ## Architecture
//!
//! - **Signals** - [`SignalSource`] is either a constant or a weak link
//!   ([`NodeId`]) to another node's block
//! - **Post-processing** - [`MulAdd`] precompiles one of nine [`Kernel`]s,
//!   one per scalar/stream/reversed-stream operand pair
//! - **Nodes** - [`MatrixPointer`] performs bilinear [`Matrix`] lookup; [`Sig`]
//!   and [`Phasor`] generate control signals
//! - **Server** - [`Server`] owns every node, orders them topologically and
//!   ticks them
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis::prelude::*;
//!
//! let mut server = Server::new(ServerConfig::default().with_block_size(64)).unwrap();
//!
//! let matrix = Arc::new(Matrix::from_fn(4, 4, |r, c| (r * 4 + c) as f64).unwrap());
//! let row = server.register("row", Sig::new(0.0)).unwrap();
//! let col = server.register("col", Phasor::new(2.0)).unwrap();
//! let pointer = server.register("pointer", MatrixPointer::new(matrix, row, col)).unwrap();
//! server.bind(pointer, "mul", 0.5).unwrap();
//!
//! server.tick().unwrap();
//! let block = server.output(pointer).unwrap();
//! assert_eq!(block.len(), 64);
//! ```

pub mod block;
pub mod config;
pub mod matrix;
pub mod matrix_pointer;
pub mod modules;
pub mod muladd;
pub mod node;
pub mod server;
pub mod signal;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::block::{Block, DEFAULT_BLOCK_SIZE};
    pub use crate::config::{ConfigError, ServerConfig};
    pub use crate::matrix::{clamp_position, Matrix, MatrixError, MAX_POSITION};
    pub use crate::matrix_pointer::MatrixPointer;
    pub use crate::modules::{Phasor, Sig};
    pub use crate::muladd::{Factor, Kernel, MulAdd, Term, MIN_DIVISOR};
    pub use crate::node::{Node, TickContext};
    pub use crate::server::{GraphError, NodeId, Server};
    pub use crate::signal::{BindError, Binding, Input, SignalSource};
}

// Re-export key types at crate root for convenience
pub use prelude::*;
