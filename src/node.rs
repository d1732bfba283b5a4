//! Node Interface
//!
//! [`Node`] is the type-erased contract every member of the graph follows:
//! read the current tick's inputs through a [`TickContext`], write one block
//! of output, then run the shared multiply/add stage over it.

use crate::block::Block;
use crate::server::{GraphError, NodeId};
use crate::signal::{BindError, Binding, Input, SignalSource};
use slotmap::SecondaryMap;

/// Read-only view of the blocks already computed during the current tick
pub struct TickContext<'a> {
    blocks: &'a SecondaryMap<NodeId, Block>,
    block_size: usize,
    sample_rate: f64,
}

impl<'a> TickContext<'a> {
    pub fn new(blocks: &'a SecondaryMap<NodeId, Block>, block_size: usize, sample_rate: f64) -> Self {
        Self {
            blocks,
            block_size,
            sample_rate,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Current block of an upstream node
    pub fn block(&self, id: NodeId) -> Result<&'a [f64], GraphError> {
        let block = self.blocks.get(id).ok_or(GraphError::Unavailable(id))?;
        if block.len() != self.block_size {
            return Err(GraphError::BlockSizeMismatch {
                node: id,
                expected: self.block_size,
                found: block.len(),
            });
        }
        Ok(block.as_slice())
    }

    /// Resolve a source for this tick
    pub fn read(&self, source: &SignalSource) -> Result<Input<'a>, GraphError> {
        match *source {
            SignalSource::Scalar(v) => Ok(Input::Scalar(v)),
            SignalSource::Stream(id) => self.block(id).map(Input::Stream),
        }
    }
}

/// A processing node owned by the server
pub trait Node: Send {
    /// Compute one block into `out`, which always holds `ctx.block_size()` samples
    fn compute(&mut self, ctx: &TickContext<'_>, out: &mut [f64]) -> Result<(), GraphError>;

    /// Nodes whose blocks are read during `compute`
    fn upstream(&self) -> Vec<NodeId>;

    /// Rebind a named input. On error the previous binding is kept.
    fn set_input(&mut self, name: &str, binding: Binding) -> Result<(), BindError>;

    /// Reset internal state
    fn reset(&mut self) {}

    fn set_sample_rate(&mut self, _sample_rate: f64) {}

    /// Node type identifier
    fn type_id(&self) -> &'static str {
        "unknown"
    }
}
