//! Node Server
//!
//! The [`Server`] is the arena that owns every registered node and its output
//! block. Nodes refer to each other only by [`NodeId`]; those ids are weak, so
//! removing a node never has to chase references held by other nodes, and a
//! lookup through a stale id reports [`GraphError::Unavailable`] instead of
//! reading freed state.
//!
//! Each tick computes every active node once, in a topological order derived
//! from the nodes' declared upstream ids, so an upstream block is always
//! complete before anything downstream reads it.

use crate::block::Block;
use crate::config::{ConfigError, ServerConfig};
use crate::node::{Node, TickContext};
use crate::signal::{BindError, Binding, Input, SignalSource};
use slotmap::{DefaultKey, SecondaryMap, SlotMap};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Unique identifier for a node registered with a server
pub type NodeId = DefaultKey;

/// Internal node representation
struct Slot {
    node: Box<dyn Node>,
    name: String,
    active: bool,
}

/// Graph integrity errors
#[derive(Debug, Clone, PartialEq)]
pub enum GraphError {
    InvalidNode,
    Unavailable(NodeId),
    BlockSizeMismatch {
        node: NodeId,
        expected: usize,
        found: usize,
    },
    CycleDetected {
        nodes: Vec<NodeId>,
    },
    Bind(BindError),
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::InvalidNode => write!(f, "Invalid node"),
            GraphError::Unavailable(id) => write!(f, "Node {:?} is unavailable", id),
            GraphError::BlockSizeMismatch {
                node,
                expected,
                found,
            } => write!(
                f,
                "Node {:?} produced {} samples, expected {}",
                node, found, expected
            ),
            GraphError::CycleDetected { nodes } => {
                write!(f, "Cycle detected involving {} nodes", nodes.len())
            }
            GraphError::Bind(err) => write!(f, "Binding failed: {}", err),
        }
    }
}

impl std::error::Error for GraphError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GraphError::Bind(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BindError> for GraphError {
    fn from(err: BindError) -> Self {
        GraphError::Bind(err)
    }
}

/// Arena and scheduler for a graph of nodes
pub struct Server {
    config: ServerConfig,
    nodes: SlotMap<NodeId, Slot>,
    blocks: SecondaryMap<NodeId, Block>,
    execution_order: Vec<NodeId>,
    dirty: bool,
}

impl Server {
    pub fn new(config: ServerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            nodes: SlotMap::new(),
            blocks: SecondaryMap::new(),
            execution_order: Vec::new(),
            dirty: false,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    pub fn sample_rate(&self) -> f64 {
        self.config.sample_rate
    }

    /// Register a node; it is ticked from the next tick on.
    ///
    /// Every stream the node already reads must point at a registered node.
    pub fn register<N: Node + 'static>(
        &mut self,
        name: impl Into<String>,
        node: N,
    ) -> Result<NodeId, GraphError> {
        self.register_boxed(name, Box::new(node))
    }

    pub fn register_boxed(
        &mut self,
        name: impl Into<String>,
        mut node: Box<dyn Node>,
    ) -> Result<NodeId, GraphError> {
        let name = name.into();
        if let Some(missing) = node
            .upstream()
            .into_iter()
            .find(|up| !self.nodes.contains_key(*up))
        {
            warn!(name = %name, upstream = ?missing, "rejected registration");
            return Err(BindError::Unavailable(missing).into());
        }

        node.set_sample_rate(self.config.sample_rate);
        let kind = node.type_id();
        let id = self.nodes.insert(Slot {
            node,
            name,
            active: true,
        });
        self.blocks.insert(id, Block::new(self.config.block_size));
        self.invalidate();
        debug!(node = ?id, kind, "registered node");
        Ok(id)
    }

    /// Remove a node and drop everything it owns.
    ///
    /// Nodes still pointing at `id` are left as they are; their reads resolve
    /// as unavailable from now on.
    pub fn unregister(&mut self, id: NodeId) -> Result<(), GraphError> {
        let slot = self.nodes.remove(id).ok_or(GraphError::InvalidNode)?;
        self.blocks.remove(id);
        self.invalidate();
        debug!(node = ?id, name = %slot.name, "unregistered node");
        Ok(())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Resume computing a stopped node
    pub fn play(&mut self, id: NodeId) -> Result<(), GraphError> {
        let slot = self.nodes.get_mut(id).ok_or(GraphError::InvalidNode)?;
        slot.active = true;
        debug!(node = ?id, "play");
        Ok(())
    }

    /// Stop computing a node; its block stays silent until `play`
    pub fn stop(&mut self, id: NodeId) -> Result<(), GraphError> {
        let slot = self.nodes.get_mut(id).ok_or(GraphError::InvalidNode)?;
        slot.active = false;
        if let Some(block) = self.blocks.get_mut(id) {
            block.clear();
        }
        debug!(node = ?id, "stop");
        Ok(())
    }

    pub fn is_active(&self, id: NodeId) -> Option<bool> {
        self.nodes.get(id).map(|slot| slot.active)
    }

    /// Rebind a named input of a node.
    ///
    /// Stream bindings must point at a registered node. A rejected binding
    /// is logged and returned; the node keeps its previous binding.
    pub fn bind(
        &mut self,
        id: NodeId,
        input: &str,
        binding: impl Into<Binding>,
    ) -> Result<(), GraphError> {
        let result = self.try_bind(id, input, binding.into());
        if let Err(err) = &result {
            warn!(node = ?id, input, error = %err, "rejected binding");
        }
        result
    }

    fn try_bind(&mut self, id: NodeId, input: &str, binding: Binding) -> Result<(), GraphError> {
        if let Binding::Node(target) = binding {
            if !self.nodes.contains_key(target) {
                return Err(BindError::Unavailable(target).into());
            }
        }
        if !self.nodes.contains_key(id) {
            return Err(GraphError::InvalidNode);
        }
        if let Binding::Node(target) = binding {
            if target == id || self.depends_on(target, id) {
                return Err(BindError::WouldCycle {
                    input: input.to_string(),
                    node: target,
                }
                .into());
            }
        }
        let slot = self.nodes.get_mut(id).ok_or(GraphError::InvalidNode)?;
        slot.node.set_input(input, binding)?;
        self.invalidate();
        Ok(())
    }

    /// Whether `node` reads `target`, directly or through other nodes
    fn depends_on(&self, node: NodeId, target: NodeId) -> bool {
        let mut visited: SecondaryMap<NodeId, ()> = SecondaryMap::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if visited.insert(current, ()).is_some() {
                continue;
            }
            let Some(slot) = self.nodes.get(current) else {
                continue;
            };
            for up in slot.node.upstream() {
                if up == target {
                    return true;
                }
                stack.push(up);
            }
        }
        false
    }

    /// Resolve a source against the blocks of the last tick
    pub fn resolve(&self, source: &SignalSource) -> Result<Input<'_>, GraphError> {
        self.context().read(source)
    }

    /// Current output block of a node
    pub fn output(&self, id: NodeId) -> Option<&[f64]> {
        self.blocks.get(id).map(Block::as_slice)
    }

    pub fn node(&self, id: NodeId) -> Option<&dyn Node> {
        self.nodes.get(id).map(|slot| slot.node.as_ref())
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(id).map(|slot| slot.name.as_str())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Execution order (after compile)
    pub fn execution_order(&self) -> &[NodeId] {
        &self.execution_order
    }

    /// Iterate over all nodes
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &str, &dyn Node)> {
        self.nodes
            .iter()
            .map(|(id, slot)| (id, slot.name.as_str(), slot.node.as_ref()))
    }

    fn context(&self) -> TickContext<'_> {
        TickContext::new(&self.blocks, self.config.block_size, self.config.sample_rate)
    }

    fn invalidate(&mut self) {
        self.dirty = true;
        self.execution_order.clear();
    }

    /// Compute the execution order.
    ///
    /// Upstream ids that are no longer registered are ignored here; they are
    /// reported when the node reads them during a tick.
    pub fn compile(&mut self) -> Result<(), GraphError> {
        let mut in_degree: SecondaryMap<NodeId, usize> =
            self.nodes.keys().map(|id| (id, 0)).collect();
        let mut successors: SecondaryMap<NodeId, Vec<NodeId>> =
            self.nodes.keys().map(|id| (id, Vec::new())).collect();

        for (id, slot) in &self.nodes {
            for upstream in slot.node.upstream() {
                if let Some(list) = successors.get_mut(upstream) {
                    list.push(id);
                    in_degree[id] += 1;
                }
            }
        }

        // Kahn's algorithm
        let mut queue: VecDeque<NodeId> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(id, _)| id)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = queue.pop_front() {
            order.push(id);
            for &succ in &successors[id] {
                let deg = &mut in_degree[succ];
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(succ);
                }
            }
        }

        if order.len() != self.nodes.len() {
            let in_cycle: Vec<NodeId> = in_degree
                .iter()
                .filter(|(_, &deg)| deg > 0)
                .map(|(id, _)| id)
                .collect();
            warn!(nodes = in_cycle.len(), "dependency cycle, graph not compiled");
            return Err(GraphError::CycleDetected { nodes: in_cycle });
        }

        debug!(nodes = order.len(), "compiled execution order");
        self.execution_order = order;
        self.dirty = false;
        Ok(())
    }

    /// Compute one block for every active node.
    ///
    /// A node that cannot read its inputs outputs silence for this tick.
    pub fn tick(&mut self) -> Result<(), GraphError> {
        if self.dirty {
            if let Err(err) = self.compile() {
                // Nothing is computed this tick; stale blocks must not be read
                for (_, block) in &mut self.blocks {
                    block.clear();
                }
                return Err(err);
            }
        }

        for i in 0..self.execution_order.len() {
            let id = self.execution_order[i];
            let Some(slot) = self.nodes.get_mut(id) else {
                continue;
            };
            if !slot.active {
                continue;
            }
            let Some(mut block) = self.blocks.remove(id) else {
                continue;
            };

            let ctx = TickContext::new(&self.blocks, self.config.block_size, self.config.sample_rate);
            if let Err(err) = slot.node.compute(&ctx, block.as_mut_slice()) {
                warn!(node = ?id, name = %slot.name, error = %err, "node emitted silence");
                block.clear();
            }
            self.blocks.insert(id, block);
        }

        Ok(())
    }

    /// Reset every node and silence every block
    pub fn reset(&mut self) {
        for (_, slot) in &mut self.nodes {
            slot.node.reset();
        }
        for (_, block) in &mut self.blocks {
            block.clear();
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self {
            config: ServerConfig::default(),
            nodes: SlotMap::new(),
            blocks: SecondaryMap::new(),
            execution_order: Vec::new(),
            dirty: false,
        }
    }
}
