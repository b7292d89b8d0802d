//! A minimal outer graph: owns the tensor table and drives operators.
//!
//! Nodes are operators wired to tensor slots. The graph runs every node in
//! topological order for setup and compute, and optimizes with one backward
//! walk followed by one forward walk.

use std::collections::{BTreeSet, HashMap};

use crate::error::{Error, Result};
use crate::op::OpKind;
use crate::operator::{Context, Direction, Operator};
use crate::options::ExpandOptions;
use crate::registry::OpRegistry;
use crate::tensor::{TensorId, TensorTable};
use crate::types::TensorAttr;

/// A unique identifier for a node in the graph; doubles as the node uid.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct NodeId(pub u32);

/// A node of the outer graph.
#[derive(Debug)]
pub struct GraphNode {
    pub id: NodeId,
    pub name: String,
    kind: OpKind,
    op: Box<dyn Operator>,
    /// Input slots; composites may fill empty optional slots during setup.
    pub inputs: Vec<Option<TensorId>>,
    pub outputs: Vec<Option<TensorId>>,
}

impl GraphNode {
    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    pub fn op(&self) -> &dyn Operator {
        &*self.op
    }
}

/// The outer computation graph.
#[derive(Debug)]
pub struct Graph {
    tensors: TensorTable,
    registry: OpRegistry,
    options: ExpandOptions,
    nodes: Vec<GraphNode>,
    next_node_id: u32,
}

impl Graph {
    pub fn new(registry: OpRegistry, options: ExpandOptions) -> Self {
        Self {
            tensors: TensorTable::new(),
            registry,
            options,
            nodes: Vec::new(),
            next_node_id: 0,
        }
    }

    pub fn options(&self) -> &ExpandOptions {
        &self.options
    }

    pub fn tensors(&self) -> &TensorTable {
        &self.tensors
    }

    pub fn tensors_mut(&mut self) -> &mut TensorTable {
        &mut self.tensors
    }

    /// Declares a graph tensor.
    pub fn add_tensor(&mut self, attr: TensorAttr) -> TensorId {
        self.tensors.create(attr)
    }

    /// Adds a node and runs its operator's `init`.
    ///
    /// Slot vectors shorter than the kind's default arity are padded with
    /// empty slots (absent optional operands). Concat takes its input count
    /// from the call site.
    pub fn add_node(
        &mut self,
        kind: OpKind,
        mut inputs: Vec<Option<TensorId>>,
        mut outputs: Vec<Option<TensorId>>,
        name: impl Into<String>,
    ) -> Result<NodeId> {
        let name = name.into();

        for &t in inputs.iter().chain(outputs.iter()).flatten() {
            if !self.tensors.contains(t) {
                return Err(Error::StaleTensor(t));
            }
        }
        for &out in outputs.iter().flatten() {
            if let Some(existing) = self.tensor_producer(out) {
                return Err(Error::DuplicateProducer {
                    tensor: out,
                    producer: existing.name.clone(),
                });
            }
        }

        let (n_in, n_out) = kind.default_arity();
        if !matches!(kind, OpKind::Concat { .. }) && inputs.len() < n_in {
            inputs.resize(n_in, None);
        }
        if outputs.len() < n_out {
            outputs.resize(n_out, None);
        }

        let id = NodeId(self.next_node_id);
        let mut op = self.registry.create(&kind)?;
        let mut cx = Context::new(&mut self.tensors, &self.registry, &self.options, id.0);
        op.init(&mut cx).map_err(|e| node_error(id, &name, e))?;

        self.next_node_id += 1;
        self.nodes.push(GraphNode {
            id,
            name,
            kind,
            op,
            inputs,
            outputs,
        });
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of tensors still alive in the tensor table.
    pub fn live_tensor_count(&self) -> usize {
        self.tensors.live_count()
    }

    /// Returns node indices in topological order.
    ///
    /// The ordering is deterministic: among ready nodes, the one with the
    /// smaller [`NodeId`] is emitted first.
    pub fn topological_order(&self) -> Result<Vec<usize>> {
        let mut producer: HashMap<TensorId, usize> = HashMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            for &out in node.outputs.iter().flatten() {
                producer.insert(out, i);
            }
        }

        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (ci, node) in self.nodes.iter().enumerate() {
            for inp in node.inputs.iter().flatten() {
                if let Some(&pi) = producer.get(inp) {
                    in_degree[ci] += 1;
                    consumers[pi].push(ci);
                }
            }
        }

        let mut ready: BTreeSet<(NodeId, usize)> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(i, _)| (self.nodes[i].id, i))
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some((_, idx)) = ready.pop_first() {
            order.push(idx);
            for &ci in &consumers[idx] {
                in_degree[ci] -= 1;
                if in_degree[ci] == 0 {
                    ready.insert((self.nodes[ci].id, ci));
                }
            }
        }

        if order.len() != n {
            return Err(Error::Cycle {
                visited: order.len(),
                total: n,
            });
        }
        Ok(order)
    }

    /// Runs `setup` then `check` on every node in topological order.
    pub fn setup(&mut self) -> Result<()> {
        let order = self.topological_order()?;
        let Self {
            tensors,
            registry,
            options,
            nodes,
            ..
        } = self;
        for idx in order {
            let node = &mut nodes[idx];
            log::debug!("setup node `{}` uid[{}] op[{}]", node.name, node.id.0, node.kind.name());
            let mut cx = Context::new(tensors, registry, options, node.id.0);
            node.op
                .setup(&mut cx, &mut node.inputs, &node.outputs)
                .and_then(|()| node.op.check(&cx, &node.inputs, &node.outputs))
                .map_err(|e| node_error(node.id, &node.name, e))?;
        }
        Ok(())
    }

    /// One backward walk over every node, then one forward walk.
    pub fn optimize(&mut self) -> Result<()> {
        let order = self.topological_order()?;
        self.optimize_walk(order.iter().rev().copied(), Direction::Backward)?;
        self.optimize_walk(order.iter().copied(), Direction::Forward)
    }

    fn optimize_walk(
        &mut self,
        order: impl Iterator<Item = usize>,
        direction: Direction,
    ) -> Result<()> {
        let Self {
            tensors,
            registry,
            options,
            nodes,
            ..
        } = self;
        for idx in order {
            let node = &mut nodes[idx];
            let mut cx = Context::new(tensors, registry, options, node.id.0);
            node.op
                .optimize(&mut cx, &node.inputs, &node.outputs, direction)
                .map_err(|e| node_error(node.id, &node.name, e))?;
        }
        Ok(())
    }

    /// Computes every node in topological order, stopping at the first
    /// failure.
    pub fn compute(&mut self) -> Result<()> {
        let order = self.topological_order()?;
        let Self {
            tensors,
            registry,
            options,
            nodes,
            ..
        } = self;
        for idx in order {
            let node = &mut nodes[idx];
            let mut cx = Context::new(tensors, registry, options, node.id.0);
            let result = node
                .outputs
                .iter()
                .flatten()
                .try_for_each(|&out| cx.tensors.materialize(out))
                .and_then(|()| node.op.compute(&mut cx, &node.inputs, &node.outputs));
            result.map_err(|e| node_error(node.id, &node.name, e))?;
        }
        Ok(())
    }

    /// Calls `deinit` on every node. All nodes are visited even if one
    /// fails; the first failure is returned.
    pub fn deinit(&mut self) -> Result<()> {
        let Self {
            tensors,
            registry,
            options,
            nodes,
            ..
        } = self;
        let mut first_err = None;
        for node in nodes.iter_mut() {
            let mut cx = Context::new(tensors, registry, options, node.id.0);
            if let Err(e) = node.op.deinit(&mut cx) {
                log::warn!("deinit of node `{}` failed: {e}", node.name);
                first_err.get_or_insert(node_error(node.id, &node.name, e));
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// The node that writes `tensor`, if any.
    pub fn tensor_producer(&self, tensor: TensorId) -> Option<&GraphNode> {
        self.nodes
            .iter()
            .find(|n| n.outputs.contains(&Some(tensor)))
    }

    /// All nodes that read `tensor`.
    pub fn tensor_consumers(&self, tensor: TensorId) -> Vec<&GraphNode> {
        self.nodes
            .iter()
            .filter(|n| n.inputs.contains(&Some(tensor)))
            .collect()
    }
}

fn node_error(id: NodeId, name: &str, source: Error) -> Error {
    log::error!("node `{name}` uid[{}] failed: {source}", id.0);
    Error::Node {
        uid: id.0,
        name: name.to_owned(),
        source: Box::new(source),
    }
}
