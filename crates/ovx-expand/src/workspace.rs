//! The expansion workspace of a composite operator instance.
//!
//! A workspace owns the internal nodes a composite expanded into and the
//! internal tensors it created. Nodes are kept in creation order, which is
//! also execution order: [`Workspace::register_and_validate`] refuses a node
//! that reads an internal tensor no earlier node has produced, so the list
//! is a topological order by construction. It also refuses a second
//! writer for any internal tensor.
//!
//! Tensors borrowed from the outer graph (the composite's declared inputs
//! and outputs) may be wired into internal nodes but are never released
//! here.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use ovx_ir::{
    Context, Direction, Error, OpKind, Operator, Result, TensorAttr, TensorId, TensorTable,
    WorkspaceStats, format_slots, format_tensor,
};

/// One node of an expansion.
#[derive(Debug)]
pub struct InternalNode {
    sub_id: u32,
    kind: OpKind,
    op: Box<dyn Operator>,
    pub inputs: Vec<Option<TensorId>>,
    pub outputs: Vec<Option<TensorId>>,
    output_attrs: Vec<Option<TensorAttr>>,
}

impl InternalNode {
    /// Sub-id within the owning workspace; 0 until registered.
    pub fn sub_id(&self) -> u32 {
        self.sub_id
    }

    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    pub fn op(&self) -> &dyn Operator {
        &*self.op
    }

    /// Output attributes as of the last successful compute.
    pub fn output_attrs(&self) -> &[Option<TensorAttr>] {
        &self.output_attrs
    }
}

/// Internal nodes and tensors of one composite instance.
#[derive(Debug)]
pub struct Workspace {
    nodes: Vec<InternalNode>,
    tensors: Vec<TensorId>,
    owned: HashSet<TensorId>,
    /// Internal tensors written by a registered node, with the writer.
    produced: HashMap<TensorId, u32>,
    next_sub_id: u32,
}

impl Default for Workspace {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            tensors: Vec::new(),
            owned: HashSet::new(),
            produced: HashMap::new(),
            next_sub_id: 1,
        }
    }
}

/// Installs a fresh workspace in `slot`, discarding any previous one.
pub fn init_workspace<'s>(slot: &'s mut Option<Workspace>, cx: &mut Context<'_>) -> Result<&'s mut Workspace> {
    if slot.is_some() {
        log::debug!("uid[{}] re-expanding, discarding previous workspace", cx.uid);
        deinit_workspace(slot, cx)?;
    }
    Ok(slot.insert(Workspace::default()))
}

/// Tears down the workspace in `slot`, if any.
///
/// Every node's operator is deinitialized and every internal tensor released,
/// head first. All of them are visited even when one fails; the first failure
/// is returned. The slot is empty afterwards either way.
pub fn deinit_workspace(slot: &mut Option<Workspace>, cx: &mut Context<'_>) -> Result<()> {
    let Some(ws) = slot.take() else {
        return Ok(());
    };
    let mut first_err = None;
    for mut node in ws.nodes {
        log::debug!(
            "Deinit node uid[{}] sub_uid[{}] op[{}]",
            cx.uid,
            node.sub_id,
            node.kind.name()
        );
        if let Err(e) = node.op.deinit(cx) {
            log::warn!("deinit of sub_uid[{}] failed: {e}", node.sub_id);
            first_err.get_or_insert(e.in_sub_node(cx.uid, node.sub_id, node.kind.name()));
        }
    }
    for id in ws.tensors {
        if let Err(e) = cx.tensors.release(id) {
            log::warn!("uid[{}] failed to release internal tensor {id}: {e}", cx.uid);
            first_err.get_or_insert(e);
        }
    }
    first_err.map_or(Ok(()), Err)
}

impl Workspace {
    /// Creates an internal tensor owned by this workspace.
    ///
    /// Non-virtual tensors with a known shape are materialized and filled
    /// with `default` right away.
    pub fn new_tensor(&mut self, cx: &mut Context<'_>, attr: TensorAttr, default: f32) -> TensorId {
        let id = cx.tensors.create_with_default(attr, default);
        self.track(id);
        id
    }

    /// Creates an owned view of `src` with a different shape.
    pub fn new_view(&mut self, cx: &mut Context<'_>, src: TensorId, shape: &[usize]) -> Result<TensorId> {
        let id = cx.tensors.reshape_view(src, shape)?;
        self.track(id);
        Ok(id)
    }

    fn track(&mut self, id: TensorId) {
        self.tensors.push(id);
        self.owned.insert(id);
    }

    /// Returns `true` if `id` was created by this workspace.
    pub fn owns(&self, id: TensorId) -> bool {
        self.owned.contains(&id)
    }

    /// Creates an unregistered node for `kind` with empty slots.
    ///
    /// A count of 0 takes the kind's default arity.
    pub fn new_internal_node(
        &self,
        cx: &mut Context<'_>,
        kind: OpKind,
        n_in: usize,
        n_out: usize,
    ) -> Result<InternalNode> {
        let (default_in, default_out) = kind.default_arity();
        let n_in = if n_in == 0 { default_in } else { n_in };
        let n_out = if n_out == 0 { default_out } else { n_out };
        let mut op = cx.registry.create(&kind)?;
        op.init(cx)?;
        Ok(InternalNode {
            sub_id: 0,
            kind,
            op,
            inputs: vec![None; n_in],
            outputs: vec![None; n_out],
            output_attrs: vec![None; n_out],
        })
    }

    /// Appends `node`, then runs its `setup` and `check`.
    ///
    /// The node gets the next sub-id. It stays in the list even if
    /// registration fails, so teardown still reaches it. Returns the sub-id.
    ///
    /// Every internal tensor has at most one producer: a node may neither
    /// write a tensor an earlier node wrote nor overwrite an internal
    /// constant.
    pub fn register_and_validate(&mut self, cx: &mut Context<'_>, mut node: InternalNode) -> Result<u32> {
        let sub_id = self.next_sub_id;
        self.next_sub_id += 1;
        node.sub_id = sub_id;
        let op_name = node.kind.name().to_owned();

        if let Err(e) = self.validate_wiring(cx.tensors, &node) {
            self.nodes.push(node);
            log::error!("uid[{}] sub_uid[{sub_id}] op[{op_name}] rejected: {e}", cx.uid);
            return Err(e.in_sub_node(cx.uid, sub_id, &op_name));
        }

        self.produced
            .extend(node.outputs.iter().flatten().map(|&id| (id, sub_id)));
        log::debug!("Setup node uid[{}] sub_uid[{sub_id}] op[{op_name}]", cx.uid);
        let result = node
            .op
            .setup(cx, &mut node.inputs, &node.outputs)
            .and_then(|()| node.op.check(cx, &node.inputs, &node.outputs));
        self.nodes.push(node);
        result.map_err(|e| {
            log::error!("uid[{}] sub_uid[{sub_id}] op[{op_name}] setup failed: {e}", cx.uid);
            e.in_sub_node(cx.uid, sub_id, &op_name)
        })?;
        Ok(sub_id)
    }

    /// Checks the ordering and single-producer rules for `node`.
    fn validate_wiring(&self, tensors: &TensorTable, node: &InternalNode) -> Result<()> {
        for &input in node.inputs.iter().flatten() {
            if self.owned.contains(&input)
                && !self.produced.contains_key(&input)
                && !tensors.is_materialized(input)?
            {
                return Err(Error::OrderViolation {
                    sub_id: node.sub_id,
                    tensor: input,
                });
            }
        }
        for &output in node.outputs.iter().flatten() {
            if !self.owned.contains(&output) {
                continue;
            }
            let producer = match self.produced.get(&output) {
                Some(earlier) => format!("sub_uid[{earlier}]"),
                None if tensors.attr(output)?.is_const && tensors.is_materialized(output)? => {
                    "constant initializer".to_owned()
                }
                None => continue,
            };
            return Err(Error::DuplicateProducer {
                tensor: output,
                producer,
            });
        }
        Ok(())
    }

    /// Computes every node in order, stopping at the first failure.
    pub fn compute(&mut self, cx: &mut Context<'_>) -> Result<()> {
        let uid = cx.uid;
        for node in &mut self.nodes {
            let sub_id = node.sub_id;
            let op_name = node.kind.name();
            log::debug!("Compute node uid[{uid}] sub_uid[{sub_id}] op[{op_name}]");
            let wrap = |e: Error| {
                log::error!("uid[{uid}] sub_uid[{sub_id}] op[{op_name}] compute failed: {e}");
                e.in_sub_node(uid, sub_id, op_name)
            };
            for (i, &out) in node.outputs.iter().enumerate() {
                let Some(out) = out else { continue };
                cx.tensors.materialize(out).map_err(wrap)?;
                if cx.tensors.get(out).is_ok_and(|t| t.name().is_none()) {
                    cx.tensors
                        .set_name(out, format!("uid_{uid}_sub_uid_{sub_id}_out_{i}"))
                        .map_err(wrap)?;
                }
            }
            node.op
                .compute(cx, &node.inputs, &node.outputs)
                .map_err(wrap)?;
            for (attr, out) in node.output_attrs.iter_mut().zip(&node.outputs) {
                let Some(out) = *out else { continue };
                match cx.tensors.attr(out) {
                    Ok(a) => *attr = Some(a.clone()),
                    Err(e) => log::warn!("sub_uid[{sub_id}] could not refresh output {out}: {e}"),
                }
            }
        }
        Ok(())
    }

    /// Optimizes every node: insertion order when `Forward`, reverse when
    /// `Backward`. Stops at the first failure.
    pub fn optimize(&mut self, cx: &mut Context<'_>, direction: Direction) -> Result<()> {
        match direction {
            Direction::Forward => self
                .nodes
                .iter_mut()
                .try_for_each(|n| optimize_node(n, cx, direction)),
            Direction::Backward => self
                .nodes
                .iter_mut()
                .rev()
                .try_for_each(|n| optimize_node(n, cx, direction)),
        }
    }

    pub fn stats(&self) -> WorkspaceStats {
        WorkspaceStats {
            nodes: self.nodes.len(),
            tensors: self.tensors.len(),
        }
    }

    pub fn nodes(&self) -> &[InternalNode] {
        &self.nodes
    }

    /// Internal tensors in creation order.
    pub fn tensors(&self) -> &[TensorId] {
        &self.tensors
    }

    pub fn node_by_sub_id(&self, sub_id: u32) -> Option<&InternalNode> {
        self.nodes.iter().find(|n| n.sub_id == sub_id)
    }

    /// Appends one line per node to `out`, recursing into nested composites.
    pub fn describe(&self, tensors: &TensorTable, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        for node in &self.nodes {
            let _ = writeln!(
                out,
                "{indent}sub_uid[{}] op[{}] in{} out{}",
                node.sub_id,
                node.kind.name(),
                format_slots(&node.inputs),
                format_slots(&node.outputs)
            );
            node.op.describe(tensors, depth + 1, out);
        }
    }
}

fn optimize_node(node: &mut InternalNode, cx: &mut Context<'_>, direction: Direction) -> Result<()> {
    let (uid, sub_id, op_name) = (cx.uid, node.sub_id, node.kind.name());
    log::debug!("Optimize node uid[{uid}] sub_uid[{sub_id}] op[{op_name}]");
    node.op
        .optimize(cx, &node.inputs, &node.outputs, direction)
        .map_err(|e| {
            log::error!("uid[{uid}] sub_uid[{sub_id}] op[{op_name}] optimize {direction:?} failed: {e}");
            e.in_sub_node(uid, sub_id, op_name)
        })
}

/// Renders a workspace's nodes and internal tensors as text.
pub fn dump_workspace(ws: &Workspace, tensors: &TensorTable) -> String {
    let mut out = String::from("Internal nodes:\n");
    ws.describe(tensors, 1, &mut out);
    out.push_str("Internal tensors:\n");
    for &id in &ws.tensors {
        let _ = writeln!(out, "  {}", format_tensor(tensors, id));
    }
    out
}
