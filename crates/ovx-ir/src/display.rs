//! Text dump for debugging.

use std::fmt::Write as _;

use crate::graph::Graph;
use crate::tensor::{TensorId, TensorTable};
use crate::types::format_shape;

/// Formats a slot list as `(t0, -, t3)`.
pub fn format_slots(slots: &[Option<TensorId>]) -> String {
    let items: Vec<_> = slots
        .iter()
        .map(|s| match s {
            Some(t) => t.to_string(),
            None => "-".to_owned(),
        })
        .collect();
    format!("({})", items.join(", "))
}

/// Formats one tensor as `t3 [4, 2] f32 virtual "name"`.
pub fn format_tensor(tensors: &TensorTable, id: TensorId) -> String {
    let Ok(tensor) = tensors.get(id) else {
        return format!("{id} <released>");
    };
    let attr = tensor.attr();
    let mut out = format!("{id} {} {}", format_shape(attr.shape.as_deref()), attr.dtype);
    if attr.is_virtual {
        out.push_str(" virtual");
    }
    if attr.is_const {
        out.push_str(" const");
    }
    if tensor.is_view() {
        out.push_str(" view");
    }
    if let Some(name) = tensor.name() {
        let _ = write!(out, " \"{name}\"");
    }
    out
}

/// Dumps the graph's nodes, including the internal nodes of composites.
pub fn dump_graph(graph: &Graph) -> String {
    let mut out = String::new();
    out.push_str("Nodes:\n");
    for node in graph.nodes() {
        let _ = writeln!(
            out,
            "  uid[{}] {} op[{}] in{} out{}",
            node.id.0,
            node.name,
            node.kind().name(),
            format_slots(&node.inputs),
            format_slots(&node.outputs)
        );
        node.op().describe(graph.tensors(), 2, &mut out);
    }

    out.push_str("\nTensors:\n");
    for (id, _) in graph.tensors().iter() {
        let _ = writeln!(out, "  {}", format_tensor(graph.tensors(), id));
    }
    out
}
