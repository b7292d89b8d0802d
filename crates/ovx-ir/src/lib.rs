//! ovx tensor and operator model.
//!
//! Tensors live in a [`TensorTable`] and are addressed by [`TensorId`]
//! handles. Operators implement the [`Operator`] contract and are created
//! through an [`OpRegistry`] from an [`OpKind`], which carries the
//! operator's parameters.

pub mod arena;
mod display;
mod error;
pub mod graph;
pub mod op;
mod operator;
mod options;
mod registry;
mod tensor;
mod types;

pub use arena::{Arena, Handle};
pub use display::{dump_graph, format_slots, format_tensor};
pub use error::{Error, Result};
pub use graph::{Graph, GraphNode, NodeId};
pub use op::{
    ActivationKind, CellDtypes, Conv2dParams, GruCellParams, GruResetMode, LstmCellParams, OpKind,
    RnnCellParams, SequenceCell, SequenceParams,
};
pub use operator::{Context, Direction, Operator, WorkspaceStats, expect_arity, required};
pub use options::{ExpandOptions, FcRouting};
pub use registry::{OpConstructor, OpRegistry};
pub use tensor::{Tensor, TensorId, TensorTable};
pub use types::{DType, DataType, QuantKind, Quantization, TensorAttr, format_shape};
