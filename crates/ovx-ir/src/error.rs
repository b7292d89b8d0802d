//! Error types for the ovx tensor/operator model.

use crate::tensor::TensorId;
use crate::types::QuantKind;

/// Convenience alias used throughout the ovx crates.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while building, running or tearing down operators.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A tensor handle was released or never existed.
    #[error("tensor {0} is not live")]
    StaleTensor(TensorId),

    /// An operation needed a concrete shape but the tensor is still AUTO.
    #[error("tensor {0} has no resolved shape")]
    UnresolvedShape(TensorId),

    /// A tensor was read before any storage was attached to it.
    #[error("tensor {0} is not materialized")]
    NotMaterialized(TensorId),

    /// Data written to a tensor does not match its element count.
    #[error("tensor {id} holds {expected} elements, got {found}")]
    DataLength {
        id: TensorId,
        expected: usize,
        found: usize,
    },

    /// No constructor is registered for the operator name.
    #[error("unknown operator `{0}`")]
    UnknownOp(String),

    /// An operator was wired with the wrong number of slots.
    #[error("{op}: expected {expected} {what} slot(s), found {found}")]
    Arity {
        op: String,
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// A required input or output slot is empty.
    #[error("{op}: missing required {what} #{index}")]
    MissingOperand {
        op: String,
        what: &'static str,
        index: usize,
    },

    /// Operand shapes are incompatible.
    #[error("{op}: shape mismatch: {detail}")]
    ShapeMismatch { op: String, detail: String },

    /// Input and weight quantization kinds cannot be combined.
    #[error("input quantization {input} is incompatible with weight quantization {weight}")]
    QuantMismatch { input: QuantKind, weight: QuantKind },

    /// A primitive rejected its operands.
    #[error("{op}: check failed: {detail}")]
    CheckFailed { op: String, detail: String },

    /// A parameter block is invalid for the operator.
    #[error("{op}: invalid parameter: {detail}")]
    InvalidParam { op: String, detail: String },

    /// An internal node consumed a tensor no earlier node produced.
    #[error("sub_uid[{sub_id}] consumes internal tensor {tensor} before it is produced")]
    OrderViolation { sub_id: u32, tensor: TensorId },

    /// A tensor was declared as the output of two nodes.
    #[error("tensor {tensor} is already produced by node `{producer}`")]
    DuplicateProducer { tensor: TensorId, producer: String },

    /// The outer graph is not a DAG.
    #[error("graph contains a cycle ({visited} of {total} nodes visited)")]
    Cycle { visited: usize, total: usize },

    /// A composite operator was driven without an expansion workspace.
    #[error("operator `{0}` has no expansion workspace; was setup run?")]
    NoWorkspace(String),

    /// A failure inside an internal node of a composite operator.
    #[error("uid[{uid}] sub_uid[{sub_id}] op[{op}]: {source}")]
    SubNode {
        uid: u32,
        sub_id: u32,
        op: String,
        #[source]
        source: Box<Error>,
    },

    /// A failure of a node in the outer graph.
    #[error("node `{name}` uid[{uid}]: {source}")]
    Node {
        uid: u32,
        name: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wraps `self` as the failure of internal node `sub_id` of `uid`.
    pub fn in_sub_node(self, uid: u32, sub_id: u32, op: &str) -> Self {
        Self::SubNode {
            uid,
            sub_id,
            op: op.to_owned(),
            source: Box::new(self),
        }
    }

    /// Walks nested [`Error::SubNode`] wrappers and returns the innermost cause.
    pub fn root_cause(&self) -> &Error {
        match self {
            Self::SubNode { source, .. } | Self::Node { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
