//! The operator contract shared by primitive and composite operators.

use std::fmt::Debug;

use crate::error::Result;
use crate::options::ExpandOptions;
use crate::registry::OpRegistry;
use crate::tensor::{TensorId, TensorTable};

/// Direction of an optimize walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
}

/// Everything an operator may touch while it runs.
///
/// Passed explicitly to every call; operators hold no pointer back into the
/// graph.
pub struct Context<'a> {
    pub tensors: &'a mut TensorTable,
    pub registry: &'a OpRegistry,
    pub options: &'a ExpandOptions,
    /// Unique id of the outer-graph node being driven.
    pub uid: u32,
}

impl<'a> Context<'a> {
    pub fn new(
        tensors: &'a mut TensorTable,
        registry: &'a OpRegistry,
        options: &'a ExpandOptions,
        uid: u32,
    ) -> Self {
        Self {
            tensors,
            registry,
            options,
            uid,
        }
    }

    /// A shorter-lived context over the same graph.
    pub fn reborrow(&mut self) -> Context<'_> {
        Context {
            tensors: &mut *self.tensors,
            registry: self.registry,
            options: self.options,
            uid: self.uid,
        }
    }
}

/// Node and tensor counts of an expansion workspace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkspaceStats {
    pub nodes: usize,
    pub tensors: usize,
}

/// An operator bound to one node.
///
/// Slots are positional; `None` marks an absent optional operand. Composite
/// operators implement the same contract, so callers cannot tell the two
/// apart and composites nest.
pub trait Operator: Debug {
    /// Registry name (e.g. "FCL").
    fn name(&self) -> &str;

    /// Allocates per-instance state.
    fn init(&mut self, _cx: &mut Context<'_>) -> Result<()> {
        Ok(())
    }

    /// Validates operand ranks, dtypes and presence.
    fn check(
        &self,
        cx: &Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()>;

    /// Resolves output shapes. Composites may fill empty input slots with
    /// synthesized tensors.
    fn setup(
        &mut self,
        cx: &mut Context<'_>,
        inputs: &mut [Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()>;

    fn compute(
        &mut self,
        cx: &mut Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()>;

    fn optimize(
        &mut self,
        _cx: &mut Context<'_>,
        _inputs: &[Option<TensorId>],
        _outputs: &[Option<TensorId>],
        _direction: Direction,
    ) -> Result<()> {
        Ok(())
    }

    /// Releases per-instance state. Must be safe to call repeatedly.
    fn deinit(&mut self, _cx: &mut Context<'_>) -> Result<()> {
        Ok(())
    }

    /// Counts of the expansion workspace, for composites that hold one.
    fn workspace_stats(&self) -> Option<WorkspaceStats> {
        None
    }

    /// Appends a description of internal structure to `out`, one line per
    /// internal node, indented by `depth`.
    fn describe(&self, _tensors: &TensorTable, _depth: usize, _out: &mut String) {}
}

/// Fetches a required slot.
pub fn required(
    op: &str,
    what: &'static str,
    slots: &[Option<TensorId>],
    index: usize,
) -> Result<TensorId> {
    slots
        .get(index)
        .copied()
        .flatten()
        .ok_or_else(|| crate::Error::MissingOperand {
            op: op.to_owned(),
            what,
            index,
        })
}

/// Fails unless `slots` has exactly `expected` entries.
pub fn expect_arity(
    op: &str,
    what: &'static str,
    slots: &[Option<TensorId>],
    expected: usize,
) -> Result<()> {
    if slots.len() != expected {
        return Err(crate::Error::Arity {
            op: op.to_owned(),
            what,
            expected,
            found: slots.len(),
        });
    }
    Ok(())
}
