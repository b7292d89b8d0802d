//! Composite operators: the [`Operator`] contract realized by expansion.

use std::fmt::Debug;

use ovx_ir::{
    Context, Direction, Error, Operator, Result, TensorId, TensorTable, WorkspaceStats,
};

use crate::helpers::Expander;
use crate::workspace::{Workspace, deinit_workspace, init_workspace};

/// How a composite decomposes into internal nodes.
pub trait Expansion: Debug {
    /// Registry name of the composite.
    fn name(&self) -> &str;

    /// Validates operand presence and ranks before expansion.
    fn check(
        &self,
        cx: &Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()>;

    /// Resolves the declared outputs and builds the internal nodes.
    ///
    /// Absent optional inputs may be synthesized and written back into
    /// `inputs`.
    fn expand(
        &self,
        ex: &mut Expander<'_, '_>,
        inputs: &mut [Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()>;
}

/// Lifecycle of a composite instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InstanceState {
    #[default]
    Uninitialized,
    /// Initialized, no workspace yet.
    Ready,
    Expanded,
    /// Setup failed part way; the workspace holds what was built.
    ExpandedPartial,
}

/// An [`Expansion`] driven through the [`Operator`] contract.
#[derive(Debug)]
pub struct Composite<E> {
    expansion: E,
    workspace: Option<Workspace>,
    state: InstanceState,
}

impl<E: Expansion> Composite<E> {
    pub fn new(expansion: E) -> Self {
        Self {
            expansion,
            workspace: None,
            state: InstanceState::Uninitialized,
        }
    }

    pub fn expansion(&self) -> &E {
        &self.expansion
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn workspace(&self) -> Option<&Workspace> {
        self.workspace.as_ref()
    }

    fn expanded(&mut self) -> Result<&mut Workspace> {
        self.workspace
            .as_mut()
            .ok_or_else(|| Error::NoWorkspace(self.expansion.name().to_owned()))
    }
}

impl<E: Expansion> Operator for Composite<E> {
    fn name(&self) -> &str {
        self.expansion.name()
    }

    fn init(&mut self, _cx: &mut Context<'_>) -> Result<()> {
        self.state = InstanceState::Ready;
        Ok(())
    }

    fn check(
        &self,
        cx: &Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        self.expansion.check(cx, inputs, outputs)
    }

    fn setup(
        &mut self,
        cx: &mut Context<'_>,
        inputs: &mut [Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        // Inputs synthesized by the previous expansion die with its workspace.
        if let Some(ws) = &self.workspace {
            for slot in inputs.iter_mut() {
                if slot.is_some_and(|id| ws.owns(id)) {
                    *slot = None;
                }
            }
        }
        self.expansion.check(cx, inputs, outputs)?;

        let ws = init_workspace(&mut self.workspace, cx)?;
        let mut ex = Expander::new(ws, cx);
        match self.expansion.expand(&mut ex, inputs, outputs) {
            Ok(()) => {
                self.state = InstanceState::Expanded;
                Ok(())
            }
            Err(e) => {
                log::error!(
                    "uid[{}] {} expansion failed: {e}",
                    cx.uid,
                    self.expansion.name()
                );
                self.state = InstanceState::ExpandedPartial;
                Err(e)
            }
        }
    }

    fn compute(
        &mut self,
        cx: &mut Context<'_>,
        _inputs: &[Option<TensorId>],
        _outputs: &[Option<TensorId>],
    ) -> Result<()> {
        self.expanded()?.compute(cx)
    }

    fn optimize(
        &mut self,
        cx: &mut Context<'_>,
        _inputs: &[Option<TensorId>],
        _outputs: &[Option<TensorId>],
        direction: Direction,
    ) -> Result<()> {
        self.expanded()?.optimize(cx, direction)
    }

    fn deinit(&mut self, cx: &mut Context<'_>) -> Result<()> {
        let result = deinit_workspace(&mut self.workspace, cx);
        self.state = InstanceState::Uninitialized;
        result
    }

    fn workspace_stats(&self) -> Option<WorkspaceStats> {
        self.workspace.as_ref().map(Workspace::stats)
    }

    fn describe(&self, tensors: &TensorTable, depth: usize, out: &mut String) {
        if let Some(ws) = &self.workspace {
            ws.describe(tensors, depth, out);
        }
    }
}
