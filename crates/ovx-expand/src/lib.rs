//! Composite operator expansion for ovx.
//!
//! A composite operator (a recurrent cell or a sequence RNN) is lowered
//! at setup into a private sub-graph of primitive nodes held in a
//! [`Workspace`]. The [`Composite`] wrapper drives the sub-graph through the
//! same [`Operator`](ovx_ir::Operator) contract primitives implement, so
//! composites nest: a sequence RNN expands into cell nodes which expand
//! again.
//!
//! Fragments shared by every expansion (FC on either path, timestep split
//! and concat, layout changes, zero-bias synthesis) are methods of
//! [`Expander`].

mod bias;
mod cell;
mod composite;
mod gru_cell;
mod helpers;
mod lstm_cell;
pub mod policy;
mod rnn_cell;
mod sequence;
#[cfg(test)]
mod testing;
mod workspace;

pub use bias::zero_bias_attr;
pub use composite::{Composite, Expansion, InstanceState};
pub use gru_cell::GruCell;
pub use helpers::Expander;
pub use lstm_cell::LstmCell;
pub use policy::{CellRoutes, FcPath, FcRouting, find_best_kernel_size, fits_convolution, route_cell};
pub use rnn_cell::RnnCell;
pub use sequence::SequenceRnn;
pub use workspace::{InternalNode, Workspace, deinit_workspace, dump_workspace, init_workspace};

use ovx_ir::{Error, OpKind, OpRegistry, Operator, Result};

/// Builds the composite operator for `kind`.
pub fn create_composite(kind: &OpKind) -> Result<Box<dyn Operator>> {
    let op: Box<dyn Operator> = match kind {
        OpKind::RnnCell(p) => Box::new(Composite::new(RnnCell::new(p.clone()))),
        OpKind::GruCell(p) => Box::new(Composite::new(GruCell::new(p.clone()))),
        OpKind::LstmCell(p) => Box::new(Composite::new(LstmCell::new(p.clone()))),
        OpKind::SequenceRnn(p) => Box::new(Composite::new(SequenceRnn::new(p.clone()))),
        other => return Err(Error::UnknownOp(other.name().to_owned())),
    };
    Ok(op)
}

/// Registers every composite operator with `registry`.
pub fn register_composites(registry: &mut OpRegistry) {
    let names = [
        "RNNCELL_OVXLIB",
        "GRUCELL_OVXLIB",
        "LSTMUNIT_OVXLIB",
        "UNIDIRECTIONAL_SEQUENCE_RNN",
    ];
    for name in names {
        registry.register(name, create_composite);
    }
}

/// A registry with every primitive and composite operator.
pub fn builtin_registry() -> OpRegistry {
    let mut registry = OpRegistry::new();
    ovx_ops::register_primitives(&mut registry);
    register_composites(&mut registry);
    registry
}
