//! Primitive operators for the ovx decomposition engine.
//!
//! These are reference kernels: naive f32 loops that honour each
//! primitive's arity, shape inference and checks. Quantization is carried as
//! tensor metadata only.

mod activation;
mod conv2d;
mod eltwise;
mod fc;
mod layout;
mod split;
#[cfg(test)]
mod testing;
pub mod util;

pub use activation::{Activation, DataConvert};
pub use conv2d::Conv2d;
pub use eltwise::{BinaryOp, Eltwise};
pub use fc::FullyConnected;
pub use layout::{Permute, Reshape};
pub use split::{Concat, Split};

use ovx_ir::{ActivationKind, Error, OpKind, OpRegistry, Operator, Result};

/// Builds the primitive operator for `kind`.
pub fn create_primitive(kind: &OpKind) -> Result<Box<dyn Operator>> {
    let op: Box<dyn Operator> = match kind {
        OpKind::FullyConnected { axis, weights } => Box::new(FullyConnected::new(*axis, *weights)),
        OpKind::Conv2d(params) => Box::new(Conv2d::new(params.clone())),
        OpKind::Add => Box::new(Eltwise::new(BinaryOp::Add)),
        OpKind::Subtract => Box::new(Eltwise::new(BinaryOp::Subtract)),
        OpKind::Multiply => Box::new(Eltwise::new(BinaryOp::Multiply)),
        OpKind::Activation(act) => Box::new(Activation::new(*act)),
        OpKind::Permute { perm } => Box::new(Permute::new(perm.clone())),
        OpKind::Reshape { size } => Box::new(Reshape::new(size.clone())),
        OpKind::Split { axis, slices } => Box::new(Split::new(*axis, slices.clone())),
        OpKind::Concat { axis } => Box::new(Concat::new(*axis)),
        OpKind::DataConvert => Box::new(DataConvert),
        other => return Err(Error::UnknownOp(other.name().to_owned())),
    };
    Ok(op)
}

/// Registers every primitive operator with `registry`.
pub fn register_primitives(registry: &mut OpRegistry) {
    let activations = [
        ActivationKind::None,
        ActivationKind::Relu,
        ActivationKind::Relu6,
        ActivationKind::Tanh,
        ActivationKind::Sigmoid,
        ActivationKind::HardSigmoid,
    ];
    let names = [
        "FCL",
        "CONV2D",
        "ADD",
        "SUBTRACT",
        "MULTIPLY",
        "PERMUTE",
        "RESHAPE2",
        "SPLIT",
        "CONCAT",
        "DATACONVERT",
    ]
    .into_iter()
    .chain(activations.iter().map(|a| a.name()));
    for name in names {
        registry.register(name, create_primitive);
    }
}
