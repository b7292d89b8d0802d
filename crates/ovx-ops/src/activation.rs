//! Elementwise activations and the data-convert copy.

use ovx_ir::{ActivationKind, Context, Operator, Result, TensorId, expect_arity, required};

use crate::util::{expect_shape, resolve_output};

/// Applies an activation function elementwise.
#[derive(Debug)]
pub struct Activation {
    kind: ActivationKind,
}

impl Activation {
    pub fn new(kind: ActivationKind) -> Self {
        Self { kind }
    }
}

/// Copies its input into an output of the same shape, converting dtype.
///
/// Only the dtype metadata changes; values are carried as f32.
#[derive(Debug, Default)]
pub struct DataConvert;

fn unary_check(
    name: &str,
    cx: &Context<'_>,
    inputs: &[Option<TensorId>],
    outputs: &[Option<TensorId>],
) -> Result<()> {
    expect_arity(name, "input", inputs, 1)?;
    expect_arity(name, "output", outputs, 1)?;
    let shape = cx.tensors.shape(required(name, "input", inputs, 0)?)?.to_vec();
    expect_shape(cx, name, required(name, "output", outputs, 0)?, &shape)
}

fn unary_setup(
    name: &str,
    cx: &mut Context<'_>,
    inputs: &[Option<TensorId>],
    outputs: &[Option<TensorId>],
) -> Result<()> {
    let shape = cx.tensors.shape(required(name, "input", inputs, 0)?)?.to_vec();
    resolve_output(cx, name, required(name, "output", outputs, 0)?, &shape)
}

fn unary_compute(
    name: &str,
    cx: &mut Context<'_>,
    inputs: &[Option<TensorId>],
    outputs: &[Option<TensorId>],
    f: impl Fn(f32) -> f32,
) -> Result<()> {
    let out = required(name, "output", outputs, 0)?;
    let data: Vec<f32> = cx
        .tensors
        .data(required(name, "input", inputs, 0)?)?
        .iter()
        .map(|&x| f(x))
        .collect();
    cx.tensors.write(out, data)
}

impl Operator for Activation {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn check(
        &self,
        cx: &Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        unary_check(self.kind.name(), cx, inputs, outputs)
    }

    fn setup(
        &mut self,
        cx: &mut Context<'_>,
        inputs: &mut [Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        unary_setup(self.kind.name(), cx, inputs, outputs)
    }

    fn compute(
        &mut self,
        cx: &mut Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let kind = self.kind;
        unary_compute(kind.name(), cx, inputs, outputs, |x| kind.apply(x))
    }
}

impl Operator for DataConvert {
    fn name(&self) -> &str {
        "DATACONVERT"
    }

    fn check(
        &self,
        cx: &Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        unary_check("DATACONVERT", cx, inputs, outputs)
    }

    fn setup(
        &mut self,
        cx: &mut Context<'_>,
        inputs: &mut [Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        unary_setup("DATACONVERT", cx, inputs, outputs)
    }

    fn compute(
        &mut self,
        cx: &mut Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        unary_compute("DATACONVERT", cx, inputs, outputs, |x| x)
    }
}
