//! Fully-connected layer.
//!
//! Input `[in, batch...]`, weight `[in, out]`, optional bias `[out]`,
//! output `[out, batch...]`.

use ovx_ir::{
    Context, Error, Operator, Result, TensorId, expect_arity, format_shape, required,
};

use crate::util::{expect_shape, resolve_output};

const NAME: &str = "FCL";

#[derive(Debug)]
pub struct FullyConnected {
    axis: usize,
    weights: usize,
}

impl FullyConnected {
    pub fn new(axis: usize, weights: usize) -> Self {
        Self { axis, weights }
    }

    fn output_shape(&self, input: &[usize]) -> Vec<usize> {
        let mut shape = input.to_vec();
        shape[0] = self.weights;
        shape
    }
}

/// Shape of the input operand, which must have at least one dimension.
fn input_shape<'t>(cx: &'t Context<'_>, inputs: &[Option<TensorId>]) -> Result<&'t [usize]> {
    let input = cx.tensors.shape(required(NAME, "input", inputs, 0)?)?;
    if input.is_empty() {
        return Err(Error::ShapeMismatch {
            op: NAME.into(),
            detail: "input must have at least one dimension".into(),
        });
    }
    Ok(input)
}

impl Operator for FullyConnected {
    fn name(&self) -> &str {
        NAME
    }

    fn check(
        &self,
        cx: &Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        expect_arity(NAME, "input", inputs, 3)?;
        expect_arity(NAME, "output", outputs, 1)?;
        if self.axis != 0 {
            return Err(Error::InvalidParam {
                op: NAME.into(),
                detail: format!("only axis 0 is supported, got {}", self.axis),
            });
        }
        let input = input_shape(cx, inputs)?;
        let weight = cx.tensors.shape(required(NAME, "input", inputs, 1)?)?;
        if weight.len() != 2 || weight[0] != input[0] || weight[1] != self.weights {
            return Err(Error::CheckFailed {
                op: NAME.into(),
                detail: format!(
                    "weight {} does not map {} inputs to {} units",
                    format_shape(Some(weight)),
                    input[0],
                    self.weights
                ),
            });
        }
        if let Some(bias) = inputs[2] {
            let bias = cx.tensors.shape(bias)?;
            if bias.iter().product::<usize>() != self.weights {
                return Err(Error::CheckFailed {
                    op: NAME.into(),
                    detail: format!("bias {} for {} units", format_shape(Some(bias)), self.weights),
                });
            }
        }
        let expected = self.output_shape(input);
        expect_shape(cx, NAME, required(NAME, "output", outputs, 0)?, &expected)
    }

    fn setup(
        &mut self,
        cx: &mut Context<'_>,
        inputs: &mut [Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let shape = self.output_shape(input_shape(cx, inputs)?);
        resolve_output(cx, NAME, required(NAME, "output", outputs, 0)?, &shape)
    }

    fn compute(
        &mut self,
        cx: &mut Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let in_len = input_shape(cx, inputs)?[0].max(1);
        let x = cx.tensors.data(required(NAME, "input", inputs, 0)?)?;
        let w = cx.tensors.data(required(NAME, "input", inputs, 1)?)?;
        let bias = match inputs.get(2).copied().flatten() {
            Some(b) => Some(cx.tensors.data(b)?),
            None => None,
        };

        let units = self.weights;
        let batch = x.len() / in_len;
        let mut out = vec![0.0f32; units * batch];
        for b in 0..batch {
            let row = &x[b * in_len..(b + 1) * in_len];
            for o in 0..units {
                let col = &w[o * in_len..(o + 1) * in_len];
                let mut acc = 0.0f32;
                for (xi, wi) in row.iter().zip(col) {
                    acc += xi * wi;
                }
                out[b * units + o] = acc + bias.map_or(0.0, |b| b[o]);
            }
        }
        cx.tensors.write(required(NAME, "output", outputs, 0)?, out)
    }
}
