//! Split and concat along one axis.

use ovx_ir::{Context, Error, Operator, Result, TensorId, format_shape, required};

use crate::util::{expect_shape, resolve_output, split_around};

/// Splits a tensor into `outputs.len()` pieces along `axis`.
///
/// With empty `slices` the axis is divided evenly.
#[derive(Debug)]
pub struct Split {
    axis: usize,
    slices: Vec<usize>,
}

impl Split {
    pub fn new(axis: usize, slices: Vec<usize>) -> Self {
        Self { axis, slices }
    }

    fn slice_lengths(&self, input: &[usize], pieces: usize) -> Result<Vec<usize>> {
        let invalid = |detail: String| Error::InvalidParam {
            op: "SPLIT".into(),
            detail,
        };
        let Some(&extent) = input.get(self.axis) else {
            return Err(invalid(format!(
                "axis {} out of range for {}",
                self.axis,
                format_shape(Some(input))
            )));
        };
        if pieces == 0 {
            return Err(invalid("no outputs".into()));
        }
        if self.slices.is_empty() {
            if extent % pieces != 0 {
                return Err(invalid(format!("{extent} is not divisible into {pieces} slices")));
            }
            return Ok(vec![extent / pieces; pieces]);
        }
        if self.slices.len() != pieces || self.slices.iter().sum::<usize>() != extent {
            return Err(invalid(format!(
                "slices {:?} do not cover extent {extent} with {pieces} outputs",
                self.slices
            )));
        }
        Ok(self.slices.clone())
    }

    fn output_shapes(&self, cx: &Context<'_>, inputs: &[Option<TensorId>], pieces: usize) -> Result<Vec<Vec<usize>>> {
        let input = cx.tensors.shape(required("SPLIT", "input", inputs, 0)?)?;
        let lengths = self.slice_lengths(input, pieces)?;
        Ok(lengths
            .into_iter()
            .map(|len| {
                let mut shape = input.to_vec();
                shape[self.axis] = len;
                shape
            })
            .collect())
    }
}

impl Operator for Split {
    fn name(&self) -> &str {
        "SPLIT"
    }

    fn check(
        &self,
        cx: &Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let shapes = self.output_shapes(cx, inputs, outputs.len())?;
        for (i, shape) in shapes.iter().enumerate() {
            expect_shape(cx, "SPLIT", required("SPLIT", "output", outputs, i)?, shape)?;
        }
        Ok(())
    }

    fn setup(
        &mut self,
        cx: &mut Context<'_>,
        inputs: &mut [Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let shapes = self.output_shapes(cx, inputs, outputs.len())?;
        for (i, shape) in shapes.iter().enumerate() {
            resolve_output(cx, "SPLIT", required("SPLIT", "output", outputs, i)?, shape)?;
        }
        Ok(())
    }

    fn compute(
        &mut self,
        cx: &mut Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let input_id = required("SPLIT", "input", inputs, 0)?;
        let shape = cx.tensors.shape(input_id)?.to_vec();
        let lengths = self.slice_lengths(&shape, outputs.len())?;
        let (inner, outer) = split_around(&shape, self.axis);
        let x = cx.tensors.data(input_id)?;

        let row = shape[self.axis] * inner;
        let mut pieces = Vec::with_capacity(lengths.len());
        let mut offset = 0;
        for &len in &lengths {
            let chunk = len * inner;
            let mut piece = Vec::with_capacity(chunk * outer);
            for o in 0..outer {
                let start = o * row + offset;
                piece.extend_from_slice(&x[start..start + chunk]);
            }
            pieces.push(piece);
            offset += chunk;
        }
        for (i, piece) in pieces.into_iter().enumerate() {
            cx.tensors
                .write(required("SPLIT", "output", outputs, i)?, piece)?;
        }
        Ok(())
    }
}

/// Concatenates all inputs along `axis`.
#[derive(Debug)]
pub struct Concat {
    axis: usize,
}

impl Concat {
    pub fn new(axis: usize) -> Self {
        Self { axis }
    }

    fn output_shape(&self, cx: &Context<'_>, inputs: &[Option<TensorId>]) -> Result<Vec<usize>> {
        let first = cx.tensors.shape(required("CONCAT", "input", inputs, 0)?)?;
        if self.axis >= first.len() {
            return Err(Error::InvalidParam {
                op: "CONCAT".into(),
                detail: format!("axis {} out of range for {}", self.axis, format_shape(Some(first))),
            });
        }
        let mut shape = first.to_vec();
        shape[self.axis] = 0;
        for i in 0..inputs.len() {
            let s = cx.tensors.shape(required("CONCAT", "input", inputs, i)?)?;
            let compatible = s.len() == shape.len()
                && s.iter()
                    .zip(&shape)
                    .enumerate()
                    .all(|(d, (a, b))| d == self.axis || a == b);
            if !compatible {
                return Err(Error::ShapeMismatch {
                    op: "CONCAT".into(),
                    detail: format!(
                        "input {i} {} does not line up with {}",
                        format_shape(Some(s)),
                        format_shape(Some(first))
                    ),
                });
            }
            shape[self.axis] += s[self.axis];
        }
        Ok(shape)
    }
}

impl Operator for Concat {
    fn name(&self) -> &str {
        "CONCAT"
    }

    fn check(
        &self,
        cx: &Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let shape = self.output_shape(cx, inputs)?;
        expect_shape(cx, "CONCAT", required("CONCAT", "output", outputs, 0)?, &shape)
    }

    fn setup(
        &mut self,
        cx: &mut Context<'_>,
        inputs: &mut [Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let shape = self.output_shape(cx, inputs)?;
        resolve_output(cx, "CONCAT", required("CONCAT", "output", outputs, 0)?, &shape)
    }

    fn compute(
        &mut self,
        cx: &mut Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let output_id = required("CONCAT", "output", outputs, 0)?;
        let out_shape = cx.tensors.shape(output_id)?.to_vec();
        let (inner, outer) = split_around(&out_shape, self.axis);

        let mut out = Vec::with_capacity(out_shape.iter().product());
        for o in 0..outer {
            for i in 0..inputs.len() {
                let id = required("CONCAT", "input", inputs, i)?;
                let chunk = cx.tensors.shape(id)?[self.axis] * inner;
                out.extend_from_slice(&cx.tensors.data(id)?[o * chunk..(o + 1) * chunk]);
            }
        }
        cx.tensors.write(output_id, out)
    }
}
