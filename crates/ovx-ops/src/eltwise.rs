//! Binary elementwise operators with broadcasting.

use ovx_ir::{Context, Error, Operator, Result, TensorId, expect_arity, format_shape, required};

use crate::util::{broadcast_index, broadcast_shape, expect_shape, resolve_output, strides};

/// The arithmetic applied by an [`Eltwise`] node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
}

impl BinaryOp {
    fn name(self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Subtract => "SUBTRACT",
            Self::Multiply => "MULTIPLY",
        }
    }

    fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            Self::Add => a + b,
            Self::Subtract => a - b,
            Self::Multiply => a * b,
        }
    }
}

#[derive(Debug)]
pub struct Eltwise {
    op: BinaryOp,
}

impl Eltwise {
    pub fn new(op: BinaryOp) -> Self {
        Self { op }
    }

    fn output_shape(&self, cx: &Context<'_>, inputs: &[Option<TensorId>]) -> Result<Vec<usize>> {
        let name = self.op.name();
        let a = cx.tensors.shape(required(name, "input", inputs, 0)?)?;
        let b = cx.tensors.shape(required(name, "input", inputs, 1)?)?;
        broadcast_shape(a, b).ok_or_else(|| Error::ShapeMismatch {
            op: name.into(),
            detail: format!(
                "{} and {} do not broadcast",
                format_shape(Some(a)),
                format_shape(Some(b))
            ),
        })
    }
}

impl Operator for Eltwise {
    fn name(&self) -> &str {
        self.op.name()
    }

    fn check(
        &self,
        cx: &Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let name = self.op.name();
        expect_arity(name, "input", inputs, 2)?;
        expect_arity(name, "output", outputs, 1)?;
        let shape = self.output_shape(cx, inputs)?;
        expect_shape(cx, name, required(name, "output", outputs, 0)?, &shape)
    }

    fn setup(
        &mut self,
        cx: &mut Context<'_>,
        inputs: &mut [Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let name = self.op.name();
        let shape = self.output_shape(cx, inputs)?;
        resolve_output(cx, name, required(name, "output", outputs, 0)?, &shape)
    }

    fn compute(
        &mut self,
        cx: &mut Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let name = self.op.name();
        let a_id = required(name, "input", inputs, 0)?;
        let b_id = required(name, "input", inputs, 1)?;
        let out_id = required(name, "output", outputs, 0)?;
        let out_shape = cx.tensors.shape(out_id)?.to_vec();
        let a_shape = cx.tensors.shape(a_id)?;
        let b_shape = cx.tensors.shape(b_id)?;
        let (a_strides, b_strides) = (strides(a_shape), strides(b_shape));
        let a = cx.tensors.data(a_id)?;
        let b = cx.tensors.data(b_id)?;

        let out: Vec<f32> = (0..out_shape.iter().product())
            .map(|i| {
                let x = a[broadcast_index(i, &out_shape, a_shape, &a_strides)];
                let y = b[broadcast_index(i, &out_shape, b_shape, &b_strides)];
                self.op.apply(x, y)
            })
            .collect();
        cx.tensors.write(out_id, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;

    #[test]
    fn same_shape() {
        let mut h = Harness::new();
        let a = h.constant(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]);
        let b = h.constant(&[2, 2], vec![4.0, 3.0, 2.0, 1.0]);
        let y = h.auto();
        h.run(&mut Eltwise::new(BinaryOp::Subtract), &[Some(a), Some(b)], &[Some(y)])
            .unwrap();
        assert_eq!(h.data(y), vec![-3.0, -1.0, 1.0, 3.0]);
    }

    #[test]
    fn scalar_broadcast() {
        let mut h = Harness::new();
        let one = h.constant(&[1], vec![1.0]);
        let z = h.constant(&[3, 2], vec![0.0, 0.25, 0.5, 0.75, 1.0, 0.0]);
        let y = h.auto();
        h.run(&mut Eltwise::new(BinaryOp::Subtract), &[Some(one), Some(z)], &[Some(y)])
            .unwrap();
        assert_eq!(h.shape(y), vec![3, 2]);
        assert_eq!(h.data(y), vec![1.0, 0.75, 0.5, 0.25, 0.0, 1.0]);
    }

    #[test]
    fn row_broadcast_multiply() {
        let mut h = Harness::new();
        let a = h.constant(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]);
        let b = h.constant(&[2], vec![10.0, 100.0]);
        let y = h.auto();
        h.run(&mut Eltwise::new(BinaryOp::Multiply), &[Some(a), Some(b)], &[Some(y)])
            .unwrap();
        assert_eq!(h.data(y), vec![10.0, 200.0, 30.0, 400.0]);
    }

    #[test]
    fn incompatible_shapes() {
        let mut h = Harness::new();
        let a = h.constant(&[2], vec![0.0; 2]);
        let b = h.constant(&[3], vec![0.0; 3]);
        let y = h.auto();
        assert!(matches!(
            h.run(&mut Eltwise::new(BinaryOp::Add), &[Some(a), Some(b)], &[Some(y)]),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
