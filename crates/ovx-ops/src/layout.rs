//! Layout operators: permute and reshape.

use ovx_ir::{
    Context, Direction, Error, Operator, Result, TensorId, expect_arity, format_shape, required,
};

use crate::util::{expect_shape, resolve_output, strides};

/// Reorders dimensions: output dimension `i` is input dimension `perm[i]`.
#[derive(Debug)]
pub struct Permute {
    perm: Vec<usize>,
}

impl Permute {
    pub fn new(perm: Vec<usize>) -> Self {
        Self { perm }
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        let mut seen = vec![false; input.len()];
        let valid = self.perm.len() == input.len()
            && self
                .perm
                .iter()
                .all(|&p| p < input.len() && !std::mem::replace(&mut seen[p], true));
        if !valid {
            return Err(Error::InvalidParam {
                op: "PERMUTE".into(),
                detail: format!(
                    "{:?} is not a permutation of a rank-{} tensor",
                    self.perm,
                    input.len()
                ),
            });
        }
        Ok(self.perm.iter().map(|&p| input[p]).collect())
    }
}

impl Operator for Permute {
    fn name(&self) -> &str {
        "PERMUTE"
    }

    fn check(
        &self,
        cx: &Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        expect_arity("PERMUTE", "input", inputs, 1)?;
        expect_arity("PERMUTE", "output", outputs, 1)?;
        let input = cx.tensors.shape(required("PERMUTE", "input", inputs, 0)?)?;
        let shape = self.output_shape(input)?;
        expect_shape(cx, "PERMUTE", required("PERMUTE", "output", outputs, 0)?, &shape)
    }

    fn setup(
        &mut self,
        cx: &mut Context<'_>,
        inputs: &mut [Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let input = cx.tensors.shape(required("PERMUTE", "input", inputs, 0)?)?;
        let shape = self.output_shape(input)?;
        resolve_output(cx, "PERMUTE", required("PERMUTE", "output", outputs, 0)?, &shape)
    }

    fn compute(
        &mut self,
        cx: &mut Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let input_id = required("PERMUTE", "input", inputs, 0)?;
        let output_id = required("PERMUTE", "output", outputs, 0)?;
        let in_strides = strides(cx.tensors.shape(input_id)?);
        let out_shape = cx.tensors.shape(output_id)?.to_vec();
        let x = cx.tensors.data(input_id)?;

        let mut out = Vec::with_capacity(x.len());
        for flat in 0..x.len() {
            let mut rem = flat;
            let mut src = 0;
            for (d, &extent) in out_shape.iter().enumerate() {
                src += (rem % extent) * in_strides[self.perm[d]];
                rem /= extent;
            }
            out.push(x[src]);
        }
        cx.tensors.write(output_id, out)
    }
}

/// Changes the shape of a tensor without reordering its elements.
///
/// A backward optimize pass turns a still-declared virtual output into a
/// view of the input, so compute moves no data.
#[derive(Debug)]
pub struct Reshape {
    size: Vec<isize>,
}

impl Reshape {
    pub fn new(size: Vec<isize>) -> Self {
        Self { size }
    }

    /// Resolves the target shape against `count` elements.
    pub fn resolve(size: &[isize], count: usize) -> Result<Vec<usize>> {
        let invalid = |detail: String| Error::InvalidParam {
            op: "RESHAPE2".into(),
            detail,
        };
        let mut inferred = None;
        let mut known = 1usize;
        for (i, &d) in size.iter().enumerate() {
            match d {
                -1 if inferred.is_none() => inferred = Some(i),
                -1 => return Err(invalid(format!("more than one -1 in {size:?}"))),
                d if d > 0 => known *= d as usize,
                _ => return Err(invalid(format!("dimension {d} in {size:?}"))),
            }
        }
        let mut shape: Vec<usize> = size.iter().map(|&d| d.max(1) as usize).collect();
        if let Some(i) = inferred {
            if known == 0 || count % known != 0 {
                return Err(invalid(format!("{count} elements cannot fill {size:?}")));
            }
            shape[i] = count / known;
        } else if known != count {
            return Err(invalid(format!("{count} elements cannot fill {size:?}")));
        }
        Ok(shape)
    }

    fn output_shape(&self, cx: &Context<'_>, inputs: &[Option<TensorId>]) -> Result<Vec<usize>> {
        let input = cx.tensors.attr(required("RESHAPE2", "input", inputs, 0)?)?;
        let count = input
            .element_count()
            .ok_or_else(|| Error::ShapeMismatch {
                op: "RESHAPE2".into(),
                detail: format!("input shape is {}", format_shape(None)),
            })?;
        Self::resolve(&self.size, count)
    }
}

impl Operator for Reshape {
    fn name(&self) -> &str {
        "RESHAPE2"
    }

    fn check(
        &self,
        cx: &Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        expect_arity("RESHAPE2", "input", inputs, 1)?;
        expect_arity("RESHAPE2", "output", outputs, 1)?;
        let shape = self.output_shape(cx, inputs)?;
        expect_shape(cx, "RESHAPE2", required("RESHAPE2", "output", outputs, 0)?, &shape)
    }

    fn setup(
        &mut self,
        cx: &mut Context<'_>,
        inputs: &mut [Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let shape = self.output_shape(cx, inputs)?;
        resolve_output(cx, "RESHAPE2", required("RESHAPE2", "output", outputs, 0)?, &shape)
    }

    fn compute(
        &mut self,
        cx: &mut Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let input = required("RESHAPE2", "input", inputs, 0)?;
        let output = required("RESHAPE2", "output", outputs, 0)?;
        if cx.tensors.same_storage(input, output)? {
            return Ok(());
        }
        let data = cx.tensors.data(input)?.to_vec();
        cx.tensors.write(output, data)
    }

    fn optimize(
        &mut self,
        cx: &mut Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
        direction: Direction,
    ) -> Result<()> {
        if direction != Direction::Backward {
            return Ok(());
        }
        let input = required("RESHAPE2", "input", inputs, 0)?;
        let output = required("RESHAPE2", "output", outputs, 0)?;
        if cx.tensors.attr(output)?.is_virtual && cx.tensors.alias(output, input)? {
            log::debug!("reshape output {output} now views {input}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use ovx_ir::{DType, TensorAttr};

    #[test]
    fn transpose_last_two_axes() {
        let mut h = Harness::new();
        // [feat=2, batch=3, time=1] -> [2, 1, 3] and back.
        let x = h.constant(&[2, 3, 1], vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let y = h.auto();
        h.run(&mut Permute::new(vec![0, 2, 1]), &[Some(x)], &[Some(y)])
            .unwrap();
        assert_eq!(h.shape(y), vec![2, 1, 3]);
        assert_eq!(h.data(y), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn permute_moves_elements() {
        let mut h = Harness::new();
        let x = h.constant(&[2, 3], vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let y = h.auto();
        h.run(&mut Permute::new(vec![1, 0]), &[Some(x)], &[Some(y)])
            .unwrap();
        assert_eq!(h.shape(y), vec![3, 2]);
        assert_eq!(h.data(y), vec![0.0, 2.0, 4.0, 1.0, 3.0, 5.0]);
    }

    #[test]
    fn invalid_permutation() {
        let mut h = Harness::new();
        let x = h.constant(&[2, 3], vec![0.0; 6]);
        let y = h.auto();
        assert!(matches!(
            h.run(&mut Permute::new(vec![0, 0]), &[Some(x)], &[Some(y)]),
            Err(Error::InvalidParam { .. })
        ));
    }

    #[test]
    fn reshape_infers_one_axis() {
        assert_eq!(Reshape::resolve(&[-1, 2], 8).unwrap(), vec![4, 2]);
        assert_eq!(Reshape::resolve(&[4, 2, 1], 8).unwrap(), vec![4, 2, 1]);
        assert!(Reshape::resolve(&[-1, -1], 8).is_err());
        assert!(Reshape::resolve(&[-1, 3], 8).is_err());
        assert!(Reshape::resolve(&[0, 8], 8).is_err());
    }

    #[test]
    fn reshape_copies_without_optimize() {
        let mut h = Harness::new();
        let x = h.constant(&[4, 2, 1], (0..8).map(|v| v as f32).collect());
        let y = h.auto();
        h.run(&mut Reshape::new(vec![-1, 2]), &[Some(x)], &[Some(y)])
            .unwrap();
        assert_eq!(h.shape(y), vec![4, 2]);
        assert_eq!(h.data(y), (0..8).map(|v| v as f32).collect::<Vec<_>>());
    }

    #[test]
    fn backward_optimize_aliases_virtual_output() {
        let mut h = Harness::new();
        let x = h.constant(&[6], vec![1.0; 6]);
        let y = h.tensors.create(TensorAttr::internal(&DType::F32, true));
        let mut op = Reshape::new(vec![3, 2]);
        let mut inputs = vec![Some(x)];
        let outputs = [Some(y)];
        let mut cx = h.cx();
        op.setup(&mut cx, &mut inputs, &outputs).unwrap();
        op.optimize(&mut cx, &inputs, &outputs, Direction::Forward)
            .unwrap();
        assert!(!cx.tensors.is_materialized(y).unwrap());
        op.optimize(&mut cx, &inputs, &outputs, Direction::Backward)
            .unwrap();
        assert!(cx.tensors.same_storage(x, y).unwrap());
        op.compute(&mut cx, &inputs, &outputs).unwrap();
        assert_eq!(cx.tensors.shape(y).unwrap(), &[3, 2]);
        assert_eq!(cx.tensors.data(y).unwrap(), &[1.0; 6]);
    }

    #[test]
    fn non_virtual_output_is_never_aliased() {
        let mut h = Harness::new();
        let x = h.constant(&[6], vec![1.0; 6]);
        let y = h.auto();
        let mut op = Reshape::new(vec![3, 2]);
        let mut inputs = vec![Some(x)];
        let outputs = [Some(y)];
        let mut cx = h.cx();
        op.setup(&mut cx, &mut inputs, &outputs).unwrap();
        op.optimize(&mut cx, &inputs, &outputs, Direction::Backward)
            .unwrap();
        assert!(!cx.tensors.same_storage(x, y).unwrap());
    }
}
