//! 2-D convolution over `[W, H, C, N]` inputs with `[kw, kh, C, out]`
//! weights.

use ovx_ir::{
    Context, Conv2dParams, Error, Operator, Result, TensorId, expect_arity, format_shape, required,
};

use crate::util::{expect_shape, resolve_output, strides};

const NAME: &str = "CONV2D";

#[derive(Debug)]
pub struct Conv2d {
    params: Conv2dParams,
}

impl Conv2d {
    pub fn new(params: Conv2dParams) -> Self {
        Self { params }
    }

    fn output_extent(&self, input: usize, axis: usize) -> Result<usize> {
        let p = &self.params;
        let padded = input + p.pad[axis * 2] + p.pad[axis * 2 + 1];
        if p.ksize[axis] == 0 || p.stride[axis] == 0 {
            return Err(Error::InvalidParam {
                op: NAME.into(),
                detail: format!("kernel and stride must be non-zero on axis {axis}"),
            });
        }
        let span = p.dilation[axis] * (p.ksize[axis] - 1) + 1;
        if padded < span {
            return Err(Error::ShapeMismatch {
                op: NAME.into(),
                detail: format!(
                    "kernel span {span} exceeds padded extent {padded} on axis {axis}"
                ),
            });
        }
        Ok((padded - span) / p.stride[axis] + 1)
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>> {
        if input.len() != 4 {
            return Err(Error::ShapeMismatch {
                op: NAME.into(),
                detail: format!("input must be 4-D, got {}", format_shape(Some(input))),
            });
        }
        Ok(vec![
            self.output_extent(input[0], 0)?,
            self.output_extent(input[1], 1)?,
            self.params.weights,
            input[3],
        ])
    }
}

impl Operator for Conv2d {
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
        if self.params.group != 1 {
            return Err(Error::InvalidParam {
                op: NAME.into(),
                detail: format!("group {} is not supported", self.params.group),
            });
        }
        let input = cx.tensors.shape(required(NAME, "input", inputs, 0)?)?;
        let expected = self.output_shape(input)?;
        let weight = cx.tensors.shape(required(NAME, "input", inputs, 1)?)?;
        let [kw, kh] = self.params.ksize;
        if weight != [kw, kh, input[2], self.params.weights] {
            return Err(Error::CheckFailed {
                op: NAME.into(),
                detail: format!(
                    "weight {} does not match kernel {kw}x{kh} over {} channels into {}",
                    format_shape(Some(weight)),
                    input[2],
                    self.params.weights
                ),
            });
        }
        if let Some(bias) = inputs[2]
            && cx.tensors.shape(bias)?.iter().product::<usize>() != self.params.weights
        {
            return Err(Error::CheckFailed {
                op: NAME.into(),
                detail: "bias length differs from output channels".into(),
            });
        }
        expect_shape(cx, NAME, required(NAME, "output", outputs, 0)?, &expected)
    }

    fn setup(
        &mut self,
        cx: &mut Context<'_>,
        inputs: &mut [Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let input = cx.tensors.shape(required(NAME, "input", inputs, 0)?)?;
        let shape = self.output_shape(input)?;
        resolve_output(cx, NAME, required(NAME, "output", outputs, 0)?, &shape)
    }

    fn compute(
        &mut self,
        cx: &mut Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let input_id = required(NAME, "input", inputs, 0)?;
        let output_id = required(NAME, "output", outputs, 0)?;
        let in_shape = cx.tensors.shape(input_id)?.to_vec();
        let out_shape = cx.tensors.shape(output_id)?.to_vec();
        let x = cx.tensors.data(input_id)?;
        let w = cx.tensors.data(required(NAME, "input", inputs, 1)?)?;
        let bias = match inputs.get(2).copied().flatten() {
            Some(b) => Some(cx.tensors.data(b)?),
            None => None,
        };

        let p = &self.params;
        let [kw, kh] = p.ksize;
        let [in_w, in_h, channels, batch] = [in_shape[0], in_shape[1], in_shape[2], in_shape[3]];
        let [out_w, out_h, out_c] = [out_shape[0], out_shape[1], out_shape[2]];
        let xs = strides(&in_shape);
        let ws = strides(&[kw, kh, channels, out_c]);
        let os = strides(&out_shape);

        let mut out = vec![0.0f32; out_shape.iter().product()];
        for n in 0..batch {
            for oc in 0..out_c {
                for oy in 0..out_h {
                    for ox in 0..out_w {
                        // Flat weight order, same as the FC accumulation.
                        let mut acc = 0.0f32;
                        for c in 0..channels {
                            for ky in 0..kh {
                                let iy = (oy * p.stride[1] + ky * p.dilation[1]) as isize
                                    - p.pad[2] as isize;
                                if iy < 0 || iy as usize >= in_h {
                                    continue;
                                }
                                for kx in 0..kw {
                                    let ix = (ox * p.stride[0] + kx * p.dilation[0]) as isize
                                        - p.pad[0] as isize;
                                    if ix < 0 || ix as usize >= in_w {
                                        continue;
                                    }
                                    let xi = ix as usize * xs[0]
                                        + iy as usize * xs[1]
                                        + c * xs[2]
                                        + n * xs[3];
                                    let wi = kx * ws[0] + ky * ws[1] + c * ws[2] + oc * ws[3];
                                    acc += x[xi] * w[wi];
                                }
                            }
                        }
                        let oi = ox * os[0] + oy * os[1] + oc * os[2] + n * os[3];
                        out[oi] = acc + bias.map_or(0.0, |b| b[oc]);
                    }
                }
            }
        }
        cx.tensors.write(output_id, out)
    }
}
