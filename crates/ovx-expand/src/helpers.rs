//! Fragment builders used by expansions.
//!
//! Every builder creates its intermediate tensors in the workspace and
//! registers its nodes in dependency order. Builders that take an `out`
//! argument write into that tensor instead of a fresh one, so the last
//! producer of an expansion can target a declared output directly.

use ovx_ir::{
    ActivationKind, Context, Conv2dParams, DType, Error, ExpandOptions, OpKind, Result, TensorAttr,
    TensorId, TensorTable, format_shape,
};

use crate::bias::zero_bias_attr;
use crate::policy::{FcPath, find_best_kernel_size};
use crate::workspace::Workspace;

/// Alignment, in bytes, expected at the start of every timestep slice.
const SLICE_ALIGNMENT: usize = 64;

/// Builds nodes into one workspace.
pub struct Expander<'e, 'a> {
    ws: &'e mut Workspace,
    cx: &'e mut Context<'a>,
}

impl<'e, 'a> Expander<'e, 'a> {
    pub fn new(ws: &'e mut Workspace, cx: &'e mut Context<'a>) -> Self {
        Self { ws, cx }
    }

    pub fn tensors(&self) -> &TensorTable {
        &*self.cx.tensors
    }

    pub fn options(&self) -> &ExpandOptions {
        self.cx.options
    }

    pub fn uid(&self) -> u32 {
        self.cx.uid
    }

    pub fn workspace(&self) -> &Workspace {
        &*self.ws
    }

    pub fn shape(&self, id: TensorId) -> Result<Vec<usize>> {
        Ok(self.cx.tensors.shape(id)?.to_vec())
    }

    pub fn attr(&self, id: TensorId) -> Result<TensorAttr> {
        Ok(self.cx.tensors.attr(id)?.clone())
    }

    pub fn dtype(&self, id: TensorId) -> Result<DType> {
        Ok(self.cx.tensors.attr(id)?.dtype)
    }

    /// Attributes of an AUTO intermediate tensor. Virtual only when the
    /// graph allows virtual tensors.
    pub fn internal_attr(&self, dtype: &DType, virt: bool) -> TensorAttr {
        TensorAttr::internal(dtype, virt && self.cx.options.use_virtual_tensors)
    }

    /// A fresh AUTO intermediate tensor.
    pub fn tensor(&mut self, dtype: &DType, virt: bool) -> TensorId {
        let attr = self.internal_attr(dtype, virt);
        self.ws.new_tensor(self.cx, attr, 0.0)
    }

    /// A materialized constant filled with `value`.
    pub fn constant(&mut self, shape: &[usize], dtype: DType, value: f32) -> TensorId {
        self.ws
            .new_tensor(self.cx, TensorAttr::constant(shape, dtype), value)
    }

    /// Resolves an AUTO declared output to `shape`, or verifies it.
    pub fn resolve_output(&mut self, op: &str, out: TensorId, shape: &[usize]) -> Result<()> {
        ovx_ops::util::resolve_output(self.cx, op, out, shape)
    }

    /// Creates, wires and registers one node. Returns its sub-id.
    pub fn node(
        &mut self,
        kind: OpKind,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<u32> {
        let mut node = self
            .ws
            .new_internal_node(self.cx, kind, inputs.len(), outputs.len())?;
        node.inputs = inputs.to_vec();
        node.outputs = outputs.to_vec();
        self.ws.register_and_validate(self.cx, node)
    }

    fn target(&mut self, out: Option<TensorId>, dtype: &DType, virt: bool) -> TensorId {
        match out {
            Some(out) => out,
            None => self.tensor(dtype, virt),
        }
    }

    /// A zero bias for a layer of `kind` over `input` with `weight`.
    pub fn create_zero_bias(&mut self, input: TensorId, weight: TensorId, kind: &OpKind) -> Result<TensorId> {
        let attr = zero_bias_attr(self.cx.tensors.attr(input)?, self.cx.tensors.attr(weight)?, kind)?;
        Ok(self.ws.new_tensor(self.cx, attr, 0.0))
    }

    /// Fully connected layer on the FC primitive: `[in, batch] x [in, out]`.
    pub fn fc(
        &mut self,
        input: TensorId,
        weight: TensorId,
        bias: Option<TensorId>,
        dtype: &DType,
        virt: bool,
    ) -> Result<TensorId> {
        let units = weight_units(&self.shape(weight)?, "FCL")?;
        let kind = OpKind::FullyConnected { axis: 0, weights: units };
        let bias = match bias {
            Some(bias) => bias,
            None => self.create_zero_bias(input, weight, &kind)?,
        };
        let out = self.tensor(dtype, virt);
        self.node(kind, &[Some(input), Some(weight), Some(bias)], &[Some(out)])?;
        Ok(out)
    }

    /// Views an `[in, out]` weight as a `[kw, kh, in / (kh * kw), out]`
    /// convolution kernel.
    pub fn prepare_weight_for_conv_fc(&mut self, weight: TensorId, kernel_h: usize, kernel_w: usize) -> Result<TensorId> {
        let shape = self.shape(weight)?;
        let (inner, units) = match shape[..] {
            [inner, units] if kernel_h * kernel_w > 0 && inner % (kernel_h * kernel_w) == 0 => (inner, units),
            _ => {
                return Err(Error::ShapeMismatch {
                    op: "CONV2D".into(),
                    detail: format!(
                        "weight {} cannot be tiled by a {kernel_h}x{kernel_w} kernel",
                        format_shape(Some(&shape))
                    ),
                });
            }
        };
        self.ws.new_view(
            self.cx,
            weight,
            &[kernel_w, kernel_h, inner / (kernel_h * kernel_w), units],
        )
    }

    /// Reshapes an `[in, batch]` input into a convolution input.
    ///
    /// A single batch becomes `[kw, kh, in / (kh * kw), 1]`. With several
    /// batches the batch moves into the width axis, giving
    /// `[batch, kh, in / kh, 1]` for a `kh x 1` kernel.
    pub fn process_input_for_conv_fc(
        &mut self,
        input: TensorId,
        multi_batch: bool,
        kernel_h: usize,
        kernel_w: usize,
        virt: bool,
    ) -> Result<TensorId> {
        let shape = self.shape(input)?;
        let [inner, batch] = shape[..] else {
            return Err(rank_error("CONV2D", "input", &shape, 2));
        };
        let channels = inner / (kernel_h * kernel_w).max(1);
        let tiled = self.reshape(
            input,
            None,
            &dims(&[kernel_w, kernel_h, channels, batch]),
            virt,
        )?;
        if !multi_batch {
            return Ok(tiled);
        }
        let t = self.shape(tiled)?;
        let (c, h) = (t[1], t[2]);
        let flat = self.reshape(tiled, None, &[t[0] as isize, -1, t[3] as isize], virt)?;
        let moved = self.permute(flat, None, &[2, 1, 0], virt)?;
        let m = self.shape(moved)?;
        self.reshape(moved, None, &dims(&[m[0], c, h, m[2]]), virt)
    }

    /// Turns a convolution output back into `[out, batch]`, undoing
    /// [`Expander::process_input_for_conv_fc`].
    pub fn process_output_for_conv_fc(
        &mut self,
        input: TensorId,
        multi_batch: bool,
        out: Option<TensorId>,
        virt: bool,
    ) -> Result<TensorId> {
        let mut tensor = input;
        let shape = self.shape(tensor)?;
        if shape.len() != 4 {
            return Err(rank_error("CONV2D", "output", &shape, 4));
        }
        if multi_batch {
            let (c, h) = (shape[1], shape[2]);
            let flat = self.reshape(tensor, None, &[shape[0] as isize, -1, shape[3] as isize], virt)?;
            let moved = self.permute(flat, None, &[2, 1, 0], virt)?;
            let m = self.shape(moved)?;
            tensor = self.reshape(moved, None, &dims(&[m[0], c, h, m[2]]), virt)?;
        }
        let s = self.shape(tensor)?;
        self.reshape(tensor, out, &dims(&[s[2], s[3]]), virt)
    }

    /// Convolution over an input already shaped by
    /// [`Expander::process_input_for_conv_fc`].
    #[allow(clippy::too_many_arguments)]
    pub fn conv_fc(
        &mut self,
        input: TensorId,
        weight: TensorId,
        bias: Option<TensorId>,
        kernel_h: usize,
        kernel_w: usize,
        dtype: &DType,
        virt: bool,
    ) -> Result<TensorId> {
        let kernel = self.prepare_weight_for_conv_fc(weight, kernel_h, kernel_w)?;
        let units = self.shape(kernel)?[3];
        let kind = OpKind::Conv2d(Conv2dParams::dense(kernel_w, kernel_h, units));
        let bias = match bias {
            Some(bias) => bias,
            None => self.create_zero_bias(input, kernel, &kind)?,
        };
        let out = self.tensor(dtype, virt);
        self.node(kind, &[Some(input), Some(kernel), Some(bias)], &[Some(out)])?;
        Ok(out)
    }

    /// A fully connected layer lowered onto a convolution.
    pub fn fc_via_conv(
        &mut self,
        input: TensorId,
        weight: TensorId,
        bias: Option<TensorId>,
        dtype: &DType,
        virt: bool,
    ) -> Result<TensorId> {
        let shape = self.shape(input)?;
        let [inner, batch] = shape[..] else {
            return Err(rank_error("FCL", "input", &shape, 2));
        };
        let multi_batch = batch > 1;
        let (kernel_h, kernel_w) = find_best_kernel_size(multi_batch, inner);
        log::debug!("uid[{}] FC over {inner} inputs as a {kernel_h}x{kernel_w} convolution", self.uid());
        let conv_in = self.process_input_for_conv_fc(input, multi_batch, kernel_h, kernel_w, virt)?;
        let conv_out = self.conv_fc(conv_in, weight, bias, kernel_h, kernel_w, dtype, virt)?;
        self.process_output_for_conv_fc(conv_out, multi_batch, None, virt)
    }

    /// A fully connected layer on the given path.
    pub fn fc_routed(
        &mut self,
        path: FcPath,
        input: TensorId,
        weight: TensorId,
        bias: Option<TensorId>,
        dtype: &DType,
        virt: bool,
    ) -> Result<TensorId> {
        match path {
            FcPath::Primitive => self.fc(input, weight, bias, dtype, virt),
            FcPath::Convolution => self.fc_via_conv(input, weight, bias, dtype, virt),
        }
    }

    /// A binary elementwise node (`Add`, `Subtract` or `Multiply`).
    pub fn binary(&mut self, kind: OpKind, a: TensorId, b: TensorId, dtype: &DType, virt: bool) -> Result<TensorId> {
        let out = self.tensor(dtype, virt);
        self.binary_into(kind, a, b, out)?;
        Ok(out)
    }

    pub fn binary_into(&mut self, kind: OpKind, a: TensorId, b: TensorId, out: TensorId) -> Result<()> {
        self.node(kind, &[Some(a), Some(b)], &[Some(out)]).map(drop)
    }

    pub fn add(&mut self, a: TensorId, b: TensorId, dtype: &DType, virt: bool) -> Result<TensorId> {
        self.binary(OpKind::Add, a, b, dtype, virt)
    }

    pub fn activation(&mut self, input: TensorId, act: ActivationKind, dtype: &DType, virt: bool) -> Result<TensorId> {
        let out = self.tensor(dtype, virt);
        self.activation_into(input, act, out)?;
        Ok(out)
    }

    pub fn activation_into(&mut self, input: TensorId, act: ActivationKind, out: TensorId) -> Result<()> {
        self.node(OpKind::Activation(act), &[Some(input)], &[Some(out)])
            .map(drop)
    }

    pub fn permute(&mut self, input: TensorId, out: Option<TensorId>, perm: &[usize], virt: bool) -> Result<TensorId> {
        let dtype = self.dtype(input)?;
        let out = self.target(out, &dtype, virt);
        self.node(
            OpKind::Permute { perm: perm.to_vec() },
            &[Some(input)],
            &[Some(out)],
        )?;
        Ok(out)
    }

    pub fn reshape(&mut self, input: TensorId, out: Option<TensorId>, size: &[isize], virt: bool) -> Result<TensorId> {
        let dtype = self.dtype(input)?;
        let out = self.target(out, &dtype, virt);
        self.node(
            OpKind::Reshape { size: size.to_vec() },
            &[Some(input)],
            &[Some(out)],
        )?;
        Ok(out)
    }

    /// Swaps the batch and time axes of a 3-D tensor.
    pub fn transpose_time_major(&mut self, input: TensorId, out: Option<TensorId>, virt: bool) -> Result<TensorId> {
        self.permute(input, out, &[0, 2, 1], virt)
    }

    /// Splits `input` into `slices_num` pieces along `axis`; evenly when
    /// `slices` is `None`.
    pub fn split(
        &mut self,
        input: TensorId,
        axis: usize,
        slices_num: usize,
        slices: Option<&[usize]>,
        virt: bool,
    ) -> Result<Vec<TensorId>> {
        let dtype = self.dtype(input)?;
        let outs: Vec<_> = (0..slices_num).map(|_| self.tensor(&dtype, virt)).collect();
        let slots: Vec<_> = outs.iter().copied().map(Some).collect();
        let kind = OpKind::Split {
            axis,
            slices: slices.map(<[usize]>::to_vec).unwrap_or_default(),
        };
        self.node(kind, &[Some(input)], &slots)?;
        Ok(outs)
    }

    /// Splits a `[feat, batch, time]` tensor into per-step `[feat, batch, 1]`
    /// slices.
    pub fn split_timesteps(&mut self, input: TensorId, time_steps: usize, virt: bool) -> Result<Vec<TensorId>> {
        let slices = vec![1; time_steps];
        self.split(input, 2, time_steps, Some(&slices), virt)
    }

    /// Drops the unit time axis of a step slice: `[feat, batch]`.
    pub fn reshape_split_output(&mut self, input: TensorId, batch: usize, virt: bool) -> Result<TensorId> {
        self.reshape(input, None, &[-1, batch as isize], virt)
    }

    /// Restores the unit time axis of a step output: `[units, batch, 1]`.
    pub fn reshape_cell_output(&mut self, input: TensorId, batch: usize, virt: bool) -> Result<TensorId> {
        self.reshape(input, None, &[-1, batch as isize, 1], virt)
    }

    pub fn concat(&mut self, inputs: &[TensorId], axis: usize, out: Option<TensorId>, virt: bool) -> Result<TensorId> {
        let first = *inputs.first().ok_or_else(|| Error::InvalidParam {
            op: "CONCAT".into(),
            detail: "no inputs".into(),
        })?;
        let dtype = self.dtype(first)?;
        let out = self.target(out, &dtype, virt);
        let slots: Vec<_> = inputs.iter().copied().map(Some).collect();
        self.node(OpKind::Concat { axis }, &slots, &[Some(out)])?;
        Ok(out)
    }

    /// Copies `input` through a DataConvert node, optionally changing dtype.
    pub fn copy(&mut self, input: TensorId, out: Option<TensorId>, dtype: Option<&DType>, virt: bool) -> Result<TensorId> {
        let dtype = match dtype {
            Some(d) => *d,
            None => self.dtype(input)?,
        };
        let out = self.target(out, &dtype, virt);
        self.node(OpKind::DataConvert, &[Some(input)], &[Some(out)])?;
        Ok(out)
    }

    /// Re-bases timestep slices whose byte offset is not 64-aligned onto
    /// fresh tensors through a DataConvert, unless the target has a stream
    /// processor. Replaced slices are updated in place.
    pub fn align_timesteps(&mut self, slices: &mut [TensorId], virt: bool) -> Result<()> {
        let mut offset = 0usize;
        for slice in slices.iter_mut() {
            let attr = self.attr(*slice)?;
            let size = attr.byte_size().ok_or(Error::UnresolvedShape(*slice))?;
            if offset % SLICE_ALIGNMENT != 0 && !self.cx.options.support_stream_processor {
                log::debug!("uid[{}] slice {} at byte offset {offset} is unaligned", self.uid(), *slice);
                *slice = self.copy(*slice, None, Some(&attr.dtype), virt)?;
            }
            offset += size;
        }
        Ok(())
    }
}

fn dims(shape: &[usize]) -> Vec<isize> {
    shape.iter().map(|&d| d as isize).collect()
}

fn weight_units(shape: &[usize], op: &str) -> Result<usize> {
    match shape {
        [_, units] => Ok(*units),
        _ => Err(rank_error(op, "weight", shape, 2)),
    }
}

fn rank_error(op: &str, what: &str, shape: &[usize], rank: usize) -> Error {
    Error::ShapeMismatch {
        op: op.to_owned(),
        detail: format!("{what} {} is not rank {rank}", format_shape(Some(shape))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, values};
    use crate::workspace::init_workspace;
    use ovx_ir::{DataType, ExpandOptions, Quantization};

    fn fc_reference(x: &[f32], w: &[f32], inner: usize, units: usize, batch: usize) -> Vec<f32> {
        let mut out = vec![0.0; units * batch];
        for b in 0..batch {
            for o in 0..units {
                let mut acc = 0.0f32;
                for i in 0..inner {
                    acc += x[b * inner + i] * w[o * inner + i];
                }
                out[b * units + o] = acc;
            }
        }
        out
    }

    #[test]
    fn fc_synthesizes_zero_bias() {
        let mut f = Fixture::new();
        let x = f.constant(&[3, 1], vec![1.0, 2.0, 3.0]);
        let w = f.constant(&[3, 2], vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
        let mut slot = None;
        let mut cx = f.cx();
        let ws = init_workspace(&mut slot, &mut cx).unwrap();
        let mut ex = Expander::new(ws, &mut cx);
        let y = ex.fc(x, w, None, &DType::F32, true).unwrap();
        assert_eq!(ex.shape(y).unwrap(), vec![2, 1]);
        assert_eq!(ex.workspace().stats().nodes, 1);
        // Bias plus output.
        assert_eq!(ex.workspace().stats().tensors, 2);
        let ws = slot.as_mut().unwrap();
        ws.compute(&mut cx).unwrap();
        assert_eq!(cx.tensors.data(y).unwrap(), &[1.0, 3.0]);
    }

    #[test]
    fn conv_path_matches_fc_single_batch() {
        let (inner, units) = (36, 5);
        let mut f = Fixture::new();
        let xs = values(inner, 1);
        let ws_data = values(inner * units, 2);
        let x = f.constant(&[inner, 1], xs.clone());
        let w = f.constant(&[inner, units], ws_data.clone());
        let mut slot = None;
        let mut cx = f.cx();
        let ws = init_workspace(&mut slot, &mut cx).unwrap();
        let mut ex = Expander::new(ws, &mut cx);
        let y = ex.fc_via_conv(x, w, None, &DType::F32, true).unwrap();
        assert_eq!(ex.shape(y).unwrap(), vec![units, 1]);
        let ws = slot.as_mut().unwrap();
        assert!(ws.nodes().iter().any(|n| n.kind().name() == "CONV2D"));
        ws.compute(&mut cx).unwrap();
        assert_eq!(cx.tensors.data(y).unwrap(), fc_reference(&xs, &ws_data, inner, units, 1));
    }

    #[test]
    fn conv_path_matches_fc_multi_batch() {
        let (inner, units, batch) = (21, 4, 3);
        let mut f = Fixture::new();
        let xs = values(inner * batch, 3);
        let ws_data = values(inner * units, 4);
        let x = f.constant(&[inner, batch], xs.clone());
        let w = f.constant(&[inner, units], ws_data.clone());
        let mut slot = None;
        let mut cx = f.cx();
        let ws = init_workspace(&mut slot, &mut cx).unwrap();
        let mut ex = Expander::new(ws, &mut cx);
        let conv_in = ex.process_input_for_conv_fc(x, true, 7, 1, true).unwrap();
        assert_eq!(ex.shape(conv_in).unwrap(), vec![batch, 7, 3, 1]);
        let conv_out = ex.conv_fc(conv_in, w, None, 7, 1, &DType::F32, true).unwrap();
        assert_eq!(ex.shape(conv_out).unwrap(), vec![batch, 1, units, 1]);
        let y = ex.process_output_for_conv_fc(conv_out, true, None, true).unwrap();
        assert_eq!(ex.shape(y).unwrap(), vec![units, batch]);
        let ws = slot.as_mut().unwrap();
        ws.compute(&mut cx).unwrap();
        let expected = fc_reference(&xs, &ws_data, inner, units, batch);
        for (a, b) in cx.tensors.data(y).unwrap().iter().zip(&expected) {
            assert!((a - b).abs() < 1e-6, "{a} vs {b}");
        }
    }

    #[test]
    fn conv_weight_must_tile() {
        let mut f = Fixture::new();
        let w = f.constant(&[10, 2], vec![0.0; 20]);
        let mut slot = None;
        let mut cx = f.cx();
        let ws = init_workspace(&mut slot, &mut cx).unwrap();
        let mut ex = Expander::new(ws, &mut cx);
        assert!(matches!(
            ex.prepare_weight_for_conv_fc(w, 3, 1),
            Err(Error::ShapeMismatch { .. })
        ));
        let view = ex.prepare_weight_for_conv_fc(w, 5, 1).unwrap();
        assert_eq!(ex.shape(view).unwrap(), vec![1, 5, 2, 2]);
    }

    #[test]
    fn quantized_input_with_float_weight_is_rejected() {
        let mut f = Fixture::new();
        let q = DType::quantized(DataType::U8, Quantization::AffineAsymmetric { scale: 0.1, zero_point: 0 });
        let x = f.tensors.create(TensorAttr::new(&[4, 1], q));
        let w = f.constant(&[4, 2], vec![0.0; 8]);
        let mut slot = None;
        let mut cx = f.cx();
        let ws = init_workspace(&mut slot, &mut cx).unwrap();
        let mut ex = Expander::new(ws, &mut cx);
        assert!(matches!(
            ex.fc(x, w, None, &DType::F32, true),
            Err(Error::QuantMismatch { .. })
        ));
    }

    #[test]
    fn timestep_split_and_concat() {
        let mut f = Fixture::new();
        let x = f.constant(&[2, 1, 3], vec![0.0, 1.0, 10.0, 11.0, 20.0, 21.0]);
        let mut slot = None;
        let mut cx = f.cx();
        let ws = init_workspace(&mut slot, &mut cx).unwrap();
        let mut ex = Expander::new(ws, &mut cx);
        let steps = ex.split_timesteps(x, 3, true).unwrap();
        let flat: Vec<_> = steps
            .iter()
            .map(|&s| ex.reshape_split_output(s, 1, true).unwrap())
            .collect();
        assert_eq!(ex.shape(flat[2]).unwrap(), vec![2, 1]);
        let up: Vec<_> = flat
            .iter()
            .rev()
            .map(|&s| ex.reshape_cell_output(s, 1, true).unwrap())
            .collect();
        let y = ex.concat(&up, 2, None, true).unwrap();
        let ws = slot.as_mut().unwrap();
        ws.compute(&mut cx).unwrap();
        assert_eq!(cx.tensors.data(y).unwrap(), &[20.0, 21.0, 10.0, 11.0, 0.0, 1.0]);
    }

    #[test]
    fn unaligned_slices_get_copied() {
        let mut f = Fixture::new();
        // 5 f32 features per step: 20-byte slices.
        let x = f.constant(&[5, 1, 4], vec![0.0; 20]);
        let mut slot = None;
        let mut cx = f.cx();
        let ws = init_workspace(&mut slot, &mut cx).unwrap();
        let mut ex = Expander::new(ws, &mut cx);
        let original = ex.split_timesteps(x, 4, true).unwrap();
        let mut slices = original.clone();
        ex.align_timesteps(&mut slices, true).unwrap();
        assert_eq!(slices[0], original[0]);
        assert!(slices[1..].iter().zip(&original[1..]).all(|(a, b)| a != b));
        // One split plus three copies.
        assert_eq!(ex.workspace().stats().nodes, 4);
    }

    #[test]
    fn stream_processor_skips_alignment() {
        let mut f = Fixture::with_options(ExpandOptions {
            support_stream_processor: true,
            ..ExpandOptions::default()
        });
        let x = f.constant(&[5, 1, 4], vec![0.0; 20]);
        let mut slot = None;
        let mut cx = f.cx();
        let ws = init_workspace(&mut slot, &mut cx).unwrap();
        let mut ex = Expander::new(ws, &mut cx);
        let original = ex.split_timesteps(x, 4, true).unwrap();
        let mut slices = original.clone();
        ex.align_timesteps(&mut slices, true).unwrap();
        assert_eq!(slices, original);
    }

    #[test]
    fn non_virtual_option_materializes_intermediates() {
        let mut f = Fixture::with_options(ExpandOptions {
            use_virtual_tensors: false,
            ..ExpandOptions::default()
        });
        let x = f.constant(&[2, 1], vec![1.0, -1.0]);
        let mut slot = None;
        let mut cx = f.cx();
        let ws = init_workspace(&mut slot, &mut cx).unwrap();
        let mut ex = Expander::new(ws, &mut cx);
        let y = ex.activation(x, ActivationKind::Relu, &DType::F32, true).unwrap();
        assert!(!ex.tensors().attr(y).unwrap().is_virtual);
        assert!(ex.tensors().is_materialized(y).unwrap());
    }
}
