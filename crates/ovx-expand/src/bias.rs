//! Attributes of the zero bias synthesized for FC and convolution layers.

use ovx_ir::{DType, DataType, Error, OpKind, QuantKind, Quantization, Result, TensorAttr};

/// Attributes of a zero bias for a layer of `kind` consuming `input` with
/// `weight`.
///
/// The bias is a 1-D constant whose length is the layer's output channel
/// count. Its quantization follows the weight: scale-based schemes get
/// `scale = weight.scale * input.scale` with a zero point of 0, fixed point
/// gets `fl = weight.fl + input.fl`. A quantized input whose scheme differs
/// from the weight's is rejected.
pub fn zero_bias_attr(input: &TensorAttr, weight: &TensorAttr, kind: &OpKind) -> Result<TensorAttr> {
    let w_shape = weight.shape.as_deref().unwrap_or_default();
    let channel_axis = match kind {
        OpKind::FullyConnected { .. } => 1,
        OpKind::Conv2d(_) => 3,
        other => {
            log::warn!(
                "zero bias is only synthesized for FCL and CONV2D, treating {} as FCL",
                other.name()
            );
            1
        }
    };
    let len = *w_shape.get(channel_axis).ok_or_else(|| Error::ShapeMismatch {
        op: kind.name().to_owned(),
        detail: format!(
            "weight of rank {} has no output-channel axis {channel_axis}",
            w_shape.len()
        ),
    })?;

    let (iq, wq) = (input.dtype.quant, weight.dtype.quant);
    if iq.kind() != QuantKind::None && iq.kind() != wq.kind() {
        log::error!("input quantization {} != weight quantization {}", iq.kind(), wq.kind());
        return Err(Error::QuantMismatch {
            input: iq.kind(),
            weight: wq.kind(),
        });
    }

    let in_scale = iq.scale().unwrap_or(1.0);
    let in_fl = iq.fractional_bits().unwrap_or(0);
    let quant = match wq {
        Quantization::None => Quantization::None,
        Quantization::AffineAsymmetric { scale, .. } => Quantization::AffineAsymmetric {
            scale: scale * in_scale,
            zero_point: 0,
        },
        Quantization::AffineSymmetric { scale } => Quantization::AffineSymmetric {
            scale: scale * in_scale,
        },
        Quantization::SymmetricFloat8 { scale } => Quantization::SymmetricFloat8 {
            scale: scale * in_scale,
        },
        Quantization::DynamicFixedPoint { fractional_bits } => Quantization::DynamicFixedPoint {
            fractional_bits: fractional_bits + in_fl,
        },
    };
    let dtype = match quant {
        Quantization::None => DType::F32,
        quant => DType::quantized(DataType::I32, quant),
    };
    Ok(TensorAttr::constant(&[len], dtype))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ovx_ir::Conv2dParams;

    const FC: OpKind = OpKind::FullyConnected { axis: 0, weights: 4 };

    fn attr(shape: &[usize], data_type: DataType, quant: Quantization) -> TensorAttr {
        TensorAttr::new(shape, DType::quantized(data_type, quant))
    }

    #[test]
    fn affine_scales_multiply() {
        let input = attr(
            &[8, 2],
            DataType::U8,
            Quantization::AffineAsymmetric {
                scale: 0.5,
                zero_point: 128,
            },
        );
        let weight = attr(
            &[8, 4],
            DataType::U8,
            Quantization::AffineAsymmetric {
                scale: 0.25,
                zero_point: 3,
            },
        );
        let bias = zero_bias_attr(&input, &weight, &FC).unwrap();
        assert_eq!(bias.shape, Some(vec![4]));
        assert_eq!(bias.dtype.data_type, DataType::I32);
        assert_eq!(
            bias.dtype.quant,
            Quantization::AffineAsymmetric {
                scale: 0.125,
                zero_point: 0
            }
        );
        assert!(bias.is_const);
        assert!(!bias.is_virtual);
    }

    #[test]
    fn fixed_point_lengths_add() {
        let input = attr(&[8, 2], DataType::I8, Quantization::DynamicFixedPoint { fractional_bits: 3 });
        let weight = attr(&[8, 4], DataType::I8, Quantization::DynamicFixedPoint { fractional_bits: 5 });
        let bias = zero_bias_attr(&input, &weight, &FC).unwrap();
        assert_eq!(bias.dtype.quant, Quantization::DynamicFixedPoint { fractional_bits: 8 });
        assert_eq!(bias.dtype.data_type, DataType::I32);
    }

    #[test]
    fn float_input_keeps_weight_scale() {
        let input = TensorAttr::new(&[8, 2], DType::F32);
        let weight = attr(&[8, 4], DataType::I8, Quantization::AffineSymmetric { scale: 0.25 });
        let bias = zero_bias_attr(&input, &weight, &FC).unwrap();
        assert_eq!(bias.dtype.quant, Quantization::AffineSymmetric { scale: 0.25 });
    }

    #[test]
    fn unquantized_weight_gives_f32() {
        let input = TensorAttr::new(&[8, 2], DType::F16);
        let weight = TensorAttr::new(&[8, 4], DType::F16);
        let bias = zero_bias_attr(&input, &weight, &FC).unwrap();
        assert_eq!(bias.dtype, DType::F32);
        assert_eq!(bias.shape, Some(vec![4]));
    }

    #[test]
    fn conv_uses_output_channel_axis() {
        let input = TensorAttr::new(&[1, 1, 8, 2], DType::F32);
        let weight = TensorAttr::new(&[1, 1, 8, 6], DType::F32);
        let bias = zero_bias_attr(&input, &weight, &OpKind::Conv2d(Conv2dParams::dense(1, 1, 6))).unwrap();
        assert_eq!(bias.shape, Some(vec![6]));
    }

    #[test]
    fn other_ops_fall_back_to_fc_axis() {
        let input = TensorAttr::new(&[8, 2], DType::F32);
        let weight = TensorAttr::new(&[8, 4], DType::F32);
        let bias = zero_bias_attr(&input, &weight, &OpKind::Add).unwrap();
        assert_eq!(bias.shape, Some(vec![4]));
    }

    #[test]
    fn mismatched_kinds_fail() {
        let input = attr(&[8, 2], DataType::I8, Quantization::DynamicFixedPoint { fractional_bits: 3 });
        let weight = attr(&[8, 4], DataType::I8, Quantization::AffineSymmetric { scale: 0.25 });
        assert!(matches!(
            zero_bias_attr(&input, &weight, &FC),
            Err(Error::QuantMismatch {
                input: QuantKind::DynamicFixedPoint,
                weight: QuantKind::AffineSymmetric
            })
        ));
    }
}
