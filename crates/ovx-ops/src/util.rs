//! Shape helpers shared by the primitive operators.

use ovx_ir::{Context, Error, Result, TensorId, format_shape};

/// Element strides for a shape whose dimension 0 is innermost.
pub fn strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = Vec::with_capacity(shape.len());
    let mut acc = 1;
    for &d in shape {
        strides.push(acc);
        acc *= d;
    }
    strides
}

/// Resolves an AUTO output to `shape`, or verifies an explicit one.
pub fn resolve_output(cx: &mut Context<'_>, op: &str, out: TensorId, shape: &[usize]) -> Result<()> {
    match cx.tensors.attr(out)?.shape.as_deref() {
        None => cx.tensors.set_shape(out, shape),
        Some(declared) if declared == shape => Ok(()),
        Some(declared) => Err(Error::ShapeMismatch {
            op: op.to_owned(),
            detail: format!(
                "output declared as {}, operands produce {}",
                format_shape(Some(declared)),
                format_shape(Some(shape))
            ),
        }),
    }
}

/// Verifies that `out` has exactly `shape`.
pub fn expect_shape(cx: &Context<'_>, op: &str, out: TensorId, shape: &[usize]) -> Result<()> {
    let actual = cx.tensors.shape(out)?;
    if actual != shape {
        return Err(Error::CheckFailed {
            op: op.to_owned(),
            detail: format!(
                "{out} has shape {}, expected {}",
                format_shape(Some(actual)),
                format_shape(Some(shape))
            ),
        });
    }
    Ok(())
}

/// Broadcast result of two shapes, aligned at dimension 0.
///
/// The shorter shape is padded with 1s in its outer dimensions.
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    let rank = a.len().max(b.len());
    (0..rank)
        .map(|i| {
            let x = a.get(i).copied().unwrap_or(1);
            let y = b.get(i).copied().unwrap_or(1);
            match (x, y) {
                _ if x == y => Some(x),
                (1, _) => Some(y),
                (_, 1) => Some(x),
                _ => None,
            }
        })
        .collect()
}

/// Maps a flat index of `out_shape` onto the flat index of a tensor of
/// `shape` broadcast to it.
pub fn broadcast_index(flat: usize, out_shape: &[usize], shape: &[usize], strides: &[usize]) -> usize {
    let mut rem = flat;
    let mut idx = 0;
    for (d, &extent) in out_shape.iter().enumerate() {
        let coord = rem % extent;
        rem /= extent;
        if let Some(&dim) = shape.get(d)
            && dim != 1
        {
            idx += coord * strides[d];
        }
    }
    idx
}

/// Product of dimensions below `axis` and above it.
pub fn split_around(shape: &[usize], axis: usize) -> (usize, usize) {
    let inner = shape[..axis].iter().product();
    let outer = shape[axis + 1..].iter().product();
    (inner, outer)
}
