//! Operand checks and state handling shared by the recurrent cells.

use ovx_ir::{Context, DType, Error, Result, TensorId, format_shape, required};

use crate::helpers::Expander;
use crate::policy::{CellRoutes, fits_convolution, route_cell};

/// Shape of a required operand, which must have `rank` dimensions.
pub(crate) fn ranked(
    cx: &Context<'_>,
    op: &str,
    what: &'static str,
    slots: &[Option<TensorId>],
    index: usize,
    rank: usize,
) -> Result<Vec<usize>> {
    let id = required(op, what, slots, index)?;
    let shape = cx.tensors.shape(id)?;
    if shape.len() != rank {
        return Err(Error::CheckFailed {
            op: op.to_owned(),
            detail: format!("{what} #{index} {} is not rank {rank}", format_shape(Some(shape))),
        });
    }
    Ok(shape.to_vec())
}

/// Verifies an optional operand's shape when it is present.
pub(crate) fn optional_dims(
    cx: &Context<'_>,
    op: &str,
    what: &'static str,
    slots: &[Option<TensorId>],
    index: usize,
    expected: &[usize],
) -> Result<()> {
    let Some(id) = slots.get(index).copied().flatten() else {
        return Ok(());
    };
    let shape = cx.tensors.shape(id)?;
    if shape != expected {
        return Err(Error::CheckFailed {
            op: op.to_owned(),
            detail: format!(
                "{what} #{index} is {}, expected {}",
                format_shape(Some(shape)),
                format_shape(Some(expected))
            ),
        });
    }
    Ok(())
}

/// A `[in, units]` weight whose input extent must be `inner`. Returns
/// `units`.
pub(crate) fn weight_units(
    cx: &Context<'_>,
    op: &str,
    slots: &[Option<TensorId>],
    index: usize,
    inner: usize,
) -> Result<usize> {
    let shape = ranked(cx, op, "weight", slots, index, 2)?;
    if shape[0] != inner {
        return Err(Error::CheckFailed {
            op: op.to_owned(),
            detail: format!(
                "weight #{index} {} does not take {inner} inputs",
                format_shape(Some(&shape))
            ),
        });
    }
    Ok(shape[1])
}

/// The recurrent state input, synthesized as a zero constant of
/// `[units, batch]` when absent. A synthesized state is written back into
/// its slot.
pub(crate) fn state_or_zero(
    ex: &mut Expander<'_, '_>,
    inputs: &mut [Option<TensorId>],
    slot: usize,
    units: usize,
    batch: usize,
    dtype: DType,
) -> TensorId {
    if let Some(h) = inputs[slot] {
        return h;
    }
    let h = ex.constant(&[units, batch], dtype, 0.0);
    log::debug!("uid[{}] synthesized zero state {h} [{units}, {batch}]", ex.uid());
    inputs[slot] = Some(h);
    h
}

/// Routes for the input-side and recurrent-side layers of a cell.
pub(crate) fn cell_routes(
    ex: &Expander<'_, '_>,
    input: TensorId,
    input_weight: TensorId,
    state: TensorId,
    state_weight: TensorId,
) -> Result<CellRoutes> {
    let input_fits = fits_convolution(&ex.attr(input)?, &ex.attr(input_weight)?);
    let state_fits = fits_convolution(&ex.attr(state)?, &ex.attr(state_weight)?);
    let routes = route_cell(ex.options().fc_routing, input_fits, state_fits);
    log::debug!(
        "uid[{}] {} routing: input {:?}, hstate {:?}",
        ex.uid(),
        ex.options().fc_routing,
        routes.input,
        routes.hstate
    );
    Ok(routes)
}
