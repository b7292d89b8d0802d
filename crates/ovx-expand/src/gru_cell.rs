//! GRU cell.
//!
//! ```text
//! r  = gate_act(W_ir x + b_ir + W_hr h + b_hr)
//! z  = gate_act(W_iz x + b_iz + W_hz h + b_hz)
//! c  = act(W_ic x + b_ic + r * (W_hc h + b_hc))     linear before reset
//! c  = act(W_ic x + b_ic + W_hc (r * h) + b_hc)     reset before linear
//! h' = (1 - z) * c + z * h
//! ```
//!
//! Weights are `[in, units]` for the input side and `[units, units]` for the
//! recurrent side. Biases are optional `[units]` vectors.

use ovx_ir::{
    ActivationKind, Context, DType, GruCellParams, GruResetMode, OpKind, Result, TensorId, expect_arity,
    op::gru_cell, required,
};

use crate::cell::{cell_routes, optional_dims, ranked, state_or_zero, weight_units};
use crate::composite::Expansion;
use crate::helpers::Expander;
use crate::policy::CellRoutes;

const NAME: &str = "GRUCELL_OVXLIB";

const INPUT_WEIGHTS: [usize; 3] = [gru_cell::W_I2R, gru_cell::W_I2Z, gru_cell::W_I2C];
const STATE_WEIGHTS: [usize; 3] = [gru_cell::W_H2R, gru_cell::W_H2Z, gru_cell::W_H2C];
const BIASES: [usize; 6] = [
    gru_cell::B_I2R,
    gru_cell::B_I2Z,
    gru_cell::B_I2C,
    gru_cell::B_H2R,
    gru_cell::B_H2Z,
    gru_cell::B_H2C,
];

#[derive(Debug)]
pub struct GruCell {
    params: GruCellParams,
}

impl GruCell {
    pub fn new(params: GruCellParams) -> Self {
        Self { params }
    }
}

/// Operands and dtypes shared by the gate and candidate builders.
struct Operands<'s> {
    slots: &'s [Option<TensorId>],
    input: TensorId,
    state: TensorId,
    routes: CellRoutes,
    input_dtype: DType,
    hstate_dtype: DType,
}

impl Operands<'_> {
    fn slot(&self, index: usize) -> Result<TensorId> {
        required(NAME, "weight", self.slots, index)
    }

    /// Input-side FC over `x` with weight and bias slots `w`, `b`.
    fn input_fc(&self, ex: &mut Expander<'_, '_>, w: usize, b: usize) -> Result<TensorId> {
        let weight = self.slot(w)?;
        ex.fc_routed(self.routes.input, self.input, weight, self.slots[b], &self.input_dtype, true)
    }

    /// Recurrent-side FC over `h` (or another `[units, batch]` tensor).
    fn state_fc(&self, ex: &mut Expander<'_, '_>, h: TensorId, w: usize, b: usize) -> Result<TensorId> {
        let weight = self.slot(w)?;
        ex.fc_routed(self.routes.hstate, h, weight, self.slots[b], &self.hstate_dtype, true)
    }

    fn gate(
        &self,
        ex: &mut Expander<'_, '_>,
        act: ActivationKind,
        (wi, wh, bi, bh): (usize, usize, usize, usize),
    ) -> Result<TensorId> {
        let x = self.input_fc(ex, wi, bi)?;
        let h = self.state_fc(ex, self.state, wh, bh)?;
        let sum = ex.add(x, h, &self.input_dtype, true)?;
        ex.activation(sum, act, &self.input_dtype, true)
    }
}

/// `act(W_ic x + b_ic + r * (W_hc h + b_hc))`.
fn candidate_linear_before_reset(
    ex: &mut Expander<'_, '_>,
    ops: &Operands<'_>,
    r: TensorId,
    act: ActivationKind,
) -> Result<TensorId> {
    let x = ops.input_fc(ex, gru_cell::W_I2C, gru_cell::B_I2C)?;
    let h = ops.state_fc(ex, ops.state, gru_cell::W_H2C, gru_cell::B_H2C)?;
    let gated = ex.binary(OpKind::Multiply, r, h, &ops.hstate_dtype, true)?;
    let sum = ex.add(x, gated, &ops.input_dtype, true)?;
    ex.activation(sum, act, &ops.input_dtype, true)
}

/// `act(W_ic x + b_ic + W_hc (r * h) + b_hc)`.
fn candidate_reset_before_linear(
    ex: &mut Expander<'_, '_>,
    ops: &Operands<'_>,
    r: TensorId,
    act: ActivationKind,
) -> Result<TensorId> {
    let x = ops.input_fc(ex, gru_cell::W_I2C, gru_cell::B_I2C)?;
    let reset = ex.binary(OpKind::Multiply, r, ops.state, &ops.hstate_dtype, true)?;
    let h = ops.state_fc(ex, reset, gru_cell::W_H2C, gru_cell::B_H2C)?;
    let sum = ex.add(x, h, &ops.input_dtype, true)?;
    ex.activation(sum, act, &ops.input_dtype, true)
}

impl Expansion for GruCell {
    fn name(&self) -> &str {
        NAME
    }

    fn check(
        &self,
        cx: &Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        expect_arity(NAME, "input", inputs, gru_cell::INPUT_COUNT)?;
        expect_arity(NAME, "output", outputs, gru_cell::OUTPUT_COUNT)?;
        let input = ranked(cx, NAME, "input", inputs, gru_cell::INPUT, 2)?;
        let batch = input[1];
        let units = weight_units(cx, NAME, inputs, gru_cell::W_I2R, input[0])?;
        for &w in &INPUT_WEIGHTS[1..] {
            optional_dims(cx, NAME, "weight", inputs, w, &[input[0], units])?;
            required(NAME, "weight", inputs, w)?;
        }
        for &w in &STATE_WEIGHTS {
            optional_dims(cx, NAME, "weight", inputs, w, &[units, units])?;
            required(NAME, "weight", inputs, w)?;
        }
        for &b in &BIASES {
            optional_dims(cx, NAME, "bias", inputs, b, &[units])?;
        }
        optional_dims(cx, NAME, "h_state", inputs, gru_cell::H_STATE, &[units, batch])?;
        required(NAME, "output", outputs, gru_cell::OUTPUT).map(drop)
    }

    fn expand(
        &self,
        ex: &mut Expander<'_, '_>,
        inputs: &mut [Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let input = required(NAME, "input", inputs, gru_cell::INPUT)?;
        let w_ir = required(NAME, "weight", inputs, gru_cell::W_I2R)?;
        let w_hr = required(NAME, "weight", inputs, gru_cell::W_H2R)?;
        let out = required(NAME, "output", outputs, gru_cell::OUTPUT)?;
        let batch = ex.shape(input)?[1];
        let units = ex.shape(w_ir)?[1];

        ex.resolve_output(NAME, out, &[units, batch])?;
        if let Some(h_out) = outputs[gru_cell::OUT_H_STATE] {
            ex.resolve_output(NAME, h_out, &[units, batch])?;
        }
        let out_dtype = ex.dtype(out)?;
        let state = state_or_zero(ex, inputs, gru_cell::H_STATE, units, batch, out_dtype);
        let routes = cell_routes(ex, input, w_ir, state, w_hr)?;
        let dtypes = &self.params.internal_dtype;
        let ops = Operands {
            slots: inputs,
            input,
            state,
            routes,
            input_dtype: dtypes.input_fc.unwrap_or(out_dtype),
            hstate_dtype: dtypes.hstate_fc.unwrap_or(out_dtype),
        };

        let gate_act = self.params.gate_activation;
        let r = ops.gate(
            ex,
            gate_act,
            (gru_cell::W_I2R, gru_cell::W_H2R, gru_cell::B_I2R, gru_cell::B_H2R),
        )?;
        let z = ops.gate(
            ex,
            gate_act,
            (gru_cell::W_I2Z, gru_cell::W_H2Z, gru_cell::B_I2Z, gru_cell::B_H2Z),
        )?;
        let candidate = match self.params.reset_mode {
            GruResetMode::LinearBeforeReset => candidate_linear_before_reset,
            GruResetMode::ResetBeforeLinear => candidate_reset_before_linear,
        };
        let c = candidate(ex, &ops, r, self.params.activation)?;

        let one = ex.constant(&[1], out_dtype, 1.0);
        let keep = ex.binary(OpKind::Subtract, one, z, &out_dtype, true)?;
        let fresh = ex.binary(OpKind::Multiply, keep, c, &out_dtype, true)?;
        let carried = ex.binary(OpKind::Multiply, z, state, &out_dtype, true)?;
        ex.binary_into(OpKind::Add, fresh, carried, out)?;
        if let Some(h_out) = outputs[gru_cell::OUT_H_STATE] {
            ex.copy(out, Some(h_out), None, true)?;
        }
        Ok(())
    }
}
