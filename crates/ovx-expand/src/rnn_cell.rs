//! Vanilla RNN cell: `h' = act(W_i x + b + W_h h (+ W_aux x_aux))`.
//!
//! Inputs are `[input, h_state?, w_i, w_h, bias?, aux_input?, aux_weight?]`
//! with `input: [in, batch]`, `w_i: [in, units]` and `w_h: [units, units]`.
//! Outputs are `[output, h_state?]`, both `[units, batch]`. The activation
//! writes the declared output directly; the state output is a copy of it.

use ovx_ir::{
    Context, Error, RnnCellParams, Result, TensorId, expect_arity, op::rnn_cell, required,
};

use crate::cell::{cell_routes, optional_dims, ranked, state_or_zero, weight_units};
use crate::composite::Expansion;
use crate::helpers::Expander;

const NAME: &str = "RNNCELL_OVXLIB";

#[derive(Debug)]
pub struct RnnCell {
    params: RnnCellParams,
}

impl RnnCell {
    pub fn new(params: RnnCellParams) -> Self {
        Self { params }
    }
}

impl Expansion for RnnCell {
    fn name(&self) -> &str {
        NAME
    }

    fn check(
        &self,
        cx: &Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        expect_arity(NAME, "input", inputs, rnn_cell::INPUT_COUNT)?;
        expect_arity(NAME, "output", outputs, rnn_cell::OUTPUT_COUNT)?;
        let input = ranked(cx, NAME, "input", inputs, rnn_cell::INPUT, 2)?;
        let batch = input[1];
        let units = weight_units(cx, NAME, inputs, rnn_cell::WEIGHT_I, input[0])?;
        weight_units(cx, NAME, inputs, rnn_cell::WEIGHT_H, units)?;
        optional_dims(cx, NAME, "h_state", inputs, rnn_cell::H_STATE, &[units, batch])?;
        optional_dims(cx, NAME, "bias", inputs, rnn_cell::BIAS, &[units])?;
        match (inputs[rnn_cell::AUX_INPUT], inputs[rnn_cell::AUX_WEIGHT]) {
            (None, None) => {}
            (Some(_), Some(_)) => {
                let aux = ranked(cx, NAME, "aux input", inputs, rnn_cell::AUX_INPUT, 2)?;
                if aux[1] != batch {
                    return Err(Error::CheckFailed {
                        op: NAME.into(),
                        detail: format!("aux input batch {} differs from input batch {batch}", aux[1]),
                    });
                }
                let aux_units = weight_units(cx, NAME, inputs, rnn_cell::AUX_WEIGHT, aux[0])?;
                if aux_units != units {
                    return Err(Error::CheckFailed {
                        op: NAME.into(),
                        detail: format!("aux weight has {aux_units} units, expected {units}"),
                    });
                }
            }
            _ => {
                return Err(Error::CheckFailed {
                    op: NAME.into(),
                    detail: "aux input and aux weight must be given together".into(),
                });
            }
        }
        required(NAME, "output", outputs, rnn_cell::OUTPUT).map(drop)
    }

    fn expand(
        &self,
        ex: &mut Expander<'_, '_>,
        inputs: &mut [Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let input = required(NAME, "input", inputs, rnn_cell::INPUT)?;
        let w_i = required(NAME, "weight", inputs, rnn_cell::WEIGHT_I)?;
        let w_h = required(NAME, "weight", inputs, rnn_cell::WEIGHT_H)?;
        let out = required(NAME, "output", outputs, rnn_cell::OUTPUT)?;
        let batch = ex.shape(input)?[1];
        let units = ex.shape(w_i)?[1];

        ex.resolve_output(NAME, out, &[units, batch])?;
        if let Some(h_out) = outputs[rnn_cell::OUT_H_STATE] {
            ex.resolve_output(NAME, h_out, &[units, batch])?;
        }
        let out_dtype = ex.dtype(out)?;
        let h = state_or_zero(ex, inputs, rnn_cell::H_STATE, units, batch, out_dtype);

        let routes = cell_routes(ex, input, w_i, h, w_h)?;
        let dtypes = &self.params.internal_dtype;
        let input_dtype = dtypes.input_fc.unwrap_or(out_dtype);
        let hstate_dtype = dtypes.hstate_fc.unwrap_or(out_dtype);

        let input_fc = ex.fc_routed(
            routes.input,
            input,
            w_i,
            inputs[rnn_cell::BIAS],
            &input_dtype,
            true,
        )?;
        let aux_fc = match (inputs[rnn_cell::AUX_INPUT], inputs[rnn_cell::AUX_WEIGHT]) {
            (Some(aux), Some(aux_w)) => Some(ex.fc_routed(routes.input, aux, aux_w, None, &input_dtype, true)?),
            _ => None,
        };
        let hstate_fc = ex.fc_routed(routes.hstate, h, w_h, None, &hstate_dtype, true)?;

        let mut gate = ex.add(input_fc, hstate_fc, &input_dtype, true)?;
        if let Some(aux_fc) = aux_fc {
            gate = ex.add(gate, aux_fc, &input_dtype, true)?;
        }
        ex.activation_into(gate, self.params.activation, out)?;
        if let Some(h_out) = outputs[rnn_cell::OUT_H_STATE] {
            ex.copy(out, Some(h_out), None, true)?;
        }
        Ok(())
    }
}
