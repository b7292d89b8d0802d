//! LSTM cell.
//!
//! ```text
//! i  = gate_act(W_ii x + b_i + W_ri h)          1 - f when W_ii is absent
//! f  = gate_act(W_if x + b_f + W_rf h + forget_bias)
//! g  = act(W_ic x + b_c + W_rc h)
//! o  = gate_act(W_io x + b_o + W_ro h)
//! c' = f * c + i * g
//! h' = o * act(c')
//! ```
//!
//! Weights are `[in, units]` for the input side and `[units, units]` for the
//! recurrent side. Biases are optional `[units]` vectors applied on the
//! input side.

use ovx_ir::{
    ActivationKind, Context, DType, LstmCellParams, OpKind, Result, TensorId, expect_arity,
    op::lstm_cell, required,
};

use crate::cell::{cell_routes, optional_dims, ranked, state_or_zero, weight_units};
use crate::composite::Expansion;
use crate::helpers::Expander;
use crate::policy::CellRoutes;

const NAME: &str = "LSTMUNIT_OVXLIB";

/// `(input weight, recurrent weight, bias)` slots of one gate.
type GateSlots = (usize, usize, usize);

const INPUT_GATE: GateSlots = (lstm_cell::W_I2I, lstm_cell::W_R2I, lstm_cell::B_I);
const FORGET_GATE: GateSlots = (lstm_cell::W_I2F, lstm_cell::W_R2F, lstm_cell::B_F);
const CELL_GATE: GateSlots = (lstm_cell::W_I2C, lstm_cell::W_R2C, lstm_cell::B_C);
const OUTPUT_GATE: GateSlots = (lstm_cell::W_I2O, lstm_cell::W_R2O, lstm_cell::B_O);

#[derive(Debug)]
pub struct LstmCell {
    params: LstmCellParams,
}

impl LstmCell {
    pub fn new(params: LstmCellParams) -> Self {
        Self { params }
    }
}

/// `true` when the input gate is derived from the forget gate.
fn coupled(inputs: &[Option<TensorId>]) -> bool {
    inputs[lstm_cell::W_I2I].is_none()
}

struct Operands<'s> {
    slots: &'s [Option<TensorId>],
    input: TensorId,
    h: TensorId,
    routes: CellRoutes,
    input_dtype: DType,
    hstate_dtype: DType,
}

impl Operands<'_> {
    /// Pre-activation sum of one gate, `extra` added last when present.
    fn pre_activation(
        &self,
        ex: &mut Expander<'_, '_>,
        (wi, wr, b): GateSlots,
        extra: Option<TensorId>,
    ) -> Result<TensorId> {
        let w_in = required(NAME, "weight", self.slots, wi)?;
        let w_rec = required(NAME, "weight", self.slots, wr)?;
        let x = ex.fc_routed(self.routes.input, self.input, w_in, self.slots[b], &self.input_dtype, true)?;
        let h = ex.fc_routed(self.routes.hstate, self.h, w_rec, None, &self.hstate_dtype, true)?;
        let sum = ex.add(x, h, &self.input_dtype, true)?;
        match extra {
            Some(extra) => ex.add(sum, extra, &self.input_dtype, true),
            None => Ok(sum),
        }
    }

    fn gate(
        &self,
        ex: &mut Expander<'_, '_>,
        slots: GateSlots,
        act: ActivationKind,
        extra: Option<TensorId>,
    ) -> Result<TensorId> {
        let sum = self.pre_activation(ex, slots, extra)?;
        ex.activation(sum, act, &self.input_dtype, true)
    }
}

impl Expansion for LstmCell {
    fn name(&self) -> &str {
        NAME
    }

    fn check(
        &self,
        cx: &Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        expect_arity(NAME, "input", inputs, lstm_cell::INPUT_COUNT)?;
        expect_arity(NAME, "output", outputs, lstm_cell::OUTPUT_COUNT)?;
        let input = ranked(cx, NAME, "input", inputs, lstm_cell::INPUT, 2)?;
        let (inner, batch) = (input[0], input[1]);
        let units = weight_units(cx, NAME, inputs, lstm_cell::W_I2F, inner)?;

        let mut gates = vec![CELL_GATE, OUTPUT_GATE];
        if !coupled(inputs) {
            gates.push(INPUT_GATE);
        }
        for (wi, _, _) in &gates {
            optional_dims(cx, NAME, "weight", inputs, *wi, &[inner, units])?;
            required(NAME, "weight", inputs, *wi)?;
        }
        gates.push(FORGET_GATE);
        for (_, wr, b) in &gates {
            optional_dims(cx, NAME, "weight", inputs, *wr, &[units, units])?;
            required(NAME, "weight", inputs, *wr)?;
            optional_dims(cx, NAME, "bias", inputs, *b, &[units])?;
        }
        optional_dims(cx, NAME, "h_state", inputs, lstm_cell::H_STATE, &[units, batch])?;
        optional_dims(cx, NAME, "c_state", inputs, lstm_cell::C_STATE, &[units, batch])?;
        required(NAME, "output", outputs, lstm_cell::OUTPUT).map(drop)
    }

    fn expand(
        &self,
        ex: &mut Expander<'_, '_>,
        inputs: &mut [Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let input = required(NAME, "input", inputs, lstm_cell::INPUT)?;
        let w_if = required(NAME, "weight", inputs, lstm_cell::W_I2F)?;
        let w_rf = required(NAME, "weight", inputs, lstm_cell::W_R2F)?;
        let out = required(NAME, "output", outputs, lstm_cell::OUTPUT)?;
        let batch = ex.shape(input)?[1];
        let units = ex.shape(w_if)?[1];

        ex.resolve_output(NAME, out, &[units, batch])?;
        for slot in [lstm_cell::OUT_H_STATE, lstm_cell::OUT_C_STATE] {
            if let Some(state_out) = outputs[slot] {
                ex.resolve_output(NAME, state_out, &[units, batch])?;
            }
        }
        let out_dtype = ex.dtype(out)?;
        let h = state_or_zero(ex, inputs, lstm_cell::H_STATE, units, batch, out_dtype);
        let c = state_or_zero(ex, inputs, lstm_cell::C_STATE, units, batch, out_dtype);
        let routes = cell_routes(ex, input, w_if, h, w_rf)?;
        let dtypes = &self.params.internal_dtype;
        let ops = Operands {
            slots: inputs,
            input,
            h,
            routes,
            input_dtype: dtypes.input_fc.unwrap_or(out_dtype),
            hstate_dtype: dtypes.hstate_fc.unwrap_or(out_dtype),
        };

        let (act, gate_act) = (self.params.activation, self.params.gate_activation);
        let forget_bias = (self.params.forget_bias != 0.0)
            .then(|| ex.constant(&[1], ops.input_dtype, self.params.forget_bias));
        let f = ops.gate(ex, FORGET_GATE, gate_act, forget_bias)?;
        let i = if coupled(ops.slots) {
            log::debug!("uid[{}] coupling input gate to forget gate", ex.uid());
            let one = ex.constant(&[1], ops.input_dtype, 1.0);
            ex.binary(OpKind::Subtract, one, f, &ops.input_dtype, true)?
        } else {
            ops.gate(ex, INPUT_GATE, gate_act, None)?
        };
        let g = ops.gate(ex, CELL_GATE, act, None)?;
        let o = ops.gate(ex, OUTPUT_GATE, gate_act, None)?;

        let kept = ex.binary(OpKind::Multiply, f, c, &out_dtype, true)?;
        let fresh = ex.binary(OpKind::Multiply, i, g, &out_dtype, true)?;
        let c_next = match outputs[lstm_cell::OUT_C_STATE] {
            Some(c_out) => {
                ex.binary_into(OpKind::Add, kept, fresh, c_out)?;
                c_out
            }
            None => ex.add(kept, fresh, &out_dtype, true)?,
        };
        let squashed = ex.activation(c_next, act, &out_dtype, true)?;
        ex.binary_into(OpKind::Multiply, o, squashed, out)?;
        if let Some(h_out) = outputs[lstm_cell::OUT_H_STATE] {
            ex.copy(out, Some(h_out), None, true)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::Composite;
    use crate::testing::{Fixture, values};
    use ovx_ir::{Error, ExpandOptions, FcRouting};

    fn sigmoid(x: f32) -> f32 {
        1.0 / (1.0 + (-x).exp())
    }

    fn matvec(w: &[f32], x: &[f32], units: usize) -> Vec<f32> {
        let inner = x.len();
        (0..units)
            .map(|o| (0..inner).map(|i| x[i] * w[o * inner + i]).sum())
            .collect()
    }

    /// Weights in slot order `W_I2I..W_R2O`, biases `B_I..B_O`. A coupled
    /// cell leaves `w[0]` empty.
    struct Weights {
        w: Vec<Vec<f32>>,
        b: Vec<Vec<f32>>,
    }

    /// Returns `(h', c')` for every batch column laid out `[units, batch]`.
    fn reference(
        params: &LstmCellParams,
        x: &[f32],
        h: &[f32],
        c: &[f32],
        p: &Weights,
        (inner, units, batch): (usize, usize, usize),
    ) -> (Vec<f32>, Vec<f32>) {
        let mut h_next = vec![0.0; units * batch];
        let mut c_next = vec![0.0; units * batch];
        for b in 0..batch {
            let xb = &x[b * inner..(b + 1) * inner];
            let hb = &h[b * units..(b + 1) * units];
            let pre = |gate: usize| -> Vec<f32> {
                let xi = matvec(&p.w[gate], xb, units);
                let hi = matvec(&p.w[4 + gate], hb, units);
                (0..units).map(|o| xi[o] + hi[o] + p.b[gate][o]).collect()
            };
            let f: Vec<f32> = pre(1).iter().map(|v| sigmoid(v + params.forget_bias)).collect();
            let i: Vec<f32> = if p.w[0].is_empty() {
                f.iter().map(|f| 1.0 - f).collect()
            } else {
                pre(0).iter().map(|&v| sigmoid(v)).collect()
            };
            let g: Vec<f32> = pre(2).iter().map(|v| v.tanh()).collect();
            let o: Vec<f32> = pre(3).iter().map(|&v| sigmoid(v)).collect();
            for u in 0..units {
                let cn = f[u] * c[b * units + u] + i[u] * g[u];
                c_next[b * units + u] = cn;
                h_next[b * units + u] = o[u] * cn.tanh();
            }
        }
        (h_next, c_next)
    }

    struct Case {
        f: Fixture,
        inputs: Vec<Option<TensorId>>,
        outputs: Vec<Option<TensorId>>,
        weights: Weights,
        x: Vec<f32>,
        h: Vec<f32>,
        c: Vec<f32>,
    }

    fn case(options: ExpandOptions, coupled: bool, (inner, units, batch): (usize, usize, usize)) -> Case {
        let mut f = Fixture::with_options(options);
        let x = values(inner * batch, 51);
        let h = values(units * batch, 52);
        let c = values(units * batch, 53);
        let weights = Weights {
            w: (0..8u32)
                .map(|k| match k {
                    0 if coupled => Vec::new(),
                    0..=3 => values(inner * units, 60 + k),
                    _ => values(units * units, 60 + k),
                })
                .collect(),
            b: (0..4u32).map(|k| values(units, 70 + k)).collect(),
        };
        let mut inputs = vec![None; lstm_cell::INPUT_COUNT];
        inputs[lstm_cell::INPUT] = Some(f.constant(&[inner, batch], x.clone()));
        inputs[lstm_cell::H_STATE] = Some(f.constant(&[units, batch], h.clone()));
        inputs[lstm_cell::C_STATE] = Some(f.constant(&[units, batch], c.clone()));
        for (k, w) in weights.w.iter().enumerate() {
            if w.is_empty() {
                continue;
            }
            let n = if k < 4 { inner } else { units };
            inputs[lstm_cell::W_I2I + k] = Some(f.constant(&[n, units], w.clone()));
        }
        for (k, b) in weights.b.iter().enumerate() {
            inputs[lstm_cell::B_I + k] = Some(f.constant(&[units], b.clone()));
        }
        let outputs = vec![Some(f.auto()), Some(f.auto()), Some(f.auto())];
        Case {
            f,
            inputs,
            outputs,
            weights,
            x,
            h,
            c,
        }
    }

    fn assert_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-5, "{a} vs {e}");
        }
    }

    fn run_case(params: LstmCellParams, options: ExpandOptions, coupled: bool, dims: (usize, usize, usize)) {
        let mut c = case(options, coupled, dims);
        let mut op = Composite::new(LstmCell::new(params.clone()));
        c.f.run(&mut op, &mut c.inputs, &c.outputs).unwrap();
        let (h_ref, c_ref) = reference(&params, &c.x, &c.h, &c.c, &c.weights, dims);
        let [out, h_out, c_out] = [0usize, 1, 2].map(|k| c.outputs[k].unwrap());
        assert_eq!(c.f.shape(out), vec![dims.1, dims.2]);
        assert_eq!(c.f.shape(c_out), vec![dims.1, dims.2]);
        assert_close(&c.f.data(out), &h_ref);
        assert_close(&c.f.data(c_out), &c_ref);
        assert_eq!(c.f.data(h_out), c.f.data(out));
    }

    #[test]
    fn full_gates() {
        run_case(LstmCellParams::default(), ExpandOptions::default(), false, (3, 4, 2));
    }

    #[test]
    fn coupled_input_gate_with_forget_bias() {
        let params = LstmCellParams {
            forget_bias: 1.0,
            ..LstmCellParams::default()
        };
        run_case(params, ExpandOptions::default(), true, (3, 4, 2));
    }

    #[test]
    fn convolution_routing_matches() {
        let options = ExpandOptions {
            fc_routing: FcRouting::AllConvolution,
            ..ExpandOptions::default()
        };
        run_case(LstmCellParams::default(), options, false, (16, 4, 1));
    }

    #[test]
    fn state_outputs_are_written_in_place() {
        let mut c = case(ExpandOptions::default(), false, (3, 4, 2));
        c.inputs[lstm_cell::H_STATE] = None;
        c.inputs[lstm_cell::C_STATE] = None;
        let mut op = Composite::new(LstmCell::new(LstmCellParams::default()));
        c.f.run(&mut op, &mut c.inputs, &c.outputs).unwrap();
        let ws = op.workspace().unwrap();
        // Both zero states were synthesized and written back.
        assert!(ws.owns(c.inputs[lstm_cell::H_STATE].unwrap()));
        assert!(ws.owns(c.inputs[lstm_cell::C_STATE].unwrap()));

        let c_out = c.outputs[lstm_cell::OUT_C_STATE];
        let writers: Vec<_> = ws.nodes().iter().filter(|n| n.outputs.contains(&c_out)).collect();
        assert_eq!(writers.len(), 1);
        assert_eq!(writers[0].kind().name(), "ADD");
        assert_eq!(ws.nodes().last().map(|n| n.kind().name()), Some("DATACONVERT"));
        assert!(c.f.data(c.outputs[0].unwrap()).iter().all(|v| v.abs() < 1.0));
    }

    #[test]
    fn cell_state_output_is_optional() {
        let mut c = case(ExpandOptions::default(), false, (3, 4, 2));
        c.outputs[lstm_cell::OUT_C_STATE] = None;
        let mut op = Composite::new(LstmCell::new(LstmCellParams::default()));
        c.f.run(&mut op, &mut c.inputs, &c.outputs).unwrap();
        let (h_ref, _) = reference(&LstmCellParams::default(), &c.x, &c.h, &c.c, &c.weights, (3, 4, 2));
        assert_close(&c.f.data(c.outputs[0].unwrap()), &h_ref);
    }

    #[test]
    fn missing_recurrent_weight_is_rejected() {
        let mut c = case(ExpandOptions::default(), false, (3, 4, 2));
        c.inputs[lstm_cell::W_R2O] = None;
        let mut op = Composite::new(LstmCell::new(LstmCellParams::default()));
        assert!(matches!(
            c.f.run(&mut op, &mut c.inputs, &c.outputs),
            Err(Error::MissingOperand { index: lstm_cell::W_R2O, .. })
        ));
    }
}
