//! Unidirectional sequence RNN/GRU/LSTM, unrolled into one cell node per
//! step.
//!
//! Inputs are laid out exactly as the cell's own slots. The input is
//! `[feat, batch, time]` when time-major and `[feat, time, batch]`
//! otherwise; the output follows the same layout with `units` features, or
//! is `[units, batch]` when only the last step is returned. Every state slot
//! of the cell (hidden state, and the cell state of an LSTM) is carried from
//! step to step; the last step writes the declared state outputs.

use ovx_ir::op::sequence;
use ovx_ir::{Context, Error, Result, SequenceParams, TensorId, expect_arity, required};

use crate::cell::{optional_dims, ranked};
use crate::composite::Expansion;
use crate::helpers::Expander;

const NAME: &str = "UNIDIRECTIONAL_SEQUENCE_RNN";

#[derive(Debug)]
pub struct SequenceRnn {
    params: SequenceParams,
}

impl SequenceRnn {
    pub fn new(params: SequenceParams) -> Self {
        Self { params }
    }

    /// `(features, batch, time)` of a sequence tensor in this layout.
    fn dims(&self, shape: &[usize]) -> (usize, usize, usize) {
        if self.params.time_major {
            (shape[0], shape[1], shape[2])
        } else {
            (shape[0], shape[2], shape[1])
        }
    }

    fn output_shape(&self, units: usize, batch: usize, time: usize) -> Vec<usize> {
        match (self.params.return_sequences, self.params.time_major) {
            (false, _) => vec![units, batch],
            (true, true) => vec![units, batch, time],
            (true, false) => vec![units, time, batch],
        }
    }
}

impl Expansion for SequenceRnn {
    fn name(&self) -> &str {
        NAME
    }

    fn check(
        &self,
        cx: &Context<'_>,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let cell = &self.params.cell;
        let (n_in, n_out) = cell.kind().default_arity();
        expect_arity(NAME, "input", inputs, n_in)?;
        expect_arity(NAME, "output", outputs, n_out)?;
        let (_, batch, time) = self.dims(&ranked(cx, NAME, "input", inputs, sequence::INPUT, 3)?);
        if time == 0 || batch == 0 {
            return Err(Error::CheckFailed {
                op: NAME.into(),
                detail: "input has an empty batch or time axis".into(),
            });
        }
        let weight = ranked(cx, NAME, "weight", inputs, cell.units_weight(), 2)?;
        for &slot in cell.state_slots() {
            optional_dims(cx, NAME, "state", inputs, slot, &[weight[1], batch])?;
        }
        if let Some(slot) = cell.aux_input() {
            if inputs[slot].is_some() {
                let (_, aux_batch, aux_time) = self.dims(&ranked(cx, NAME, "aux input", inputs, slot, 3)?);
                if (aux_batch, aux_time) != (batch, time) {
                    return Err(Error::CheckFailed {
                        op: NAME.into(),
                        detail: format!(
                            "aux input has batch {aux_batch} and {aux_time} steps, expected {batch} and {time}"
                        ),
                    });
                }
            }
        }
        required(NAME, "output", outputs, sequence::OUTPUT).map(drop)
    }

    fn expand(
        &self,
        ex: &mut Expander<'_, '_>,
        inputs: &mut [Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let cell = &self.params.cell;
        let input = required(NAME, "input", inputs, sequence::INPUT)?;
        let out = required(NAME, "output", outputs, sequence::OUTPUT)?;
        let (_, batch, time) = self.dims(&ex.shape(input)?);
        let units = ex.shape(required(NAME, "weight", inputs, cell.units_weight())?)?[1];

        ex.resolve_output(NAME, out, &self.output_shape(units, batch, time))?;
        let state_slots = cell.state_slots();
        for &slot in state_slots {
            if let Some(state_out) = outputs[slot] {
                ex.resolve_output(NAME, state_out, &[units, batch])?;
            }
        }
        let dtype = ex.dtype(out)?;

        let steps = self.step_inputs(ex, input, batch, time)?;
        let aux_steps = match cell.aux_input().and_then(|slot| inputs[slot]) {
            Some(aux) => Some(self.step_inputs(ex, aux, batch, time)?),
            None => None,
        };

        let kind = cell.kind();
        let mut cell_inputs = inputs.to_vec();
        let mut cell_outputs = vec![None; outputs.len()];
        let mut step_outputs = Vec::with_capacity(time);
        for (t, &step) in steps.iter().enumerate() {
            let last = t + 1 == time;
            cell_inputs[sequence::INPUT] = Some(step);
            if let (Some(slot), Some(aux)) = (cell.aux_input(), &aux_steps) {
                cell_inputs[slot] = Some(aux[t]);
            }
            let cell_out = if last && !self.params.return_sequences {
                out
            } else {
                ex.tensor(&dtype, true)
            };
            cell_outputs[sequence::OUTPUT] = Some(cell_out);
            for &slot in state_slots {
                cell_outputs[slot] = if last {
                    outputs[slot]
                } else {
                    Some(ex.tensor(&dtype, true))
                };
            }
            let sub_id = ex.node(kind.clone(), &cell_inputs, &cell_outputs)?;
            log::debug!("uid[{}] step {t} -> sub_uid[{sub_id}]", ex.uid());
            step_outputs.push(cell_out);
            // This step's state outputs feed the next step.
            for &slot in state_slots {
                cell_inputs[slot] = cell_outputs[slot];
            }
        }

        if self.params.return_sequences {
            self.gather(ex, &step_outputs, batch, out)?;
        }
        Ok(())
    }
}

impl SequenceRnn {
    /// Per-step `[feat, batch]` views of a sequence operand.
    fn step_inputs(
        &self,
        ex: &mut Expander<'_, '_>,
        seq: TensorId,
        batch: usize,
        time: usize,
    ) -> Result<Vec<TensorId>> {
        let seq = if self.params.time_major {
            seq
        } else {
            ex.transpose_time_major(seq, None, true)?
        };
        let mut slices = ex.split_timesteps(seq, time, true)?;
        ex.align_timesteps(&mut slices, true)?;
        slices
            .into_iter()
            .map(|slice| ex.reshape_split_output(slice, batch, true))
            .collect()
    }

    /// Stacks per-step `[units, batch]` outputs along time into `out`.
    fn gather(&self, ex: &mut Expander<'_, '_>, steps: &[TensorId], batch: usize, out: TensorId) -> Result<()> {
        let stacked = steps
            .iter()
            .map(|&s| ex.reshape_cell_output(s, batch, true))
            .collect::<Result<Vec<_>>>()?;
        if self.params.time_major {
            ex.concat(&stacked, 2, Some(out), true)?;
        } else {
            let joined = ex.concat(&stacked, 2, None, true)?;
            ex.transpose_time_major(joined, Some(out), true)?;
        }
        Ok(())
    }
}
