//! Operator kinds and their parameter blocks.
//!
//! Each variant carries the parameters of exactly one operator, so a node's
//! parameters are owned by its kind and released together with the node.

use crate::types::DType;

/// Activation functions available as primitives.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq)]
pub enum ActivationKind {
    /// Pass-through, for parameters where the activation is optional.
    None,
    Relu,
    Relu6,
    #[default]
    Tanh,
    Sigmoid,
    HardSigmoid,
}

impl ActivationKind {
    /// Applies the activation to one value.
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Self::None => x,
            Self::Relu => x.max(0.0),
            Self::Relu6 => x.clamp(0.0, 6.0),
            Self::Tanh => x.tanh(),
            Self::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Self::HardSigmoid => (0.2 * x + 0.5).clamp(0.0, 1.0),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Relu => "RELU",
            Self::Relu6 => "RELU6",
            Self::Tanh => "TANH",
            Self::Sigmoid => "SIGMOID",
            Self::HardSigmoid => "HARD_SIGMOID",
        }
    }
}

/// Parameters of a 2-D convolution over `[W, H, C, N]` inputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conv2dParams {
    /// Kernel size as `[w, h]`.
    pub ksize: [usize; 2],
    pub stride: [usize; 2],
    /// Padding as `[left, right, top, bottom]`.
    pub pad: [usize; 4],
    pub dilation: [usize; 2],
    pub group: usize,
    /// Number of output channels.
    pub weights: usize,
}

impl Conv2dParams {
    /// A `kw x kh` kernel with stride 1, no padding and no dilation.
    pub fn dense(kernel_w: usize, kernel_h: usize, weights: usize) -> Self {
        Self {
            ksize: [kernel_w, kernel_h],
            stride: [1, 1],
            pad: [0; 4],
            dilation: [1, 1],
            group: 1,
            weights,
        }
    }
}

/// Intermediate dtypes used by a recurrent cell expansion.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CellDtypes {
    /// Output dtype of input-side FC layers; `None` follows the output.
    pub input_fc: Option<DType>,
    /// Output dtype of recurrent-side FC layers; `None` follows the output.
    pub hstate_fc: Option<DType>,
}

/// Parameters of a vanilla RNN cell.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RnnCellParams {
    pub activation: ActivationKind,
    pub internal_dtype: CellDtypes,
}

/// How a GRU cell combines the reset gate with the recurrent candidate.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum GruResetMode {
    /// `act(W_ic x + r * (W_hc h + b_hc) + b_ic)`.
    #[default]
    LinearBeforeReset,
    /// `act(W_ic x + W_hc (r * h) + b_ic + b_hc)`.
    ResetBeforeLinear,
}

/// Parameters of a GRU cell.
#[derive(Clone, Debug, PartialEq)]
pub struct GruCellParams {
    pub activation: ActivationKind,
    pub gate_activation: ActivationKind,
    pub reset_mode: GruResetMode,
    pub internal_dtype: CellDtypes,
}

impl Default for GruCellParams {
    fn default() -> Self {
        Self {
            activation: ActivationKind::Tanh,
            gate_activation: ActivationKind::Sigmoid,
            reset_mode: GruResetMode::default(),
            internal_dtype: CellDtypes::default(),
        }
    }
}

/// Parameters of an LSTM cell.
#[derive(Clone, Debug, PartialEq)]
pub struct LstmCellParams {
    /// Applied to the cell candidate and to the new cell state.
    pub activation: ActivationKind,
    pub gate_activation: ActivationKind,
    /// Added to the forget gate pre-activation.
    pub forget_bias: f32,
    pub internal_dtype: CellDtypes,
}

impl Default for LstmCellParams {
    fn default() -> Self {
        Self {
            activation: ActivationKind::Tanh,
            gate_activation: ActivationKind::Sigmoid,
            forget_bias: 0.0,
            internal_dtype: CellDtypes::default(),
        }
    }
}

/// The cell a sequence operator unrolls.
#[derive(Clone, Debug, PartialEq)]
pub enum SequenceCell {
    Rnn(RnnCellParams),
    Gru(GruCellParams),
    Lstm(LstmCellParams),
}

impl SequenceCell {
    /// The cell's own operator kind.
    pub fn kind(&self) -> OpKind {
        match self {
            Self::Rnn(p) => OpKind::RnnCell(p.clone()),
            Self::Gru(p) => OpKind::GruCell(p.clone()),
            Self::Lstm(p) => OpKind::LstmCell(p.clone()),
        }
    }

    /// Slots carrying recurrent state. Each index names both the state
    /// input and the matching state output.
    pub fn state_slots(&self) -> &'static [usize] {
        match self {
            Self::Rnn(_) => &[rnn_cell::H_STATE],
            Self::Gru(_) => &[gru_cell::H_STATE],
            Self::Lstm(_) => &[lstm_cell::H_STATE, lstm_cell::C_STATE],
        }
    }

    /// A required `[in, units]` weight that fixes the cell's unit count.
    pub fn units_weight(&self) -> usize {
        match self {
            Self::Rnn(_) => rnn_cell::WEIGHT_I,
            Self::Gru(_) => gru_cell::W_I2R,
            Self::Lstm(_) => lstm_cell::W_I2F,
        }
    }

    /// Slot of an extra per-step sequence operand, if the cell has one.
    pub fn aux_input(&self) -> Option<usize> {
        match self {
            Self::Rnn(_) => Some(rnn_cell::AUX_INPUT),
            Self::Gru(_) | Self::Lstm(_) => None,
        }
    }
}

/// Parameters of a unidirectional sequence operator.
#[derive(Clone, Debug, PartialEq)]
pub struct SequenceParams {
    pub cell: SequenceCell,
    /// `[features, batch, time]` when set, `[features, time, batch]` otherwise.
    pub time_major: bool,
    /// Emit every step's output rather than only the last one.
    pub return_sequences: bool,
}

/// An operator invocation kind together with its parameters.
#[derive(Clone, Debug, PartialEq)]
pub enum OpKind {
    FullyConnected { axis: usize, weights: usize },
    Conv2d(Conv2dParams),
    Add,
    Subtract,
    Multiply,
    Activation(ActivationKind),
    Permute { perm: Vec<usize> },
    /// Target shape; at most one entry may be `-1` and is inferred.
    Reshape { size: Vec<isize> },
    Split { axis: usize, slices: Vec<usize> },
    Concat { axis: usize },
    DataConvert,
    RnnCell(RnnCellParams),
    GruCell(GruCellParams),
    LstmCell(LstmCellParams),
    SequenceRnn(SequenceParams),
    /// A user-registered operator.
    Custom { name: String },
}

/// Slot indices of [`OpKind::RnnCell`].
pub mod rnn_cell {
    pub const INPUT: usize = 0;
    pub const H_STATE: usize = 1;
    pub const WEIGHT_I: usize = 2;
    pub const WEIGHT_H: usize = 3;
    pub const BIAS: usize = 4;
    pub const AUX_INPUT: usize = 5;
    pub const AUX_WEIGHT: usize = 6;
    pub const INPUT_COUNT: usize = 7;

    pub const OUTPUT: usize = 0;
    pub const OUT_H_STATE: usize = 1;
    pub const OUTPUT_COUNT: usize = 2;
}

/// Slot indices of [`OpKind::GruCell`].
pub mod gru_cell {
    pub const INPUT: usize = 0;
    pub const H_STATE: usize = 1;
    pub const W_I2R: usize = 2;
    pub const W_I2Z: usize = 3;
    pub const W_I2C: usize = 4;
    pub const W_H2R: usize = 5;
    pub const W_H2Z: usize = 6;
    pub const W_H2C: usize = 7;
    pub const B_I2R: usize = 8;
    pub const B_I2Z: usize = 9;
    pub const B_I2C: usize = 10;
    pub const B_H2R: usize = 11;
    pub const B_H2Z: usize = 12;
    pub const B_H2C: usize = 13;
    pub const INPUT_COUNT: usize = 14;

    pub const OUTPUT: usize = 0;
    pub const OUT_H_STATE: usize = 1;
    pub const OUTPUT_COUNT: usize = 2;
}

/// Slot indices of [`OpKind::LstmCell`].
///
/// Without `W_I2I` the cell couples its input gate to the forget gate
/// (`i = 1 - f`) and the `W_R2I`/`B_I` slots are ignored.
pub mod lstm_cell {
    pub const INPUT: usize = 0;
    pub const H_STATE: usize = 1;
    pub const C_STATE: usize = 2;
    pub const W_I2I: usize = 3;
    pub const W_I2F: usize = 4;
    pub const W_I2C: usize = 5;
    pub const W_I2O: usize = 6;
    pub const W_R2I: usize = 7;
    pub const W_R2F: usize = 8;
    pub const W_R2C: usize = 9;
    pub const W_R2O: usize = 10;
    pub const B_I: usize = 11;
    pub const B_F: usize = 12;
    pub const B_C: usize = 13;
    pub const B_O: usize = 14;
    pub const INPUT_COUNT: usize = 15;

    pub const OUTPUT: usize = 0;
    pub const OUT_H_STATE: usize = 1;
    pub const OUT_C_STATE: usize = 2;
    pub const OUTPUT_COUNT: usize = 3;
}

/// Slot indices of [`OpKind::SequenceRnn`].
///
/// A sequence takes exactly the slots of the cell it unrolls: the input is
/// the whole sequence, state slots hold the initial and final states, and
/// every other slot is forwarded to each step unchanged.
pub mod sequence {
    pub const INPUT: usize = 0;
    pub const H_STATE: usize = 1;

    pub const OUTPUT: usize = 0;
    pub const OUT_H_STATE: usize = 1;
}

impl OpKind {
    /// Registry name of the operator.
    pub fn name(&self) -> &str {
        match self {
            Self::FullyConnected { .. } => "FCL",
            Self::Conv2d(_) => "CONV2D",
            Self::Add => "ADD",
            Self::Subtract => "SUBTRACT",
            Self::Multiply => "MULTIPLY",
            Self::Activation(act) => act.name(),
            Self::Permute { .. } => "PERMUTE",
            Self::Reshape { .. } => "RESHAPE2",
            Self::Split { .. } => "SPLIT",
            Self::Concat { .. } => "CONCAT",
            Self::DataConvert => "DATACONVERT",
            Self::RnnCell(_) => "RNNCELL_OVXLIB",
            Self::GruCell(_) => "GRUCELL_OVXLIB",
            Self::LstmCell(_) => "LSTMUNIT_OVXLIB",
            Self::SequenceRnn(_) => "UNIDIRECTIONAL_SEQUENCE_RNN",
            Self::Custom { name } => name,
        }
    }

    /// Default `(inputs, outputs)` slot counts.
    ///
    /// Split and concat take their arity from the call site; their default
    /// reflects the parameters when known.
    pub fn default_arity(&self) -> (usize, usize) {
        match self {
            Self::FullyConnected { .. } | Self::Conv2d(_) => (3, 1),
            Self::Add | Self::Subtract | Self::Multiply => (2, 1),
            Self::Activation(_)
            | Self::Permute { .. }
            | Self::Reshape { .. }
            | Self::DataConvert
            | Self::Custom { .. } => (1, 1),
            Self::Split { slices, .. } => (1, slices.len()),
            Self::Concat { .. } => (2, 1),
            Self::RnnCell(_) => (rnn_cell::INPUT_COUNT, rnn_cell::OUTPUT_COUNT),
            Self::GruCell(_) => (gru_cell::INPUT_COUNT, gru_cell::OUTPUT_COUNT),
            Self::LstmCell(_) => (lstm_cell::INPUT_COUNT, lstm_cell::OUTPUT_COUNT),
            Self::SequenceRnn(p) => p.cell.kind().default_arity(),
        }
    }

    /// Returns `true` for operators realized by expansion into internal nodes.
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            Self::RnnCell(_) | Self::GruCell(_) | Self::LstmCell(_) | Self::SequenceRnn(_)
        )
    }
}
