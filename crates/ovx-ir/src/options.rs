//! Expansion options shared by every operator of a graph.

use std::fmt;
use std::str::FromStr;

/// How fully-connected layers inside a composite are lowered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FcRouting {
    /// Every FC goes through the FC primitive.
    #[default]
    AllPrimitive,
    /// Pick per layer from input alignment and quantization kinds.
    Heuristic,
    /// Every FC goes through a convolution with a reshaped weight.
    AllConvolution,
}

impl fmt::Display for FcRouting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AllPrimitive => "primitive",
            Self::Heuristic => "heuristic",
            Self::AllConvolution => "convolution",
        })
    }
}

impl FromStr for FcRouting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primitive" | "fc" => Ok(Self::AllPrimitive),
            "heuristic" => Ok(Self::Heuristic),
            "convolution" | "conv" => Ok(Self::AllConvolution),
            other => Err(format!(
                "unknown FC routing '{other}' (expected primitive, heuristic or convolution)"
            )),
        }
    }
}

/// Options consulted while expanding composite operators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpandOptions {
    pub fc_routing: FcRouting,
    /// Create intermediates as virtual tensors (storage deferred to compute).
    pub use_virtual_tensors: bool,
    /// The target reads unaligned timestep slices without a copy.
    pub support_stream_processor: bool,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            fc_routing: FcRouting::default(),
            use_virtual_tensors: true,
            support_stream_processor: false,
        }
    }
}
