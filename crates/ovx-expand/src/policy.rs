//! Lowering choices for the fully-connected layers of a cell.

use ovx_ir::TensorAttr;

pub use ovx_ir::FcRouting;

/// The lowering a single fully-connected layer takes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FcPath {
    /// The FC primitive.
    Primitive,
    /// A convolution over a reshaped input and weight.
    Convolution,
}

/// Paths for the input-side and recurrent-side layers of one cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellRoutes {
    pub input: FcPath,
    pub hstate: FcPath,
}

/// Returns `true` when a layer over `input` with `weight` is a good fit for
/// the convolution path: matching quantization schemes and an innermost
/// extent that is a multiple of 64.
pub fn fits_convolution(input: &TensorAttr, weight: &TensorAttr) -> bool {
    let aligned = input
        .shape
        .as_deref()
        .and_then(|s| s.first())
        .is_some_and(|&d| d % 64 == 0);
    aligned && input.dtype.quant.kind() == weight.dtype.quant.kind()
}

/// Decides the path of each layer of a cell.
///
/// Under [`FcRouting::Heuristic`] a layer qualifies for convolution per
/// [`fits_convolution`]; when both qualify the input-side layer stays on the
/// FC primitive so the two run on different units.
pub fn route_cell(routing: FcRouting, input_fits: bool, hstate_fits: bool) -> CellRoutes {
    let uniform = |path| CellRoutes {
        input: path,
        hstate: path,
    };
    match routing {
        FcRouting::AllPrimitive => uniform(FcPath::Primitive),
        FcRouting::AllConvolution => uniform(FcPath::Convolution),
        FcRouting::Heuristic => {
            let pick = |fits: bool| if fits { FcPath::Convolution } else { FcPath::Primitive };
            CellRoutes {
                input: pick(input_fits && !hstate_fits),
                hstate: pick(hstate_fits),
            }
        }
    }
}

/// Picks a `(kernel_h, kernel_w)` that tiles `input_size` elements.
///
/// Multi-batch layers only use `N x 1` kernels. Single-batch layers try a
/// square `N x N` kernel (N up to 8) first and fall back to `N x 1` (N up
/// to 7).
pub fn find_best_kernel_size(multi_batch: bool, input_size: usize) -> (usize, usize) {
    let tall = || (1..=7).rev().find(|k| input_size % k == 0).unwrap_or(1);
    if multi_batch {
        return (tall(), 1);
    }
    match (2..=8).rev().find(|k| input_size % (k * k) == 0) {
        Some(k) => (k, k),
        None => (tall(), 1),
    }
}
