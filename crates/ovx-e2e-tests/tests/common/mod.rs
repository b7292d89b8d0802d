use ndarray::{Array1, Array2};
use ovx_ir::{DType, ExpandOptions, Graph, TensorAttr, TensorId};

/// A graph over the builtin primitive and composite registry.
#[allow(dead_code)]
pub fn graph(options: ExpandOptions) -> Graph {
    Graph::new(ovx_expand::builtin_registry(), options)
}

/// Deterministic values in `[-0.5, 0.5)`.
#[allow(dead_code)]
pub fn values(len: usize, seed: u32) -> Vec<f32> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state % 1000) as f32 / 1000.0 - 0.5
        })
        .collect()
}

/// A materialized f32 constant.
#[allow(dead_code)]
pub fn constant(graph: &mut Graph, shape: &[usize], data: Vec<f32>) -> TensorId {
    let id = graph.add_tensor(TensorAttr::constant(shape, DType::F32));
    graph.tensors_mut().write(id, data).expect("constant data");
    id
}

/// An f32 tensor whose shape is resolved by its producer.
#[allow(dead_code)]
pub fn auto(graph: &mut Graph) -> TensorId {
    graph.add_tensor(TensorAttr::auto(DType::F32))
}

#[allow(dead_code)]
pub fn data(graph: &Graph, id: TensorId) -> Vec<f32> {
    graph.tensors().data(id).expect("tensor data").to_vec()
}

/// Weights of a tanh RNN cell, stored the way the engine reads them:
/// `[in, units]` with element `(i, o)` at `o * in + i`.
#[allow(dead_code)]
pub struct RnnWeights {
    pub w_i: Vec<f32>,
    pub w_h: Vec<f32>,
    pub bias: Vec<f32>,
}

#[allow(dead_code)]
impl RnnWeights {
    pub fn random(features: usize, units: usize, seed: u32) -> Self {
        Self {
            w_i: values(features * units, seed),
            w_h: values(units * units, seed + 1),
            bias: values(units, seed + 2),
        }
    }
}

/// Reference tanh RNN over a time-major `[feat, batch, time]` input.
/// Returns every step's state as a `(batch, units)` array, which flattens to
/// the engine's `[units, batch]` layout.
#[allow(dead_code)]
pub fn rnn_reference(
    x: &[f32],
    w: &RnnWeights,
    (features, batch, time, units): (usize, usize, usize, usize),
) -> Vec<Array2<f32>> {
    let w_i = Array2::from_shape_vec((units, features), w.w_i.clone()).expect("w_i shape");
    let w_h = Array2::from_shape_vec((units, units), w.w_h.clone()).expect("w_h shape");
    let bias = Array1::from_vec(w.bias.clone());
    let step = features * batch;
    let mut h = Array2::<f32>::zeros((batch, units));
    let mut states = Vec::with_capacity(time);
    for t in 0..time {
        let x_t = Array2::from_shape_vec((batch, features), x[t * step..(t + 1) * step].to_vec())
            .expect("step shape");
        h = (x_t.dot(&w_i.t()) + h.dot(&w_h.t()) + &bias).mapv(f32::tanh);
        states.push(h.clone());
    }
    states
}

#[allow(dead_code)]
pub fn assert_close(actual: &[f32], expected: impl IntoIterator<Item = f32>) {
    let expected: Vec<f32> = expected.into_iter().collect();
    assert_eq!(actual.len(), expected.len(), "length");
    for (i, (a, e)) in actual.iter().zip(&expected).enumerate() {
        assert!((a - e).abs() < 1e-5, "element {i}: {a} vs {e}");
    }
}
