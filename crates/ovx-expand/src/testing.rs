use ovx_ir::{
    Context, DType, ExpandOptions, OpRegistry, Operator, Result, TensorAttr, TensorId, TensorTable,
};

/// A tensor table plus the builtin registry, for driving composites
/// without an outer graph.
pub(crate) struct Fixture {
    pub tensors: TensorTable,
    pub registry: OpRegistry,
    pub options: ExpandOptions,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_options(ExpandOptions::default())
    }

    pub fn with_options(options: ExpandOptions) -> Self {
        Self {
            tensors: TensorTable::new(),
            registry: crate::builtin_registry(),
            options,
        }
    }

    pub fn constant(&mut self, shape: &[usize], data: Vec<f32>) -> TensorId {
        let t = self.tensors.create(TensorAttr::constant(shape, DType::F32));
        self.tensors.write(t, data).unwrap();
        t
    }

    pub fn auto(&mut self) -> TensorId {
        self.tensors.create(TensorAttr::auto(DType::F32))
    }

    pub fn cx(&mut self) -> Context<'_> {
        Context::new(&mut self.tensors, &self.registry, &self.options, 0)
    }

    /// Runs init, setup, check and compute on `op`.
    pub fn run(
        &mut self,
        op: &mut dyn Operator,
        inputs: &mut [Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let mut cx = self.cx();
        op.init(&mut cx)?;
        op.setup(&mut cx, inputs, outputs)?;
        op.check(&cx, inputs, outputs)?;
        op.compute(&mut cx, inputs, outputs)
    }

    pub fn data(&self, id: TensorId) -> Vec<f32> {
        self.tensors.data(id).unwrap().to_vec()
    }

    pub fn shape(&self, id: TensorId) -> Vec<usize> {
        self.tensors.shape(id).unwrap().to_vec()
    }
}

/// Deterministic pseudo-random values in `[-0.5, 0.5)`.
pub(crate) fn values(len: usize, seed: u32) -> Vec<f32> {
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
