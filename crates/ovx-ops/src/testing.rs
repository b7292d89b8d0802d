use ovx_ir::{
    Context, DType, ExpandOptions, OpRegistry, Operator, Result, TensorAttr, TensorId, TensorTable,
};

/// Drives a single operator through setup, check and compute.
pub(crate) struct Harness {
    pub tensors: TensorTable,
    registry: OpRegistry,
    options: ExpandOptions,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            tensors: TensorTable::new(),
            registry: OpRegistry::new(),
            options: ExpandOptions::default(),
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

    pub fn run(
        &mut self,
        op: &mut dyn Operator,
        inputs: &[Option<TensorId>],
        outputs: &[Option<TensorId>],
    ) -> Result<()> {
        let mut inputs = inputs.to_vec();
        let mut cx = self.cx();
        op.setup(&mut cx, &mut inputs, outputs)?;
        op.check(&cx, &inputs, outputs)?;
        for &out in outputs.iter().flatten() {
            cx.tensors.materialize(out)?;
        }
        op.compute(&mut cx, &inputs, outputs)
    }

    pub fn shape(&self, id: TensorId) -> Vec<usize> {
        self.tensors.shape(id).unwrap().to_vec()
    }

    pub fn data(&self, id: TensorId) -> Vec<f32> {
        self.tensors.data(id).unwrap().to_vec()
    }
}
