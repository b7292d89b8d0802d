#![no_main]

use libfuzzer_sys::fuzz_target;
use ovx_ir::{
    DType, ExpandOptions, FcRouting, Graph, GruCellParams, LstmCellParams, OpKind, RnnCellParams,
    SequenceCell, SequenceParams, TensorAttr,
};

fuzz_target!(|data: &[u8]| {
    if data.len() < 8 {
        return;
    }
    let dim = |b: u8, max: u8| usize::from(b % max) + 1;
    let (feat, batch, time, units) = (dim(data[0], 16), dim(data[1], 4), dim(data[2], 4), dim(data[3], 8));
    // Occasionally disagree with the input so checks get exercised.
    let weight_feat = if data[4] & 0x80 != 0 { dim(data[4], 16) } else { feat };
    let flags = data[5];
    let options = ExpandOptions {
        fc_routing: match data[6] % 3 {
            0 => FcRouting::AllPrimitive,
            1 => FcRouting::Heuristic,
            _ => FcRouting::AllConvolution,
        },
        use_virtual_tensors: flags & 1 != 0,
        support_stream_processor: flags & 2 != 0,
    };
    let time_major = flags & 4 != 0;
    let gru = flags & 8 != 0;
    let lstm = flags & 32 != 0;

    let mut graph = Graph::new(ovx_expand::builtin_registry(), options);
    let constant = |graph: &mut Graph, shape: &[usize]| {
        let len = shape.iter().product();
        let id = graph.add_tensor(TensorAttr::constant(shape, DType::F32));
        let values = (0..len).map(|i| f32::from(data[7 + i % (data.len() - 7)]) / 255.0 - 0.5);
        let _ = graph.tensors_mut().write(id, values.collect());
        id
    };
    let input_shape = if time_major { [feat, batch, time] } else { [feat, time, batch] };
    let mut inputs = vec![Some(constant(&mut graph, &input_shape)), None];
    let cell = if lstm {
        inputs.push(None);
        for _ in 0..4 {
            inputs.push(Some(constant(&mut graph, &[weight_feat, units])));
        }
        for _ in 0..4 {
            inputs.push(Some(constant(&mut graph, &[units, units])));
        }
        SequenceCell::Lstm(LstmCellParams::default())
    } else if gru {
        for _ in 0..3 {
            inputs.push(Some(constant(&mut graph, &[weight_feat, units])));
        }
        for _ in 0..3 {
            inputs.push(Some(constant(&mut graph, &[units, units])));
        }
        SequenceCell::Gru(GruCellParams::default())
    } else {
        inputs.push(Some(constant(&mut graph, &[weight_feat, units])));
        inputs.push(Some(constant(&mut graph, &[units, units])));
        SequenceCell::Rnn(RnnCellParams::default())
    };
    let out = graph.add_tensor(TensorAttr::auto(DType::F32));
    let h_out = graph.add_tensor(TensorAttr::auto(DType::F32));
    let kind = OpKind::SequenceRnn(SequenceParams {
        cell,
        time_major,
        return_sequences: flags & 16 != 0,
    });
    if graph
        .add_node(kind, inputs, vec![Some(out), Some(h_out)], "fuzz")
        .is_err()
    {
        return;
    }
    // Setup, optimize and compute may fail; none of them may panic, and
    // teardown must always succeed.
    let declared = graph.live_tensor_count();
    if graph.setup().is_ok() && graph.optimize().is_ok() {
        let _ = graph.compute();
    }
    assert!(graph.deinit().is_ok());
    assert_eq!(graph.live_tensor_count(), declared);
});
