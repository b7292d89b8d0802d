mod common;

use ovx_ir::{
    DType, DataType, Error, ExpandOptions, OpKind, Quantization, RnnCellParams, SequenceCell,
    SequenceParams, TensorAttr,
};

fn cell_kind() -> OpKind {
    OpKind::RnnCell(RnnCellParams::default())
}

#[test]
fn weight_shape_mismatch_names_the_node() {
    let mut graph = common::graph(ExpandOptions::default());
    let x = common::constant(&mut graph, &[3, 1], vec![0.0; 3]);
    let w_i = common::constant(&mut graph, &[5, 4], vec![0.0; 20]);
    let w_h = common::constant(&mut graph, &[4, 4], vec![0.0; 16]);
    let out = common::auto(&mut graph);
    graph
        .add_node(cell_kind(), vec![Some(x), None, Some(w_i), Some(w_h)], vec![Some(out)], "bad")
        .unwrap();
    let err = graph.setup().unwrap_err();
    assert!(matches!(&err, Error::Node { name, .. } if name == "bad"));
    assert!(matches!(err.root_cause(), Error::CheckFailed { .. }));
    assert!(graph.nodes()[0].op().workspace_stats().is_none());
}

#[test]
fn quantized_input_with_float_weight_fails_and_cleans_up() {
    let mut graph = common::graph(ExpandOptions::default());
    let declared_before = graph.live_tensor_count();
    let q = DType::quantized(
        DataType::U8,
        Quantization::AffineAsymmetric {
            scale: 0.5,
            zero_point: 128,
        },
    );
    let x = graph.add_tensor(TensorAttr::constant(&[4, 1], q));
    let w_i = common::constant(&mut graph, &[4, 2], vec![0.0; 8]);
    let w_h = common::constant(&mut graph, &[2, 2], vec![0.0; 4]);
    let out = common::auto(&mut graph);
    graph
        .add_node(cell_kind(), vec![Some(x), None, Some(w_i), Some(w_h)], vec![Some(out)], "q")
        .unwrap();
    let declared = graph.live_tensor_count();
    assert_eq!(declared, declared_before + 4);

    let err = graph.setup().unwrap_err();
    assert!(matches!(err.root_cause(), Error::QuantMismatch { .. }));
    // The zero state was created before the failure.
    assert!(graph.live_tensor_count() > declared);

    graph.deinit().unwrap();
    assert_eq!(graph.live_tensor_count(), declared);
}

#[test]
fn compute_before_setup_fails() {
    let mut graph = common::graph(ExpandOptions::default());
    let x = common::constant(&mut graph, &[2, 1], vec![1.0, 2.0]);
    let w = common::constant(&mut graph, &[2, 2], vec![0.0; 4]);
    let out = common::auto(&mut graph);
    graph
        .add_node(cell_kind(), vec![Some(x), None, Some(w), Some(w)], vec![Some(out)], "early")
        .unwrap();
    let err = graph.compute().unwrap_err();
    assert!(matches!(err.root_cause(), Error::NoWorkspace(_)));
}

#[test]
fn failing_cell_inside_sequence_reports_its_sub_id() {
    let mut graph = common::graph(ExpandOptions::default());
    // 16 f32 features per step keep every slice 64-byte aligned.
    let x = common::constant(&mut graph, &[16, 1, 3], vec![0.5; 48]);
    let w_i = common::constant(&mut graph, &[16, 2], vec![0.0; 32]);
    let w_h = common::constant(&mut graph, &[2, 2], vec![0.0; 4]);
    // The sequence does not look at the bias; the first cell rejects it.
    let bias = common::constant(&mut graph, &[5], vec![0.0; 5]);
    let out = common::auto(&mut graph);
    let kind = OpKind::SequenceRnn(SequenceParams {
        cell: SequenceCell::Rnn(RnnCellParams::default()),
        time_major: true,
        return_sequences: true,
    });
    graph
        .add_node(
            kind,
            vec![Some(x), None, Some(w_i), Some(w_h), Some(bias)],
            vec![Some(out)],
            "seq",
        )
        .unwrap();
    let declared = graph.live_tensor_count();

    let err = graph.setup().unwrap_err();
    let Error::Node { source, .. } = &err else {
        panic!("expected a node error, got {err}");
    };
    // Split, then one reshape per step, then the first cell.
    assert!(matches!(
        source.as_ref(),
        Error::SubNode { sub_id: 5, op, .. } if op == "RNNCELL_OVXLIB"
    ));
    assert!(matches!(err.root_cause(), Error::CheckFailed { .. }));

    graph.deinit().unwrap();
    assert_eq!(graph.live_tensor_count(), declared);
}
