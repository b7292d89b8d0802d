use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use miette::{Context, IntoDiagnostic};

use ovx_ir::{
    ActivationKind, DType, ExpandOptions, FcRouting, Graph, GruCellParams, GruResetMode,
    LstmCellParams, OpKind, RnnCellParams, SequenceCell, SequenceParams, TensorAttr, TensorId,
};

/// ovx: expand a unidirectional sequence RNN/GRU/LSTM and dump its sub-graph
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Recurrent cell to unroll
    #[arg(long, value_enum, default_value = "rnn")]
    cell: CellArg,

    /// Input features per step
    #[arg(long, default_value = "8")]
    features: usize,

    /// Batch size
    #[arg(long, default_value = "2")]
    batch: usize,

    /// Number of timesteps
    #[arg(long, default_value = "3")]
    time: usize,

    /// Hidden units
    #[arg(long, default_value = "4")]
    units: usize,

    /// Lay the sequence out as [feat, time, batch] instead of [feat, batch, time]
    #[arg(long)]
    batch_major: bool,

    /// Return only the last step's output
    #[arg(long)]
    last_only: bool,

    /// Cell activation: none, relu, relu6, tanh, sigmoid, hard-sigmoid
    #[arg(long, default_value = "tanh", value_parser = parse_activation)]
    activation: ActivationKind,

    /// GRU: apply the reset gate before the recurrent candidate layer
    #[arg(long)]
    reset_before_linear: bool,

    /// FC lowering: primitive, heuristic or convolution
    #[arg(long, default_value = "primitive")]
    fc_routing: FcRouting,

    /// Materialize every intermediate tensor
    #[arg(long)]
    no_virtual: bool,

    /// Target reads unaligned timestep slices directly
    #[arg(long)]
    stream_processor: bool,

    /// Also run compute on deterministic data and print the outputs
    #[arg(long)]
    compute: bool,

    /// LSTM: value added to the forget gate pre-activation
    #[arg(long, default_value = "0")]
    forget_bias: f32,

    /// Output path (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum CellArg {
    Rnn,
    Gru,
    Lstm,
}

fn parse_activation(s: &str) -> Result<ActivationKind, String> {
    match s {
        "none" => Ok(ActivationKind::None),
        "relu" => Ok(ActivationKind::Relu),
        "relu6" => Ok(ActivationKind::Relu6),
        "tanh" => Ok(ActivationKind::Tanh),
        "sigmoid" => Ok(ActivationKind::Sigmoid),
        "hard-sigmoid" => Ok(ActivationKind::HardSigmoid),
        _ => Err(format!("invalid activation '{s}'")),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

/// Deterministic values in `[-0.5, 0.5]`.
fn pattern(len: usize, seed: usize) -> Vec<f32> {
    (0..len)
        .map(|i| ((i * 7 + seed * 13) as f32 * 0.37).sin() * 0.5)
        .collect()
}

fn constant(graph: &mut Graph, shape: &[usize], seed: usize) -> miette::Result<TensorId> {
    let len = shape.iter().product();
    let id = graph.add_tensor(TensorAttr::constant(shape, DType::F32));
    graph
        .tensors_mut()
        .write(id, pattern(len, seed))
        .map_err(|e| miette::miette!("{e}"))?;
    Ok(id)
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    // 1. Build the sequence node.
    let options = ExpandOptions {
        fc_routing: cli.fc_routing,
        use_virtual_tensors: !cli.no_virtual,
        support_stream_processor: cli.stream_processor,
    };
    let mut graph = Graph::new(ovx_expand::builtin_registry(), options);

    let (feat, units) = (cli.features, cli.units);
    let input_shape = if cli.batch_major {
        [feat, cli.time, cli.batch]
    } else {
        [feat, cli.batch, cli.time]
    };
    let input = constant(&mut graph, &input_shape, 0)?;
    let (cell, weights) = match cli.cell {
        CellArg::Rnn => {
            let cell = SequenceCell::Rnn(RnnCellParams {
                activation: cli.activation,
                ..RnnCellParams::default()
            });
            let w_i = constant(&mut graph, &[feat, units], 1)?;
            let w_h = constant(&mut graph, &[units, units], 2)?;
            let bias = constant(&mut graph, &[units], 3)?;
            (cell, vec![Some(w_i), Some(w_h), Some(bias)])
        }
        CellArg::Gru => {
            let cell = SequenceCell::Gru(GruCellParams {
                activation: cli.activation,
                reset_mode: if cli.reset_before_linear {
                    GruResetMode::ResetBeforeLinear
                } else {
                    GruResetMode::LinearBeforeReset
                },
                ..GruCellParams::default()
            });
            let mut weights = Vec::new();
            for k in 0..3 {
                weights.push(Some(constant(&mut graph, &[feat, units], 1 + k)?));
            }
            for k in 0..3 {
                weights.push(Some(constant(&mut graph, &[units, units], 4 + k)?));
            }
            (cell, weights)
        }
        CellArg::Lstm => {
            let cell = SequenceCell::Lstm(LstmCellParams {
                activation: cli.activation,
                forget_bias: cli.forget_bias,
                ..LstmCellParams::default()
            });
            // No initial cell state; the cell starts from zero.
            let mut weights = vec![None];
            for k in 0..4 {
                weights.push(Some(constant(&mut graph, &[feat, units], 1 + k)?));
            }
            for k in 0..4 {
                weights.push(Some(constant(&mut graph, &[units, units], 5 + k)?));
            }
            for k in 0..4 {
                weights.push(Some(constant(&mut graph, &[units], 9 + k)?));
            }
            (cell, weights)
        }
    };
    let output = graph.add_tensor(TensorAttr::auto(DType::F32));
    let h_state = graph.add_tensor(TensorAttr::auto(DType::F32));
    let mut outputs = vec![Some(output), Some(h_state)];
    let c_state = matches!(cli.cell, CellArg::Lstm).then(|| graph.add_tensor(TensorAttr::auto(DType::F32)));
    if c_state.is_some() {
        outputs.push(c_state);
    }

    let mut inputs = vec![Some(input), None];
    inputs.extend(weights);
    let kind = OpKind::SequenceRnn(SequenceParams {
        cell,
        time_major: !cli.batch_major,
        return_sequences: !cli.last_only,
    });
    graph
        .add_node(kind, inputs, outputs, "sequence")
        .map_err(|e| miette::miette!("{e}"))?;

    // 2. Expand, optimize and optionally compute.
    graph
        .setup()
        .map_err(|e| miette::miette!("{e}"))
        .wrap_err("setup failed")?;
    graph
        .optimize()
        .map_err(|e| miette::miette!("{e}"))
        .wrap_err("optimize failed")?;
    if cli.compute {
        graph
            .compute()
            .map_err(|e| miette::miette!("{e}"))
            .wrap_err("compute failed")?;
    }

    // 3. Render.
    let mut text = ovx_ir::dump_graph(&graph);
    if cli.compute {
        let states = [("output", Some(output)), ("h_state", Some(h_state)), ("c_state", c_state)];
        for (label, id) in states.into_iter().filter_map(|(l, id)| id.map(|id| (l, id))) {
            let data = graph.tensors().data(id).map_err(|e| miette::miette!("{e}"))?;
            text.push_str(&format!("\n{label}: {data:?}\n"));
        }
    }

    // 4. Tear down.
    graph
        .deinit()
        .map_err(|e| miette::miette!("{e}"))
        .wrap_err("deinit failed")?;

    // 5. Write output.
    match &cli.output {
        Some(path) => std::fs::write(path, text)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to write {}", path.display()))?,
        None => print!("{text}"),
    }
    Ok(())
}
