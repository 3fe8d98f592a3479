#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use thickness_elm::ElmError;
use thickness_elm::archive::{load_raw, load_signal};
use thickness_elm::config::ElmConfig;
use thickness_elm::data::{bias, prepare};
use thickness_elm::evaluate::{ComparisonSeries, evaluate, mse, save_predictions};
use thickness_elm::fit::FitMethod;
use thickness_elm::model::TrainedNetwork;
use thickness_elm::pipeline::{Elm, StageConfig};
use thickness_elm::visualizer::show_comparison;

#[derive(Parser)]
#[command(
    name = "thickness-elm",
    about = "Train and apply Extreme Learning Machines for thickness regression",
    long_about = "Fits a randomized-projection regression network (ELM) that predicts layer \
                  thickness from signal measurements. Hidden layers are random and fixed; \
                  only the output layer is fitted, in closed form."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a network and score it on the held-out split
    #[command(about = "Train an ELM and evaluate it on the held-out split (outputs: network.toml)")]
    Train(TrainArgs),

    /// Apply a saved network to new signal data
    #[command(about = "Apply a saved network to new data (outputs: predictions.tsv)")]
    Infer(InferArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum FitMethodCli {
    /// Moore-Penrose pseudo-inverse
    Pinv,
    /// SVD least-squares solver
    Lstsq,
}

impl From<FitMethodCli> for FitMethod {
    fn from(value: FitMethodCli) -> Self {
        match value {
            FitMethodCli::Pinv => FitMethod::PseudoInverse,
            FitMethodCli::Lstsq => FitMethod::LeastSquares,
        }
    }
}

#[derive(Args)]
struct TrainArgs {
    /// Path to the input matrix archive (.toml); overrides `input_path` in --config
    input: Option<PathBuf>,

    /// Run configuration file (.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Archive key of the signal array
    #[arg(long)]
    signal_key: Option<String>,

    /// Archive key of the thickness array
    #[arg(long)]
    thickness_key: Option<String>,

    /// Fraction of rows (taken in order) used for training
    #[arg(long)]
    train_fraction: Option<f64>,

    /// Seed for the random stage weights
    #[arg(long)]
    seed: Option<u64>,

    /// Width of an orthogonal random-mapping stage placed first
    #[arg(long, value_name = "WIDTH")]
    projection: Option<usize>,

    /// Width of an orthogonal autoencoder-style hidden stage after the projection
    #[arg(long, value_name = "WIDTH")]
    autoencoder: Option<usize>,

    /// Widths of the plain hidden stages, in order (comma separated)
    #[arg(long, value_name = "WIDTHS", value_delimiter = ',')]
    hidden: Vec<usize>,

    /// Use the sampled weights as-is, without QR orthogonalization
    #[arg(long)]
    no_orthogonalize: bool,

    /// Output-weight solver
    #[arg(long, value_enum)]
    fit_method: Option<FitMethodCli>,

    /// Where to write the trained network
    #[arg(long, default_value = "network.toml")]
    save: PathBuf,

    /// Also write held-out predictions and targets (thickness units) to this TSV file
    #[arg(long, value_name = "FILE")]
    predictions: Option<PathBuf>,

    /// Number of sorted test samples to plot
    #[arg(long)]
    plot_points: Option<usize>,

    /// Skip the comparison plot
    #[arg(long)]
    no_plot: bool,
}

#[derive(Args)]
struct InferArgs {
    /// Path to the matrix archive holding the new signal data
    input: PathBuf,

    /// Path to the trained network (.toml)
    #[arg(long)]
    network: PathBuf,

    /// Archive key of the signal array
    #[arg(long, default_value = thickness_elm::archive::DEFAULT_SIGNAL_KEY)]
    signal_key: String,

    /// Archive key of the thickness array, used for scoring when present
    #[arg(long, default_value = thickness_elm::archive::DEFAULT_THICKNESS_KEY)]
    thickness_key: String,

    /// Where to write the predictions
    #[arg(long, default_value = "predictions.tsv")]
    output: PathBuf,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Commands::Train(args)) => train(args),
        Some(Commands::Infer(args)) => infer(args),
        None => {
            let _ = Cli::command().print_help();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Merges the optional config file with command-line overrides.
fn resolve_config(args: &TrainArgs) -> Result<ElmConfig, ElmError> {
    let mut config = match &args.config {
        Some(path) => ElmConfig::load(path)?,
        None => ElmConfig::default(),
    };

    if let Some(input) = &args.input {
        config.input_path = Some(input.clone());
    }
    if let Some(key) = &args.signal_key {
        config.signal_key = key.clone();
    }
    if let Some(key) = &args.thickness_key {
        config.thickness_key = key.clone();
    }
    if let Some(fraction) = args.train_fraction {
        config.train_fraction = fraction;
    }
    if let Some(points) = args.plot_points {
        config.plot_points = points;
    }
    if let Some(seed) = args.seed {
        config.pipeline.seed = Some(seed);
    }
    if let Some(method) = args.fit_method {
        config.pipeline.fit_method = method.into();
    }
    if args.no_orthogonalize {
        config.pipeline.orthogonalize = false;
    }

    if args.projection.is_some() || args.autoencoder.is_some() || !args.hidden.is_empty() {
        let mut stages = Vec::new();
        if let Some(width) = args.projection {
            stages.push(StageConfig::projection(width));
        }
        if let Some(width) = args.autoencoder {
            stages.push(StageConfig::hidden(width, true));
        }
        stages.extend(args.hidden.iter().map(|&width| StageConfig::hidden(width, false)));
        config.pipeline.stages = stages;
    }

    config.validate()?;
    Ok(config)
}

fn train(args: TrainArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(&args)?;
    let input = config
        .input_path
        .clone()
        .ok_or_else(|| ElmError::InvalidInput {
            operation: "configuration",
            reason: "no input archive given (pass INPUT or set input_path)".to_string(),
        })?;

    println!("Loading data from: {}", input.display());
    let start = Instant::now();
    let raw = load_raw(&input, &config.signal_key, &config.thickness_key)?;
    let prepared = prepare(&raw, config.train_fraction)?;
    log::info!("Prepare time: {:.3}s", start.elapsed().as_secs_f64());

    println!(
        "Training on {} samples, testing on {} ({} stage(s))",
        prepared.training.n_samples(),
        prepared.testing.n_samples(),
        config.pipeline.stages.len()
    );
    let start = Instant::now();
    let elm = Elm::new(config.pipeline.clone())?;
    let network = elm
        .train(&prepared.training)?
        .with_normalization(prepared.normalization);
    log::info!("Training time: {:.3}s", start.elapsed().as_secs_f64());

    let start = Instant::now();
    let evaluation = evaluate(&network, &prepared.testing)?;
    log::info!("Testing time: {:.3}s", start.elapsed().as_secs_f64());
    let (approx, expected) = evaluation.denormalized(&network);
    println!("MSE (normalized): {:.6e}", evaluation.mse);
    println!(
        "MSE (thickness units): {:.6e}",
        mse(approx.view(), expected.view())?
    );

    network.save(&args.save)?;
    println!("Network saved to: {}", args.save.display());

    if let Some(path) = &args.predictions {
        save_predictions(path, approx.view(), Some(expected.view()))?;
        println!("Predictions saved to: {}", path.display());
    }

    if !args.no_plot {
        let series = ComparisonSeries::new(approx.view(), expected.view(), config.plot_points)?;
        show_comparison(&series)?;
    }

    Ok(())
}

fn infer(args: InferArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading network from: {}", args.network.display());
    let network = TrainedNetwork::load(&args.network)?;
    println!(
        "Network expects {} input columns (bias included) across {} stage(s)",
        network.input_width(),
        network.stages.len()
    );

    println!("Loading signal data from: {}", args.input.display());
    let (signal, thickness) = load_signal(&args.input, &args.signal_key, &args.thickness_key)?;
    let signal = bias(signal.view());
    println!("Loaded {} samples for prediction", signal.nrows());

    let predictions = network.predict_thickness(signal.view())?;
    if let Some(expected) = &thickness {
        println!(
            "MSE (thickness units): {:.6e}",
            mse(predictions.view(), expected.view())?
        );
    }

    save_predictions(
        &args.output,
        predictions.view(),
        thickness.as_ref().map(|t| t.view()),
    )?;
    println!("Predictions saved to: {}", args.output.display());

    Ok(())
}
