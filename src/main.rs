//! Flow Eval - Command Line Entry Point
//!
//! Validates an ONNX optical flow model on a benchmark, or writes leaderboard
//! submission files for the benchmark's test split.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use flow_eval::config::load_config;
use flow_eval::dataset::{FlyingChairs, Kitti, MpiSintel, SintelPass};
use flow_eval::telemetry::{init_logging, LogConfig, LogGuard};
use flow_eval::{
    Benchmark, EvalConfig, FlowDataset, InferenceRunner, OnnxFlowModel, OnnxModelOptions,
    ReportExporter, RunnerOptions, Split, SubmissionFormat, SubmissionWriter, ValidationRecord,
};

/// Optical flow benchmark evaluation
#[derive(Parser, Debug)]
#[command(
    name = "flow-eval",
    version,
    about = "Evaluate optical flow models on Chairs, Sintel and KITTI",
    long_about = "Run an exported recurrent optical flow network over a benchmark, \
                  report endpoint error and threshold accuracies, or write \
                  leaderboard submission files."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate against ground truth and write validation reports
    Validate {
        #[command(flatten)]
        run: RunArgs,

        /// Directory for reports and comparison images
        #[arg(long, value_name = "DIR")]
        result_path: Option<PathBuf>,

        /// Save prediction/ground-truth comparison images
        #[arg(long)]
        save_images: bool,
    },
    /// Write submission files for the test split
    Submit {
        #[command(flatten)]
        run: RunArgs,

        /// Root directory of the submission files
        #[arg(long, value_name = "DIR")]
        output_path: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Configuration file (.json, otherwise XML); flags override it
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// ONNX model checkpoint
    #[arg(short, long, value_name = "FILE")]
    model: Option<PathBuf>,

    /// Benchmark to run
    #[arg(short, long, value_enum)]
    dataset: Option<Benchmark>,

    /// Root directory of the benchmark data
    #[arg(long, value_name = "DIR")]
    dataset_root: Option<PathBuf>,

    /// Refinement iterations (benchmark default when omitted)
    #[arg(short, long)]
    iters: Option<u32>,

    /// Initialize each pair from the previous pair of its sequence
    #[arg(long)]
    warm_start: bool,

    /// ONNX Runtime intra-op threads
    #[arg(long)]
    intra_threads: Option<usize>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl RunArgs {
    fn resolve(&self) -> Result<EvalConfig> {
        let mut config = match &self.config {
            Some(path) => {
                load_config(path).with_context(|| format!("Failed to load {}", path.display()))?
            }
            None => EvalConfig::default(),
        };

        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(benchmark) = self.dataset {
            config.benchmark = benchmark;
        }
        if let Some(root) = &self.dataset_root {
            config.dataset_root = root.clone();
        }
        if self.iters.is_some() {
            config.iters = self.iters;
        }
        if let Some(threads) = self.intra_threads {
            config.intra_threads = threads;
        }
        config.warm_start |= self.warm_start;
        if self.verbose {
            config.log_level = "debug".to_string();
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.command {
        Command::Validate {
            run,
            result_path,
            save_images,
        } => {
            let mut config = run.resolve()?;
            if let Some(path) = result_path {
                config.result_path = path.clone();
            }
            config.save_images |= *save_images;
            config
        }
        Command::Submit { run, output_path } => {
            let mut config = run.resolve()?;
            if let Some(path) = output_path {
                config.output_path = path.clone();
            }
            config
        }
    };

    let _log_guard: Option<LogGuard> = init_logging(&LogConfig::from_eval_config(&config))
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        benchmark = config.benchmark.name(),
        iters = config.effective_iters(),
        warm_start = config.warm_start,
        "Flow Eval starting"
    );

    config.validate()?;
    if matches!(cli.command, Command::Submit { .. }) && !config.benchmark.supports_submission() {
        bail!("{} has no submission format", config.benchmark.name());
    }

    let options = OnnxModelOptions {
        intra_threads: config.intra_threads,
        ..OnnxModelOptions::default()
    };
    let mut model = OnnxFlowModel::load(&config.model, &options)
        .with_context(|| format!("Failed to load model {}", config.model.display()))?;

    match cli.command {
        Command::Validate { .. } => run_validation(&config, &mut model),
        Command::Submit { .. } => run_submission(&config, &mut model),
    }
}

fn runner_options(config: &EvalConfig) -> RunnerOptions {
    RunnerOptions {
        iters: config.effective_iters(),
        warm_start: config.warm_start,
        ..RunnerOptions::for_benchmark(config.benchmark)
    }
}

fn validation_datasets(config: &EvalConfig) -> Result<Vec<Box<dyn FlowDataset>>> {
    let root = &config.dataset_root;
    let datasets: Vec<Box<dyn FlowDataset>> = match config.benchmark {
        Benchmark::Chairs => vec![Box::new(FlyingChairs::new(root, Split::Validation)?)],
        Benchmark::Sintel => {
            let mut passes: Vec<Box<dyn FlowDataset>> = Vec::new();
            for &pass in SintelPass::all() {
                passes.push(Box::new(MpiSintel::new(root, Split::Validation, pass)?));
            }
            passes
        }
        Benchmark::Kitti => vec![Box::new(Kitti::new(root, Split::Validation)?)],
    };
    Ok(datasets)
}

fn run_validation(config: &EvalConfig, model: &mut OnnxFlowModel) -> Result<()> {
    for dataset in validation_datasets(config)? {
        let mut options = runner_options(config);
        if config.save_images {
            let dir = config.result_path.join(format!("{}_img", dataset.name()));
            options.comparison_dir = Some(dir);
        }
        let runner = InferenceRunner::new(options);

        let start = Instant::now();
        let report = runner
            .validate(model, dataset.as_ref(), config.benchmark.aggregation())
            .with_context(|| format!("Validation of {} failed", dataset.name()))?;

        println!("Validation ({}) {}", dataset.name(), report);

        let record = ValidationRecord {
            dataset: dataset.name().to_string(),
            model: config.model.clone(),
            iters: runner.options().iters,
            warm_start: runner.options().warm_start,
            elapsed_s: start.elapsed().as_secs_f64(),
            report,
        };
        ReportExporter::export_all(&record, &config.result_path).with_context(|| {
            format!("Failed to write reports to {}", config.result_path.display())
        })?;
    }
    Ok(())
}

fn run_submission(config: &EvalConfig, model: &mut OnnxFlowModel) -> Result<()> {
    let runner = InferenceRunner::new(runner_options(config));
    let root = &config.dataset_root;
    let output = &config.output_path;

    match config.benchmark {
        Benchmark::Sintel => {
            for &pass in SintelPass::all() {
                let dataset = MpiSintel::new(root, Split::Test, pass)?;
                let writer = SubmissionWriter::spawn(SubmissionFormat::Sintel {
                    root: output.clone(),
                    pass: pass.as_str().to_string(),
                })?;
                let written = runner
                    .export_submission(model, &dataset, writer)
                    .with_context(|| format!("Sintel {} submission failed", pass.as_str()))?;
                info!(pass = pass.as_str(), written, "Sintel pass exported");
            }
        }
        Benchmark::Kitti => {
            let dataset = Kitti::new(root, Split::Test)?;
            let writer = SubmissionWriter::spawn(SubmissionFormat::Kitti { root: output.clone() })?;
            let written = runner
                .export_submission(model, &dataset, writer)
                .context("KITTI submission failed")?;
            info!(written, "KITTI exported");
        }
        Benchmark::Chairs => bail!("chairs has no submission format"),
    }

    println!("Submission written to {}", output.display());
    Ok(())
}
