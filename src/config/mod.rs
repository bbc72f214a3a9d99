//! Run configuration and serialization.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};
use crate::metrics::AggregationStrategy;
use crate::padding::PaddingMode;

/// Supported benchmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Benchmark {
    /// FlyingChairs validation split
    #[default]
    Chairs,
    /// MPI Sintel, clean and final passes
    Sintel,
    /// KITTI-2015
    Kitti,
}

impl Benchmark {
    pub fn name(&self) -> &'static str {
        match self {
            Benchmark::Chairs => "chairs",
            Benchmark::Sintel => "sintel",
            Benchmark::Kitti => "kitti",
        }
    }

    pub fn padding_mode(&self) -> PaddingMode {
        match self {
            Benchmark::Kitti => PaddingMode::BottomAligned,
            Benchmark::Chairs | Benchmark::Sintel => PaddingMode::Centered,
        }
    }

    /// KITTI averages EPE per image; the dense benchmarks pool pixels.
    pub fn aggregation(&self) -> AggregationStrategy {
        match self {
            Benchmark::Kitti => AggregationStrategy::PerSampleMean,
            Benchmark::Chairs | Benchmark::Sintel => AggregationStrategy::PooledPixels,
        }
    }

    /// Refinement iterations used when none are configured.
    pub fn default_iters(&self) -> u32 {
        match self {
            Benchmark::Sintel => 32,
            Benchmark::Chairs | Benchmark::Kitti => 24,
        }
    }

    /// Whether a leaderboard submission format exists.
    pub fn supports_submission(&self) -> bool {
        matches!(self, Benchmark::Sintel | Benchmark::Kitti)
    }
}

/// Evaluation run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "FlowEvalConfig", default)]
pub struct EvalConfig {
    /// ONNX checkpoint.
    pub model: PathBuf,
    /// Benchmark to run.
    pub benchmark: Benchmark,
    /// Root directory of the benchmark data.
    pub dataset_root: PathBuf,
    /// Directory for validation reports and images.
    pub result_path: PathBuf,
    /// Root directory for submission files.
    pub output_path: PathBuf,
    /// Refinement iterations; benchmark default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iters: Option<u32>,
    /// Initialize each pair from the previous pair of the same sequence.
    pub warm_start: bool,
    /// Write prediction/ground-truth comparison images during validation.
    pub save_images: bool,
    /// ONNX Runtime intra-op threads.
    pub intra_threads: usize,
    /// Log filter used when no environment override is set.
    pub log_level: String,
    /// Emit JSON log lines.
    pub log_json: bool,
    /// Also log to this file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::from("models/raft.onnx"),
            benchmark: Benchmark::default(),
            dataset_root: PathBuf::from("datasets"),
            result_path: PathBuf::from("runs/debug"),
            output_path: PathBuf::from("submission"),
            iters: None,
            warm_start: false,
            save_images: false,
            intra_threads: 4,
            log_level: "info".to_string(),
            log_json: false,
            log_file: None,
        }
    }
}

impl EvalConfig {
    /// Iterations for this run.
    pub fn effective_iters(&self) -> u32 {
        self.iters.unwrap_or_else(|| self.benchmark.default_iters())
    }

    /// Fail fast on paths and values that would break the run.
    pub fn validate(&self) -> Result<()> {
        if !self.model.is_file() {
            return Err(EvalError::Config(format!(
                "Checkpoint not found: {}",
                self.model.display()
            )));
        }
        if !self.dataset_root.is_dir() {
            return Err(EvalError::Config(format!(
                "Dataset root not found: {}",
                self.dataset_root.display()
            )));
        }
        if self.iters == Some(0) {
            return Err(EvalError::Config("iters must be positive".to_string()));
        }
        if self.intra_threads == 0 {
            return Err(EvalError::Config("intra_threads must be positive".to_string()));
        }
        Ok(())
    }
}

/// Load a configuration file. `.json` files are read as JSON, anything else
/// as XML.
pub fn load_config(path: &Path) -> Result<EvalConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        EvalError::Config(format!("Failed to read config {}: {}", path.display(), e))
    })?;

    if is_json(path) {
        serde_json::from_str(&contents).map_err(|e| parse_error(path, e))
    } else {
        quick_xml::de::from_str(&contents).map_err(|e| parse_error(path, e))
    }
}

/// Save a configuration file in the format implied by its extension.
pub fn save_config(config: &EvalConfig, path: &Path) -> Result<()> {
    let contents = if is_json(path) {
        serde_json::to_string_pretty(config)?
    } else {
        quick_xml::se::to_string(config).map_err(|e| EvalError::Serialization(e.to_string()))?
    };
    std::fs::write(path, contents)?;
    Ok(())
}

fn parse_error(path: &Path, err: impl std::fmt::Display) -> EvalError {
    EvalError::Config(format!("Failed to parse config {}: {}", path.display(), err))
}

fn is_json(path: &Path) -> bool {
    path.extension().map(|e| e == "json").unwrap_or(false)
}
