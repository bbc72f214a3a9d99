//! Benchmark datasets.
//!
//! Every loader produces [`FlowSample`]s in a fixed order. Frames of one
//! sequence are contiguous and ordered by increasing frame index, which the
//! warm-start logic in [`crate::runner`] relies on.

mod chairs;
mod kitti;
mod sintel;

pub use chairs::FlyingChairs;
pub use kitti::Kitti;
pub use sintel::{MpiSintel, SintelPass};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};
use crate::flow::{FlowField, Image, ValidityMask};

/// Which half of a benchmark to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Split {
    /// Training pairs with ground truth.
    #[default]
    Training,
    /// Pairs with ground truth reserved for evaluation. Benchmarks without a
    /// dedicated validation split evaluate on their training pairs.
    Validation,
    /// Held-out split without ground truth.
    Test,
}

/// Identifies the frame a sample belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKey {
    /// Frame `frame` (0-based) of a temporally ordered sequence.
    Sequence { sequence: String, frame: usize },
    /// A standalone pair, e.g. a KITTI frame id like `000000_10.png`.
    Named(String),
}

impl FrameKey {
    /// Sequence id, if the pair is part of a sequence.
    pub fn sequence(&self) -> Option<&str> {
        match self {
            FrameKey::Sequence { sequence, .. } => Some(sequence),
            FrameKey::Named(_) => None,
        }
    }
}

impl std::fmt::Display for FrameKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameKey::Sequence { sequence, frame } => write!(f, "{}/{}", sequence, frame),
            FrameKey::Named(name) => write!(f, "{}", name),
        }
    }
}

/// Ground truth flow and, for sparse benchmarks, its validity.
#[derive(Debug, Clone)]
pub struct GroundTruth {
    pub flow: FlowField,
    pub valid: Option<ValidityMask>,
}

/// One image pair.
#[derive(Debug, Clone)]
pub struct FlowSample {
    pub image1: Image,
    pub image2: Image,
    pub key: FrameKey,
    pub ground_truth: Option<GroundTruth>,
}

/// Indexed collection of samples.
pub trait FlowDataset {
    fn name(&self) -> &str;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Result<FlowSample>;
}

/// Dataset over samples already in memory.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    name: String,
    samples: Vec<FlowSample>,
}

impl InMemoryDataset {
    pub fn new(name: impl Into<String>, samples: Vec<FlowSample>) -> Self {
        Self {
            name: name.into(),
            samples,
        }
    }
}

impl FlowDataset for InMemoryDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Result<FlowSample> {
        self.samples
            .get(index)
            .cloned()
            .ok_or_else(|| {
                EvalError::Dataset(format!("index {} out of range for {}", index, self.name))
            })
    }
}

/// Load an image file as raw 0-255 RGB.
pub fn load_image(path: &Path) -> Result<Image> {
    let img = image::open(path)?.to_rgb8();
    Ok(Image::from_rgb8(&img))
}

/// Require a directory to exist before any sample is read.
pub(crate) fn require_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(EvalError::Config(format!(
            "Dataset directory not found: {}",
            path.display()
        )))
    }
}

/// Files in `dir` whose name satisfies `keep`, sorted by name.
pub(crate) fn sorted_files<F>(dir: &Path, keep: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(&keep)
            .unwrap_or(false);
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Subdirectories of `dir`, sorted by name.
pub(crate) fn sorted_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
