//! FlyingChairs: `data/NNNNN_img1.ppm`, `NNNNN_img2.ppm`, `NNNNN_flow.flo`.
//!
//! When `chairs_split.txt` exists at the root it assigns each pair to the
//! training (`1`) or validation (`2`) split. Without it every pair is used.

use std::path::{Path, PathBuf};

use super::{
    load_image, require_dir, sorted_files, FlowDataset, FlowSample, FrameKey, GroundTruth, Split,
};
use crate::error::{EvalError, Result};
use crate::flow::io::read_flo;

const SPLIT_FILE: &str = "chairs_split.txt";
const IMG1_SUFFIX: &str = "_img1.ppm";

#[derive(Debug, Clone)]
struct ChairsEntry {
    id: String,
    image1: PathBuf,
    image2: PathBuf,
    flow: PathBuf,
}

#[derive(Debug, Clone)]
pub struct FlyingChairs {
    name: String,
    entries: Vec<ChairsEntry>,
}

impl FlyingChairs {
    /// `Split::Training` selects split id 1, `Split::Validation` id 2.
    /// FlyingChairs has no test split.
    pub fn new(root: &Path, split: Split) -> Result<Self> {
        if split == Split::Test {
            return Err(EvalError::Config("FlyingChairs has no test split".to_string()));
        }
        let data_dir = root.join("data");
        require_dir(&data_dir)?;

        let firsts = sorted_files(&data_dir, |name| name.ends_with(IMG1_SUFFIX))?;
        let mut entries = Vec::with_capacity(firsts.len());
        for image1 in firsts {
            let name = super::file_name(&image1);
            let id = name.trim_end_matches(IMG1_SUFFIX).to_string();
            entries.push(ChairsEntry {
                image2: data_dir.join(format!("{}_img2.ppm", id)),
                flow: data_dir.join(format!("{}_flow.flo", id)),
                image1,
                id,
            });
        }

        let split_path = root.join(SPLIT_FILE);
        if split_path.is_file() {
            let wanted = match split {
                Split::Training => 1,
                Split::Validation | Split::Test => 2,
            };
            let ids = parse_split_file(&std::fs::read_to_string(&split_path)?)?;
            if ids.len() != entries.len() {
                return Err(EvalError::Dataset(format!(
                    "{} lists {} pairs but {} were found",
                    SPLIT_FILE,
                    ids.len(),
                    entries.len()
                )));
            }
            entries = entries
                .into_iter()
                .zip(ids)
                .filter(|(_, id)| *id == wanted)
                .map(|(entry, _)| entry)
                .collect();
        }

        tracing::info!(pairs = entries.len(), root = %root.display(), "Loaded FlyingChairs");
        Ok(Self {
            name: "chairs".to_string(),
            entries,
        })
    }
}

fn parse_split_file(contents: &str) -> Result<Vec<u8>> {
    contents
        .split_whitespace()
        .map(|token| {
            token.parse::<u8>().map_err(|e| {
                EvalError::Dataset(format!("bad entry '{}' in {}: {}", token, SPLIT_FILE, e))
            })
        })
        .collect()
}

impl FlowDataset for FlyingChairs {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, index: usize) -> Result<FlowSample> {
        let entry = self
            .entries
            .get(index)
            .ok_or_else(|| EvalError::Dataset(format!("chairs index {} out of range", index)))?;

        Ok(FlowSample {
            image1: load_image(&entry.image1)?,
            image2: load_image(&entry.image2)?,
            key: FrameKey::Named(entry.id.clone()),
            ground_truth: Some(GroundTruth {
                flow: read_flo(&entry.flow)?,
                valid: None,
            }),
        })
    }
}
