//! MPI Sintel: `<split>/<pass>/<scene>/frame_NNNN.png`.
//!
//! Consecutive frames of a scene form the pairs; the scene name is the
//! sequence id. Training flow lives at `training/flow/<scene>/frame_NNNN.flo`,
//! named after the first frame of the pair.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{
    file_name, load_image, require_dir, sorted_dirs, sorted_files, FlowDataset, FlowSample,
    FrameKey, GroundTruth, Split,
};
use crate::error::{EvalError, Result};
use crate::flow::io::read_flo;

/// Render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SintelPass {
    Clean,
    Final,
}

impl SintelPass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SintelPass::Clean => "clean",
            SintelPass::Final => "final",
        }
    }

    pub fn all() -> &'static [SintelPass] {
        &[SintelPass::Clean, SintelPass::Final]
    }
}

#[derive(Debug, Clone)]
struct SintelEntry {
    scene: String,
    frame: usize,
    image1: PathBuf,
    image2: PathBuf,
    flow: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct MpiSintel {
    name: String,
    entries: Vec<SintelEntry>,
}

impl MpiSintel {
    pub fn new(root: &Path, split: Split, pass: SintelPass) -> Result<Self> {
        let split_dir = match split {
            Split::Training | Split::Validation => "training",
            Split::Test => "test",
        };
        let image_root = root.join(split_dir).join(pass.as_str());
        require_dir(&image_root)?;
        let flow_root = root.join("training").join("flow");

        let mut entries = Vec::new();
        for scene_dir in sorted_dirs(&image_root)? {
            let scene = file_name(&scene_dir);
            let frames = sorted_files(&scene_dir, |name| name.ends_with(".png"))?;
            for (frame, pair) in frames.windows(2).enumerate() {
                let flow = match split {
                    Split::Training | Split::Validation => {
                        let stem = pair[0]
                            .file_stem()
                            .map(|s| s.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        Some(flow_root.join(&scene).join(format!("{}.flo", stem)))
                    }
                    Split::Test => None,
                };
                entries.push(SintelEntry {
                    scene: scene.clone(),
                    frame,
                    image1: pair[0].clone(),
                    image2: pair[1].clone(),
                    flow,
                });
            }
        }

        tracing::info!(
            pairs = entries.len(),
            pass = pass.as_str(),
            split = split_dir,
            "Loaded MPI Sintel"
        );
        Ok(Self {
            name: format!("sintel-{}", pass.as_str()),
            entries,
        })
    }
}

impl FlowDataset for MpiSintel {
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
            .ok_or_else(|| EvalError::Dataset(format!("sintel index {} out of range", index)))?;

        let ground_truth = match &entry.flow {
            Some(path) => Some(GroundTruth {
                flow: read_flo(path)?,
                valid: None,
            }),
            None => None,
        };

        Ok(FlowSample {
            image1: load_image(&entry.image1)?,
            image2: load_image(&entry.image2)?,
            key: FrameKey::Sequence {
                sequence: entry.scene.clone(),
                frame: entry.frame,
            },
            ground_truth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::{write_flow, write_rgb};
    use crate::flow::FlowField;

    #[test]
    fn test_pairs_follow_scene_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for (scene, frames) in [("alley_1", 3), ("bamboo_2", 2)] {
            for i in 1..=frames {
                let name = format!("frame_{:04}", i);
                write_rgb(
                    &root.join("training/clean").join(scene).join(format!("{}.png", name)),
                    8,
                    4,
                    i as u8,
                );
                write_flow(
                    &root.join("training/flow").join(scene).join(format!("{}.flo", name)),
                    &FlowField::constant(4, 8, i as f32, 0.0),
                );
            }
        }

        let sintel = MpiSintel::new(root, Split::Training, SintelPass::Clean).unwrap();
        assert_eq!(sintel.name(), "sintel-clean");
        // alley_1 gives two pairs, bamboo_2 one.
        assert_eq!(sintel.len(), 3);

        let keys: Vec<FrameKey> = (0..3).map(|i| sintel.get(i).unwrap().key).collect();
        assert_eq!(
            keys,
            vec![
                FrameKey::Sequence { sequence: "alley_1".into(), frame: 0 },
                FrameKey::Sequence { sequence: "alley_1".into(), frame: 1 },
                FrameKey::Sequence { sequence: "bamboo_2".into(), frame: 0 },
            ]
        );

        let second = sintel.get(1).unwrap();
        assert_eq!(second.image1.data()[[0, 0, 0]], 2.0);
        assert_eq!(second.ground_truth.unwrap().flow.vector(0, 0), (2.0, 0.0));
    }

    #[test]
    fn test_test_split_has_no_ground_truth() {
        let dir = tempfile::tempdir().unwrap();
        for i in 1..=2 {
            write_rgb(
                &dir.path().join(format!("test/final/market_1/frame_{:04}.png", i)),
                8,
                4,
                0,
            );
        }
        let sintel = MpiSintel::new(dir.path(), Split::Test, SintelPass::Final).unwrap();
        assert_eq!(sintel.len(), 1);
        assert!(sintel.get(0).unwrap().ground_truth.is_none());
    }

    #[test]
    fn test_missing_pass_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            MpiSintel::new(dir.path(), Split::Training, SintelPass::Clean),
            Err(EvalError::Config(_))
        ));
    }
}
