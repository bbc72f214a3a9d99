//! KITTI-2015: `<training|testing>/image_2/NNNNNN_10.png` and `_11.png`.
//!
//! Training ground truth is the 16-bit `flow_occ` PNG of the same name.

use std::path::{Path, PathBuf};

use super::{
    file_name, load_image, require_dir, sorted_files, FlowDataset, FlowSample, FrameKey,
    GroundTruth, Split,
};
use crate::error::{EvalError, Result};
use crate::flow::io::read_kitti_png;

#[derive(Debug, Clone)]
struct KittiEntry {
    frame_id: String,
    image1: PathBuf,
    image2: PathBuf,
    flow: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Kitti {
    entries: Vec<KittiEntry>,
}

impl Kitti {
    pub fn new(root: &Path, split: Split) -> Result<Self> {
        let split_dir = match split {
            Split::Training | Split::Validation => root.join("training"),
            Split::Test => root.join("testing"),
        };
        let image_dir = split_dir.join("image_2");
        require_dir(&image_dir)?;

        let entries = sorted_files(&image_dir, |name| name.ends_with("_10.png"))?
            .into_iter()
            .map(|image1| {
                let frame_id = file_name(&image1);
                let image2 = image_dir.join(frame_id.replace("_10.png", "_11.png"));
                let flow = match split {
                    Split::Training | Split::Validation => {
                        Some(split_dir.join("flow_occ").join(&frame_id))
                    }
                    Split::Test => None,
                };
                KittiEntry {
                    frame_id,
                    image1,
                    image2,
                    flow,
                }
            })
            .collect::<Vec<_>>();

        tracing::info!(pairs = entries.len(), root = %root.display(), "Loaded KITTI-2015");
        Ok(Self { entries })
    }
}

impl FlowDataset for Kitti {
    fn name(&self) -> &str {
        "kitti"
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, index: usize) -> Result<FlowSample> {
        let entry = self
            .entries
            .get(index)
            .ok_or_else(|| EvalError::Dataset(format!("kitti index {} out of range", index)))?;

        let ground_truth = match &entry.flow {
            Some(path) => {
                let (flow, valid) = read_kitti_png(path)?;
                Some(GroundTruth {
                    flow,
                    valid: Some(valid),
                })
            }
            None => None,
        };

        Ok(FlowSample {
            image1: load_image(&entry.image1)?,
            image2: load_image(&entry.image2)?,
            key: FrameKey::Named(entry.frame_id.clone()),
            ground_truth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::write_rgb;
    use crate::flow::io::write_kitti_png;
    use crate::flow::FlowField;

    #[test]
    fn test_training_pairs_carry_validity() {
        let dir = tempfile::tempdir().unwrap();
        let training = dir.path().join("training");
        write_rgb(&training.join("image_2/000000_10.png"), 6, 3, 1);
        write_rgb(&training.join("image_2/000000_11.png"), 6, 3, 2);
        std::fs::create_dir_all(training.join("flow_occ")).unwrap();
        let truth = FlowField::constant(3, 6, 2.0, -1.0);
        write_kitti_png(&training.join("flow_occ/000000_10.png"), &truth).unwrap();

        let kitti = Kitti::new(dir.path(), Split::Validation).unwrap();
        assert_eq!(kitti.len(), 1);

        let sample = kitti.get(0).unwrap();
        assert_eq!(sample.key, FrameKey::Named("000000_10.png".to_string()));
        assert_eq!(sample.image2.data()[[0, 0, 0]], 2.0);

        let gt = sample.ground_truth.unwrap();
        assert_eq!(gt.flow.vector(2, 5), (2.0, -1.0));
        assert_eq!(gt.valid.unwrap().count_valid(), 18);
    }

    #[test]
    fn test_missing_image_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(Kitti::new(dir.path(), Split::Test), Err(EvalError::Config(_))));
    }
}
