//! Leaderboard submission files.
//!
//! Encoding and disk writes run on a background thread so the next model
//! call does not wait on them. The first failed write stops the thread and
//! is reported by the next `submit` or by `finish`.

use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use crate::dataset::FrameKey;
use crate::error::{EvalError, Result};
use crate::flow::io::{write_flo, write_kitti_png};
use crate::flow::FlowField;

/// Pending writes before `submit` blocks.
const QUEUE_DEPTH: usize = 4;

/// Where and how each frame is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionFormat {
    /// `<root>/<pass>/<sequence>/frameNNNN.flo`, frames numbered from 1.
    Sintel { root: PathBuf, pass: String },
    /// `<root>/<frame_id>` as a 16-bit KITTI PNG.
    Kitti { root: PathBuf },
}

impl SubmissionFormat {
    pub fn path_for(&self, key: &FrameKey) -> Result<PathBuf> {
        match (self, key) {
            (SubmissionFormat::Sintel { root, pass }, FrameKey::Sequence { sequence, frame }) => {
                let file = format!("frame{:04}.flo", frame + 1);
                Ok(root.join(pass).join(sequence).join(file))
            }
            (SubmissionFormat::Kitti { root }, FrameKey::Named(frame_id)) => {
                Ok(root.join(frame_id))
            }
            _ => Err(EvalError::Writer(format!(
                "frame {} does not fit the {} submission layout",
                key,
                self.name()
            ))),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            SubmissionFormat::Sintel { .. } => "sintel",
            SubmissionFormat::Kitti { .. } => "kitti",
        }
    }

    fn write(&self, path: &Path, flow: &FlowField) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match self {
            SubmissionFormat::Sintel { .. } => write_flo(path, flow),
            SubmissionFormat::Kitti { .. } => write_kitti_png(path, flow),
        }
    }
}

struct WriteJob {
    path: PathBuf,
    flow: FlowField,
}

/// Background writer for one submission pass.
pub struct SubmissionWriter {
    format: SubmissionFormat,
    sender: Option<Sender<WriteJob>>,
    handle: Option<JoinHandle<Result<usize>>>,
}

impl SubmissionWriter {
    pub fn spawn(format: SubmissionFormat) -> Result<Self> {
        let (sender, receiver) = crossbeam_channel::bounded::<WriteJob>(QUEUE_DEPTH);
        let thread_format = format.clone();
        let handle = thread::Builder::new()
            .name("submission-writer".into())
            .spawn(move || Self::writer_thread(receiver, thread_format))?;

        Ok(Self {
            format,
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Queue one frame. Blocks while the queue is full.
    pub fn submit(&mut self, key: &FrameKey, flow: FlowField) -> Result<()> {
        let path = self.format.path_for(key)?;
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| EvalError::Writer("writer already finished".to_string()))?;

        if sender.send(WriteJob { path, flow }).is_err() {
            // The thread only hangs up after a failed write.
            return match self.join() {
                Err(e) => Err(e),
                Ok(_) => Err(EvalError::Writer("writer thread stopped".to_string())),
            };
        }
        Ok(())
    }

    /// Wait for queued frames and return how many were written.
    pub fn finish(mut self) -> Result<usize> {
        self.join()
    }

    fn join(&mut self) -> Result<usize> {
        self.sender = None;
        let handle = self
            .handle
            .take()
            .ok_or_else(|| EvalError::Writer("writer already finished".to_string()))?;
        handle
            .join()
            .map_err(|_| EvalError::Writer("writer thread panicked".to_string()))?
    }

    fn writer_thread(receiver: Receiver<WriteJob>, format: SubmissionFormat) -> Result<usize> {
        let mut written = 0;
        while let Ok(job) = receiver.recv() {
            format.write(&job.path, &job.flow).map_err(|e| {
                tracing::error!(path = %job.path.display(), error = %e, "Submission write failed");
                e
            })?;
            written += 1;
            tracing::trace!(path = %job.path.display(), "Wrote submission frame");
        }
        Ok(written)
    }
}

impl Drop for SubmissionWriter {
    fn drop(&mut self) {
        self.sender = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::io::read_kitti_png;

    #[test]
    fn test_sintel_path_is_one_based() {
        let format = SubmissionFormat::Sintel {
            root: PathBuf::from("submission"),
            pass: "final".to_string(),
        };
        let key = FrameKey::Sequence {
            sequence: "ambush_3".to_string(),
            frame: 0,
        };
        assert_eq!(
            format.path_for(&key).unwrap(),
            PathBuf::from("submission/final/ambush_3/frame0001.flo")
        );
    }

    #[test]
    fn test_kitti_path_keeps_frame_id() {
        let format = SubmissionFormat::Kitti {
            root: PathBuf::from("kitti_submission"),
        };
        let key = FrameKey::Named("000042_10.png".to_string());
        assert_eq!(
            format.path_for(&key).unwrap(),
            PathBuf::from("kitti_submission/000042_10.png")
        );
    }

    #[test]
    fn test_key_must_match_layout() {
        let format = SubmissionFormat::Kitti {
            root: PathBuf::from("out"),
        };
        let key = FrameKey::Sequence {
            sequence: "alley_1".to_string(),
            frame: 3,
        };
        assert!(matches!(format.path_for(&key), Err(EvalError::Writer(_))));
    }

    #[test]
    fn test_writer_flushes_on_finish() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SubmissionWriter::spawn(SubmissionFormat::Kitti {
            root: dir.path().join("flow"),
        })
        .unwrap();

        for id in 0..6 {
            let key = FrameKey::Named(format!("{:06}_10.png", id));
            writer.submit(&key, FlowField::constant(4, 5, id as f32, 1.5)).unwrap();
        }
        assert_eq!(writer.finish().unwrap(), 6);

        let (flow, valid) = read_kitti_png(&dir.path().join("flow/000003_10.png")).unwrap();
        assert_eq!(flow.vector(0, 0), (3.0, 1.5));
        assert_eq!(valid.count_valid(), 20);
    }

    #[test]
    fn test_failed_write_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the output directory should be.
        let blocker = dir.path().join("clean");
        std::fs::write(&blocker, b"").unwrap();

        let mut writer = SubmissionWriter::spawn(SubmissionFormat::Sintel {
            root: dir.path().to_path_buf(),
            pass: "clean".to_string(),
        })
        .unwrap();
        let key = FrameKey::Sequence {
            sequence: "alley_1".to_string(),
            frame: 0,
        };

        let mut result = Ok(());
        for _ in 0..(QUEUE_DEPTH + 2) {
            result = writer.submit(&key, FlowField::zeros(2, 2));
            if result.is_err() {
                break;
            }
        }
        let outcome = result.and_then(|_| writer.finish().map(|_| ()));
        assert!(outcome.is_err());
    }
}
