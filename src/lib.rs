//! Flow Eval Library
//!
//! Inference and benchmark evaluation for recurrent optical flow networks.
//! Runs an ONNX flow model over FlyingChairs, MPI Sintel and KITTI-2015,
//! with stride padding, warm-start propagation between frames of a sequence,
//! benchmark accuracy metrics and leaderboard submission export.

pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod flow;
pub mod metrics;
pub mod model;
pub mod padding;
pub mod propagate;
pub mod runner;
pub mod telemetry;

pub use config::{Benchmark, EvalConfig};
pub use dataset::{FlowDataset, FlowSample, FrameKey, GroundTruth, Split};
pub use error::{EvalError, Result};
pub use export::{ReportExporter, ValidationRecord};
pub use flow::{FlowField, Image, ValidityMask};
pub use metrics::{AccuracyReport, AggregationStrategy, ErrorSample, MetricAggregator};
pub use model::{FlowModel, FlowPrediction, OnnxFlowModel, OnnxModelOptions};
pub use padding::{PaddingMode, PaddingSpec, SizePadder};
pub use propagate::forward_interpolate;
pub use runner::{InferenceRunner, RunnerOptions, SequenceState, SubmissionFormat, SubmissionWriter};
