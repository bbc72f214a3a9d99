//! Per-sample inference and dataset passes.
//!
//! One step is: pad the pair, run the model (warm-started from the previous
//! pair of the same sequence when enabled), unpad the flow, and propagate the
//! low-resolution output into the next [`SequenceState`]. Steps run strictly
//! in dataset order because each initializer depends on the previous step.

mod submission;

pub use submission::{SubmissionFormat, SubmissionWriter};

use std::path::PathBuf;
use std::time::Instant;

use crate::config::Benchmark;
use crate::dataset::FlowDataset;
use crate::error::{EvalError, Result};
use crate::flow::viz::{save_comparison, save_image_pair};
use crate::flow::{FlowField, Image};
use crate::metrics::{AccuracyReport, AggregationStrategy, ErrorSample, MetricAggregator};
use crate::model::FlowModel;
use crate::padding::{PaddingMode, SizePadder};
use crate::propagate::forward_interpolate;

/// Warm-start state carried between consecutive steps.
///
/// Holds the sequence id of the previous sample and the initializer derived
/// from its low-resolution flow.
#[derive(Debug, Clone, Default)]
pub struct SequenceState {
    sequence: Option<String>,
    flow_init: Option<FlowField>,
}

impl SequenceState {
    /// State after a sample of `sequence` produced `flow_init`.
    pub fn carry(sequence: &str, flow_init: FlowField) -> Self {
        Self {
            sequence: Some(sequence.to_string()),
            flow_init: Some(flow_init),
        }
    }

    /// Initializer for a sample of `sequence`.
    ///
    /// Returns `None` whenever the sequence differs from the previous
    /// sample's, or the sample has no sequence at all.
    pub fn enter(self, sequence: Option<&str>) -> Option<FlowField> {
        match (sequence, self.sequence.as_deref()) {
            (Some(current), Some(previous)) if current == previous => self.flow_init,
            _ => None,
        }
    }

    pub fn sequence(&self) -> Option<&str> {
        self.sequence.as_deref()
    }

    pub fn has_flow_init(&self) -> bool {
        self.flow_init.is_some()
    }
}

/// Result of one step.
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// Flow at the original image resolution.
    pub flow: FlowField,
    /// Whether the model was warm-started.
    pub warm_started: bool,
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Refinement iterations per model call.
    pub iters: u32,
    /// Propagate flow between pairs of the same sequence.
    pub warm_start: bool,
    pub padding_mode: PaddingMode,
    /// Validation writes flow comparison and input pair images here when set.
    pub comparison_dir: Option<PathBuf>,
}

impl RunnerOptions {
    /// Defaults of a benchmark: its iteration count and padding mode, no
    /// warm start.
    pub fn for_benchmark(benchmark: Benchmark) -> Self {
        Self {
            iters: benchmark.default_iters(),
            warm_start: false,
            padding_mode: benchmark.padding_mode(),
            comparison_dir: None,
        }
    }
}

/// Drives a [`FlowModel`] over datasets.
#[derive(Debug, Clone)]
pub struct InferenceRunner {
    options: RunnerOptions,
}

impl InferenceRunner {
    pub fn new(options: RunnerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Run one image pair. `state` is consumed and the state for the next
    /// sample is returned.
    pub fn step<M: FlowModel + ?Sized>(
        &self,
        model: &mut M,
        image1: &Image,
        image2: &Image,
        sequence: Option<&str>,
        state: SequenceState,
    ) -> Result<(StepOutput, SequenceState)> {
        if image1.dims() != image2.dims() {
            return Err(EvalError::shape("image pair", image1.dims(), image2.dims()));
        }

        let flow_init = if self.options.warm_start {
            state.enter(sequence)
        } else {
            None
        };

        let padder = SizePadder::new(image1.dims(), model.stride(), self.options.padding_mode)?;
        let padded = padder.pad(&[image1, image2])?;
        let prediction = model.infer(
            &padded[0],
            &padded[1],
            self.options.iters,
            flow_init.as_ref(),
            true,
        )?;
        let flow = padder.unpad(&prediction.flow_full)?;

        let next = match sequence {
            Some(sequence) if self.options.warm_start => {
                SequenceState::carry(sequence, forward_interpolate(&prediction.flow_low))
            }
            _ => SequenceState::default(),
        };

        Ok((
            StepOutput {
                flow,
                warm_started: flow_init.is_some(),
            },
            next,
        ))
    }

    /// Evaluate every sample against its ground truth.
    ///
    /// Any failing sample aborts the pass; no partial report is returned.
    pub fn validate<M, D>(
        &self,
        model: &mut M,
        dataset: &D,
        strategy: AggregationStrategy,
    ) -> Result<AccuracyReport>
    where
        M: FlowModel + ?Sized,
        D: FlowDataset + ?Sized,
    {
        let start = Instant::now();
        let mut aggregator = MetricAggregator::new(strategy);
        let mut state = SequenceState::default();

        if let Some(dir) = &self.options.comparison_dir {
            std::fs::create_dir_all(dir)?;
        }

        for index in 0..dataset.len() {
            let sample = dataset.get(index)?;
            let ground_truth = sample.ground_truth.as_ref().ok_or_else(|| {
                EvalError::Dataset(format!(
                    "{} sample {} has no ground truth",
                    dataset.name(),
                    sample.key
                ))
            })?;

            let (output, next) = self.step(
                model,
                &sample.image1,
                &sample.image2,
                sample.key.sequence(),
                state,
            )?;
            state = next;

            let errors = ErrorSample::from_flows(
                &output.flow,
                &ground_truth.flow,
                ground_truth.valid.as_ref(),
            )?;
            aggregator.add_sample(errors);

            if let Some(dir) = &self.options.comparison_dir {
                let flow_path = dir.join(format!("flow_comparison_{}.png", index));
                save_comparison(&output.flow, &ground_truth.flow, &flow_path)?;
                let pair_path = dir.join(format!("image_{}.png", index));
                save_image_pair(&sample.image1, &sample.image2, &pair_path)?;
            }

            tracing::debug!(
                dataset = dataset.name(),
                index,
                key = %sample.key,
                warm_started = output.warm_started,
                pixels = aggregator.pixel_count(),
                "Validated sample"
            );
        }

        let report = aggregator.finalize()?;
        tracing::info!(
            dataset = dataset.name(),
            samples = report.samples,
            pixels = report.pixels,
            epe = report.epe,
            elapsed_s = start.elapsed().as_secs_f64(),
            "Validation finished"
        );
        Ok(report)
    }

    /// Run every sample and hand the flow to `writer`. Returns the number of
    /// files written.
    pub fn export_submission<M, D>(
        &self,
        model: &mut M,
        dataset: &D,
        mut writer: SubmissionWriter,
    ) -> Result<usize>
    where
        M: FlowModel + ?Sized,
        D: FlowDataset + ?Sized,
    {
        let start = Instant::now();
        let mut state = SequenceState::default();

        for index in 0..dataset.len() {
            let sample = dataset.get(index)?;
            let (output, next) = self.step(
                model,
                &sample.image1,
                &sample.image2,
                sample.key.sequence(),
                state,
            )?;
            state = next;

            writer.submit(&sample.key, output.flow)?;
            tracing::debug!(
                dataset = dataset.name(),
                index,
                key = %sample.key,
                warm_started = output.warm_started,
                "Queued submission frame"
            );
        }

        let written = writer.finish()?;
        tracing::info!(
            dataset = dataset.name(),
            written,
            elapsed_s = start.elapsed().as_secs_f64(),
            "Submission finished"
        );
        Ok(written)
    }
}
