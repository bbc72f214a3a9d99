//! Flow model collaborator.
//!
//! The harness only sees [`FlowModel`]; where and how the network runs is the
//! implementation's business.

mod onnx;

pub use onnx::{OnnxFlowModel, OnnxModelOptions};

use crate::error::Result;
use crate::flow::{FlowField, Image};

/// Output of one model call on a padded image pair.
#[derive(Debug, Clone)]
pub struct FlowPrediction {
    /// Flow at `1 / stride` resolution, used for warm starting.
    pub flow_low: FlowField,
    /// Flow at the padded input resolution.
    pub flow_full: FlowField,
}

/// An iterative flow estimator.
pub trait FlowModel {
    /// Downsampling factor padded inputs must be a multiple of.
    fn stride(&self) -> usize {
        8
    }

    /// Estimate flow from `image1` to `image2`.
    ///
    /// Images are already padded to a multiple of [`FlowModel::stride`].
    /// `flow_init`, when present, has the low-resolution shape.
    fn infer(
        &mut self,
        image1: &Image,
        image2: &Image,
        iters: u32,
        flow_init: Option<&FlowField>,
        test_mode: bool,
    ) -> Result<FlowPrediction>;
}

impl<M: FlowModel + ?Sized> FlowModel for Box<M> {
    fn stride(&self) -> usize {
        (**self).stride()
    }

    fn infer(
        &mut self,
        image1: &Image,
        image2: &Image,
        iters: u32,
        flow_init: Option<&FlowField>,
        test_mode: bool,
    ) -> Result<FlowPrediction> {
        (**self).infer(image1, image2, iters, flow_init, test_mode)
    }
}
