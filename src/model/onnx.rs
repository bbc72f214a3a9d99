//! ONNX Runtime backed flow model.
//!
//! Expects a graph exported with inputs `image1`, `image2` `(1, 3, H, W)`,
//! `flow_init` `(1, 2, H/S, W/S)` and `iters` `(1,)` i64, and two outputs in
//! order: the low-resolution flow and the upsampled flow.

use std::path::Path;

use ndarray::{Array1, Array3, Array4, Axis};

use super::{FlowModel, FlowPrediction};
use crate::error::{EvalError, Result};
use crate::flow::{FlowField, Image};

/// Session settings for [`OnnxFlowModel`].
#[derive(Debug, Clone)]
pub struct OnnxModelOptions {
    /// Threads ONNX Runtime may use inside one operator.
    pub intra_threads: usize,
    /// Downsampling factor of the exported network.
    pub stride: usize,
}

impl Default for OnnxModelOptions {
    fn default() -> Self {
        Self {
            intra_threads: 4,
            stride: 8,
        }
    }
}

/// Flow network loaded from an `.onnx` checkpoint.
pub struct OnnxFlowModel {
    session: ort::session::Session,
    stride: usize,
}

impl OnnxFlowModel {
    /// Load the checkpoint at `path`. A missing or unreadable checkpoint is a
    /// configuration error.
    pub fn load(path: &Path, options: &OnnxModelOptions) -> Result<Self> {
        if !path.is_file() {
            return Err(EvalError::Config(format!(
                "Checkpoint not found: {}",
                path.display()
            )));
        }
        if options.stride == 0 {
            return Err(EvalError::Config("model stride must be positive".to_string()));
        }

        ort::init()
            .with_name("FlowEval")
            .commit()
            .map_err(|e| EvalError::Model(format!("Failed to initialize ORT: {}", e)))?;

        let session = ort::session::Session::builder()
            .map_err(|e| EvalError::Model(format!("Failed to create session builder: {}", e)))?
            .with_intra_threads(options.intra_threads)
            .map_err(|e| EvalError::Model(format!("Failed to set threads: {}", e)))?
            .commit_from_file(path)
            .map_err(|e| {
                EvalError::Config(format!("Failed to load checkpoint {}: {}", path.display(), e))
            })?;

        tracing::info!(
            checkpoint = %path.display(),
            stride = options.stride,
            intra_threads = options.intra_threads,
            "Loaded flow model"
        );

        Ok(Self {
            session,
            stride: options.stride,
        })
    }
}

impl FlowModel for OnnxFlowModel {
    fn stride(&self) -> usize {
        self.stride
    }

    fn infer(
        &mut self,
        image1: &Image,
        image2: &Image,
        iters: u32,
        flow_init: Option<&FlowField>,
        test_mode: bool,
    ) -> Result<FlowPrediction> {
        if !test_mode {
            return Err(EvalError::Model(
                "exported graphs only carry the test-mode forward pass".to_string(),
            ));
        }

        let (height, width) = image1.dims();
        if image2.dims() != (height, width) {
            return Err(EvalError::shape("image pair", (height, width), image2.dims()));
        }
        if height % self.stride != 0 || width % self.stride != 0 {
            return Err(EvalError::shape(
                "model input (unpadded)",
                (
                    height.div_ceil(self.stride) * self.stride,
                    width.div_ceil(self.stride) * self.stride,
                ),
                (height, width),
            ));
        }
        let low_dims = (height / self.stride, width / self.stride);

        // Zero initialization is the same as no initialization.
        let init: Array4<f32> = match flow_init {
            Some(flow) => {
                if flow.dims() != low_dims {
                    return Err(EvalError::shape("flow_init", low_dims, flow.dims()));
                }
                flow.data().clone().insert_axis(Axis(0))
            }
            None => Array4::zeros((1, FlowField::CHANNELS, low_dims.0, low_dims.1)),
        };

        let tensor = |array: Array4<f32>| {
            ort::value::Tensor::from_array(array)
                .map_err(|e| EvalError::Model(format!("Failed to create tensor: {}", e)))
        };
        let image1 = tensor(image1.data().clone().insert_axis(Axis(0)))?;
        let image2 = tensor(image2.data().clone().insert_axis(Axis(0)))?;
        let flow_init = tensor(init)?;
        let iters = ort::value::Tensor::from_array(Array1::from_vec(vec![iters as i64]))
            .map_err(|e| EvalError::Model(format!("Failed to create tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![
                "image1" => image1,
                "image2" => image2,
                "flow_init" => flow_init,
                "iters" => iters,
            ])
            .map_err(|e| EvalError::Model(format!("Inference failed: {}", e)))?;

        let mut values = outputs.iter();
        let (_, low) = values
            .next()
            .ok_or_else(|| EvalError::Model("model produced no outputs".to_string()))?;
        let (_, full) = values
            .next()
            .ok_or_else(|| EvalError::Model("model produced a single output".to_string()))?;

        let (_shape, low) = low
            .try_extract_tensor::<f32>()
            .map_err(|e| EvalError::Model(format!("Failed to extract flow_low: {}", e)))?;
        let (_shape, full) = full
            .try_extract_tensor::<f32>()
            .map_err(|e| EvalError::Model(format!("Failed to extract flow_up: {}", e)))?;

        Ok(FlowPrediction {
            flow_low: flow_from_slice(low, low_dims, "flow_low")?,
            flow_full: flow_from_slice(full, (height, width), "flow_up")?,
        })
    }
}

/// Copy a `(1, 2, H, W)` output buffer into a flow field.
fn flow_from_slice(data: &[f32], dims: (usize, usize), name: &str) -> Result<FlowField> {
    let expected = FlowField::CHANNELS * dims.0 * dims.1;
    if data.len() != expected {
        return Err(EvalError::Model(format!(
            "{} has {} values, expected {} for a 2x{}x{} field",
            name,
            data.len(),
            expected,
            dims.0,
            dims.1
        )));
    }
    let array = Array3::from_shape_vec((FlowField::CHANNELS, dims.0, dims.1), data.to_vec())?;
    FlowField::new(array)
}
