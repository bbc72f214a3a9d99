//! Stride padding for models with fixed downsampling requirements.
//!
//! A [`SizePadder`] is created per sample from the original image size. It
//! pads every input with edge replication up to the next multiple of the
//! stride and is consumed by [`SizePadder::unpad`], which slices the flow
//! back to the original size.

use ndarray::{s, Array3, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};
use crate::flow::{FlowField, Image};

/// Where the padding is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PaddingMode {
    /// Split evenly between both sides of each axis (general mode).
    #[default]
    Centered,
    /// Horizontal padding split evenly, all vertical padding below the image
    /// (KITTI).
    BottomAligned,
}

/// Padding amounts for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaddingSpec {
    pub left: usize,
    pub right: usize,
    pub top: usize,
    pub bottom: usize,
}

impl PaddingSpec {
    pub fn is_empty(&self) -> bool {
        self.left + self.right + self.top + self.bottom == 0
    }
}

/// Pads images to a stride multiple and removes the padding from the flow.
#[derive(Debug)]
pub struct SizePadder {
    height: usize,
    width: usize,
    spec: PaddingSpec,
}

impl SizePadder {
    /// Compute the padding for an image of `(height, width)`.
    pub fn new(dims: (usize, usize), stride: usize, mode: PaddingMode) -> Result<Self> {
        if stride == 0 {
            return Err(EvalError::Config("padding stride must be positive".to_string()));
        }
        let (height, width) = dims;
        let pad_h = padding_for(height, stride);
        let pad_w = padding_for(width, stride);

        let left = pad_w / 2;
        let right = pad_w - left;
        let (top, bottom) = match mode {
            PaddingMode::Centered => (pad_h / 2, pad_h - pad_h / 2),
            PaddingMode::BottomAligned => (0, pad_h),
        };

        Ok(Self {
            height,
            width,
            spec: PaddingSpec {
                left,
                right,
                top,
                bottom,
            },
        })
    }

    pub fn spec(&self) -> PaddingSpec {
        self.spec
    }

    /// Original `(height, width)`.
    pub fn original_dims(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// `(height, width)` after padding.
    pub fn padded_dims(&self) -> (usize, usize) {
        (
            self.height + self.spec.top + self.spec.bottom,
            self.width + self.spec.left + self.spec.right,
        )
    }

    /// Pad every image identically. All images must have the original size.
    pub fn pad(&self, images: &[&Image]) -> Result<Vec<Image>> {
        images
            .iter()
            .map(|image| {
                if image.dims() != self.original_dims() {
                    return Err(EvalError::shape("pad", self.original_dims(), image.dims()));
                }
                Image::new(replicate_pad(image.data(), self.spec))
            })
            .collect()
    }

    /// Remove the padding from a flow field of the padded size.
    pub fn unpad(self, flow: &FlowField) -> Result<FlowField> {
        if flow.dims() != self.padded_dims() {
            return Err(EvalError::shape("unpad", self.padded_dims(), flow.dims()));
        }
        let PaddingSpec { left, top, .. } = self.spec;
        let cropped = flow
            .data()
            .slice(s![.., top..top + self.height, left..left + self.width])
            .to_owned();
        FlowField::new(cropped)
    }
}

/// Amount needed to bring `dim` up to the next multiple of `stride`.
pub fn padding_for(dim: usize, stride: usize) -> usize {
    (stride - dim % stride) % stride
}

/// Edge-replicate a channel-first grid.
fn replicate_pad(data: &Array3<f32>, spec: PaddingSpec) -> Array3<f32> {
    if spec.is_empty() {
        return data.clone();
    }
    let channels = data.len_of(Axis(0));
    let height = data.len_of(Axis(1));
    let width = data.len_of(Axis(2));
    let out_h = height + spec.top + spec.bottom;
    let out_w = width + spec.left + spec.right;

    Array3::from_shape_fn((channels, out_h, out_w), |(c, y, x)| {
        let sy = y.saturating_sub(spec.top).min(height - 1);
        let sx = x.saturating_sub(spec.left).min(width - 1);
        data[[c, sy, sx]]
    })
}
