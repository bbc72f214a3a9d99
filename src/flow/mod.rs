//! Dense image and flow field types.
//!
//! All grids are channel-first with an explicit `(height, width)`. The batch
//! dimension is only added at the model boundary.

pub mod io;
pub mod viz;

use ndarray::{s, Array2, Array3, ArrayView2, Axis};

use crate::error::{EvalError, Result};

/// Three-channel image, shape `(3, H, W)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    data: Array3<f32>,
}

impl Image {
    pub const CHANNELS: usize = 3;

    /// Wrap a `(3, H, W)` array.
    pub fn new(data: Array3<f32>) -> Result<Self> {
        if data.len_of(Axis(0)) != Self::CHANNELS {
            return Err(EvalError::Dataset(format!(
                "image must have {} channels, got {}",
                Self::CHANNELS,
                data.len_of(Axis(0))
            )));
        }
        Ok(Self { data })
    }

    pub fn zeros(height: usize, width: usize) -> Self {
        Self {
            data: Array3::zeros((Self::CHANNELS, height, width)),
        }
    }

    /// Convert an 8-bit RGB image, keeping the raw 0-255 range.
    pub fn from_rgb8(img: &image::RgbImage) -> Self {
        let (width, height) = img.dimensions();
        let shape = (Self::CHANNELS, height as usize, width as usize);
        let data = Array3::from_shape_fn(shape, |(c, y, x)| {
            img.get_pixel(x as u32, y as u32)[c] as f32
        });
        Self { data }
    }

    pub fn height(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn width(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// `(height, width)`
    pub fn dims(&self) -> (usize, usize) {
        (self.height(), self.width())
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }
}

/// Two-channel displacement field, shape `(2, H, W)`.
///
/// Channel 0 is the horizontal component `u`, channel 1 the vertical
/// component `v`, both in pixels, pointing from image1 into image2.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    data: Array3<f32>,
}

impl FlowField {
    pub const CHANNELS: usize = 2;

    /// Wrap a `(2, H, W)` array.
    pub fn new(data: Array3<f32>) -> Result<Self> {
        if data.len_of(Axis(0)) != Self::CHANNELS {
            return Err(EvalError::FlowFormat(format!(
                "flow field must have {} channels, got {}",
                Self::CHANNELS,
                data.len_of(Axis(0))
            )));
        }
        Ok(Self { data })
    }

    pub fn zeros(height: usize, width: usize) -> Self {
        Self {
            data: Array3::zeros((Self::CHANNELS, height, width)),
        }
    }

    /// Field with the same vector at every pixel.
    pub fn constant(height: usize, width: usize, u: f32, v: f32) -> Self {
        let data = Array3::from_shape_fn((Self::CHANNELS, height, width), |(c, _, _)| {
            if c == 0 {
                u
            } else {
                v
            }
        });
        Self { data }
    }

    /// Assemble a field from separate `u` and `v` planes.
    pub fn from_components(u: Array2<f32>, v: Array2<f32>) -> Result<Self> {
        if u.dim() != v.dim() {
            return Err(EvalError::shape("flow components", u.dim(), v.dim()));
        }
        let (height, width) = u.dim();
        let mut data = Array3::zeros((Self::CHANNELS, height, width));
        data.slice_mut(s![0, .., ..]).assign(&u);
        data.slice_mut(s![1, .., ..]).assign(&v);
        Ok(Self { data })
    }

    pub fn height(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn width(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// `(height, width)`
    pub fn dims(&self) -> (usize, usize) {
        (self.height(), self.width())
    }

    pub fn u(&self) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(0), 0)
    }

    pub fn v(&self) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(0), 1)
    }

    /// Flow vector `(u, v)` at row `y`, column `x`.
    pub fn vector(&self, y: usize, x: usize) -> (f32, f32) {
        (self.data[[0, y, x]], self.data[[1, y, x]])
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array3<f32> {
        &mut self.data
    }
}

/// Per-pixel validity, shape `(H, W)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidityMask {
    data: Array2<bool>,
}

impl ValidityMask {
    pub fn new(data: Array2<bool>) -> Self {
        Self { data }
    }

    pub fn filled(height: usize, width: usize, valid: bool) -> Self {
        Self {
            data: Array2::from_elem((height, width), valid),
        }
    }

    /// `(height, width)`
    pub fn dims(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn data(&self) -> &Array2<bool> {
        &self.data
    }

    pub fn count_valid(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }
}
