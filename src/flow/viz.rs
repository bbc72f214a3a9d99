//! Flow field color coding for visual inspection.

use std::path::Path;

use super::{FlowField, Image};
use crate::error::Result;

/// Color-code a flow field: hue follows direction, brightness follows
/// magnitude relative to the largest vector in the field.
pub fn flow_to_rgb(flow: &FlowField) -> image::RgbImage {
    let (height, width) = flow.dims();

    let max_magnitude = flow
        .u()
        .iter()
        .zip(flow.v().iter())
        .map(|(u, v)| (u * u + v * v).sqrt())
        .fold(0.0f32, f32::max);

    image::RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let (u, v) = flow.vector(y as usize, x as usize);
        let magnitude = (u * u + v * v).sqrt();
        let hue = (v.atan2(u) + std::f32::consts::PI) / (2.0 * std::f32::consts::PI);
        let value = if max_magnitude > 0.0 {
            magnitude / max_magnitude
        } else {
            0.0
        };
        image::Rgb(hsv_to_rgb(hue, 1.0, value))
    })
}

fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> [u8; 3] {
    let h = (hue.rem_euclid(1.0)) * 6.0;
    let sector = h.floor() as u32 % 6;
    let f = h - h.floor();
    let p = value * (1.0 - saturation);
    let q = value * (1.0 - saturation * f);
    let t = value * (1.0 - saturation * (1.0 - f));

    let (r, g, b) = match sector {
        0 => (value, t, p),
        1 => (q, value, p),
        2 => (p, value, t),
        3 => (p, q, value),
        4 => (t, p, value),
        _ => (value, p, q),
    };

    let to_u8 = |c: f32| (c * 255.0).round().clamp(0.0, 255.0) as u8;
    [to_u8(r), to_u8(g), to_u8(b)]
}

/// Convert a raw 0-255 image back to 8-bit RGB, clamping out-of-range values.
pub fn image_to_rgb(image: &Image) -> image::RgbImage {
    let (height, width) = image.dims();
    let data = image.data();
    image::RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let channel = |c: usize| data[[c, y, x]].round().clamp(0.0, 255.0) as u8;
        image::Rgb([channel(0), channel(1), channel(2)])
    })
}

fn side_by_side(left: &image::RgbImage, right: &image::RgbImage) -> image::RgbImage {
    let width = left.width() + right.width();
    let height = left.height().max(right.height());
    let mut canvas = image::RgbImage::new(width, height);

    image::imageops::replace(&mut canvas, left, 0, 0);
    image::imageops::replace(&mut canvas, right, left.width() as i64, 0);
    canvas
}

/// Save prediction and ground truth side by side as one PNG.
pub fn save_comparison(
    prediction: &FlowField,
    ground_truth: &FlowField,
    path: &Path,
) -> Result<()> {
    side_by_side(&flow_to_rgb(prediction), &flow_to_rgb(ground_truth)).save(path)?;
    Ok(())
}

/// Save the input pair side by side as one PNG.
pub fn save_image_pair(image1: &Image, image2: &Image, path: &Path) -> Result<()> {
    side_by_side(&image_to_rgb(image1), &image_to_rgb(image2)).save(path)?;
    Ok(())
}
