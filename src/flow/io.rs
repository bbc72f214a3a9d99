//! Flow file formats.
//!
//! - Middlebury `.flo`: `202021.25` magic, width and height as little-endian
//!   `i32`, then interleaved `u, v` little-endian `f32` in row-major order.
//! - KITTI 16-bit PNG: `R = 64 u + 2^15`, `G = 64 v + 2^15`, `B` = validity.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use ndarray::{Array2, Array3};

use super::{FlowField, ValidityMask};
use crate::error::{EvalError, Result};

pub const FLO_MAGIC: f32 = 202021.25;
/// Magic, width and height.
const FLO_HEADER_LEN: u64 = 12;

const KITTI_SCALE: f32 = 64.0;
const KITTI_OFFSET: f32 = 32768.0;

/// Write a `.flo` file, creating or truncating it.
pub fn write_flo(path: &Path, flow: &FlowField) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    encode_flo(&mut writer, flow)?;
    writer.flush()?;
    Ok(())
}

/// Read a `.flo` file.
pub fn read_flo(path: &Path) -> Result<FlowField> {
    let file = File::open(path)?;
    let payload = file.metadata()?.len().saturating_sub(FLO_HEADER_LEN);
    let mut reader = BufReader::new(file);
    decode_flo_bounded(&mut reader, Some(payload)).map_err(|e| match e {
        EvalError::FlowFormat(msg) => {
            EvalError::FlowFormat(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

pub fn encode_flo<W: Write>(writer: &mut W, flow: &FlowField) -> Result<()> {
    let (height, width) = flow.dims();
    writer.write_all(&FLO_MAGIC.to_le_bytes())?;
    writer.write_all(&(width as i32).to_le_bytes())?;
    writer.write_all(&(height as i32).to_le_bytes())?;

    let data = flow.data();
    for y in 0..height {
        for x in 0..width {
            writer.write_all(&data[[0, y, x]].to_le_bytes())?;
            writer.write_all(&data[[1, y, x]].to_le_bytes())?;
        }
    }
    Ok(())
}

pub fn decode_flo<R: Read>(reader: &mut R) -> Result<FlowField> {
    decode_flo_bounded(reader, None)
}

/// Decode with an optional number of payload bytes known to follow the
/// header, so a corrupt header is rejected before any data is read.
fn decode_flo_bounded<R: Read>(reader: &mut R, payload: Option<u64>) -> Result<FlowField> {
    let mut word = [0u8; 4];

    reader.read_exact(&mut word)?;
    let magic = f32::from_le_bytes(word);
    if magic != FLO_MAGIC {
        return Err(EvalError::FlowFormat(format!("bad magic number {}", magic)));
    }

    reader.read_exact(&mut word)?;
    let width = i32::from_le_bytes(word);
    reader.read_exact(&mut word)?;
    let height = i32::from_le_bytes(word);
    if width <= 0 || height <= 0 {
        return Err(EvalError::FlowFormat(format!(
            "invalid dimensions {}x{}",
            width, height
        )));
    }
    let (width, height) = (width as usize, height as usize);

    let expected = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(FlowField::CHANNELS * 4))
        .ok_or_else(|| {
            EvalError::FlowFormat(format!("dimensions {}x{} are too large", width, height))
        })?;
    if let Some(payload) = payload {
        if payload < expected as u64 {
            return Err(EvalError::FlowFormat(format!(
                "{}x{} field needs {} bytes, found {}",
                width, height, expected, payload
            )));
        }
    }

    // Grows with the bytes actually present, never with the header alone.
    let mut bytes = Vec::new();
    Read::take(reader, expected as u64).read_to_end(&mut bytes)?;
    if bytes.len() != expected {
        return Err(EvalError::FlowFormat(format!(
            "truncated data for {}x{} field",
            width, height
        )));
    }

    let values: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    // Stored as (H, W, 2); the field is channel-first.
    let data = Array3::from_shape_fn((FlowField::CHANNELS, height, width), |(c, y, x)| {
        values[(y * width + x) * 2 + c]
    });
    FlowField::new(data)
}

/// Write a KITTI submission PNG with every pixel marked valid.
pub fn write_kitti_png(path: &Path, flow: &FlowField) -> Result<()> {
    let img = encode_kitti(flow);
    img.save(path)?;
    Ok(())
}

pub fn encode_kitti(flow: &FlowField) -> image::ImageBuffer<image::Rgb<u16>, Vec<u16>> {
    let (height, width) = flow.dims();
    // Truncates toward zero, like the benchmark's own devkit writer.
    let encode = |value: f32| (value * KITTI_SCALE + KITTI_OFFSET).clamp(0.0, 65535.0) as u16;

    image::ImageBuffer::<image::Rgb<u16>, Vec<u16>>::from_fn(width as u32, height as u32, |x, y| {
        let (u, v) = flow.vector(y as usize, x as usize);
        image::Rgb([encode(u), encode(v), 1])
    })
}

/// Read a KITTI ground-truth PNG into a flow field and its validity mask.
pub fn read_kitti_png(path: &Path) -> Result<(FlowField, ValidityMask)> {
    let img = image::open(path)?.into_rgb16();
    Ok(decode_kitti(&img))
}

pub fn decode_kitti(
    img: &image::ImageBuffer<image::Rgb<u16>, Vec<u16>>,
) -> (FlowField, ValidityMask) {
    let (width, height) = img.dimensions();
    let (width, height) = (width as usize, height as usize);

    let data = Array3::from_shape_fn((FlowField::CHANNELS, height, width), |(c, y, x)| {
        let raw = img.get_pixel(x as u32, y as u32)[c] as f32;
        (raw - KITTI_OFFSET) / KITTI_SCALE
    });
    let valid = Array2::from_shape_fn((height, width), |(y, x)| {
        img.get_pixel(x as u32, y as u32)[2] as f32 >= 0.5
    });

    (FlowField { data }, ValidityMask::new(valid))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_flow() -> FlowField {
        let data = Array3::from_shape_fn((2, 2, 3), |(c, y, x)| {
            (c as f32 + 1.0) * (y * 3 + x) as f32 * 0.5 - 1.0
        });
        FlowField::new(data).unwrap()
    }

    #[test]
    fn test_flo_header_layout() {
        let mut bytes = Vec::new();
        encode_flo(&mut bytes, &sample_flow()).unwrap();

        assert_eq!(bytes.len(), 12 + 2 * 3 * 2 * 4);
        assert_eq!(&bytes[0..4], b"PIEH");
        assert_eq!(i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 3);
        assert_eq!(i32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]), 2);
        // First pixel is interleaved (u, v).
        let u0 = f32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        let v0 = f32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
        assert_eq!((u0, v0), sample_flow().vector(0, 0));
    }

    #[test]
    fn test_flo_file_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame0001.flo");
        let flow = sample_flow();

        write_flo(&path, &flow).unwrap();
        assert_eq!(read_flo(&path).unwrap(), flow);
    }

    #[test]
    fn test_flo_rejects_bad_magic() {
        let mut bytes = vec![0u8; 12];
        bytes[4] = 1;
        bytes[8] = 1;
        let err = decode_flo(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, EvalError::FlowFormat(_)));
    }

    #[test]
    fn test_flo_rejects_truncated_data() {
        let mut bytes = Vec::new();
        encode_flo(&mut bytes, &sample_flow()).unwrap();
        bytes.truncate(bytes.len() - 4);
        let err = decode_flo(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, EvalError::FlowFormat(_)));
    }

    fn flo_header(width: i32, height: i32) -> Vec<u8> {
        let mut bytes = FLO_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&width.to_le_bytes());
        bytes.extend_from_slice(&height.to_le_bytes());
        bytes
    }

    #[test]
    fn test_flo_rejects_overflowing_dimensions() {
        let bytes = flo_header(i32::MAX, i32::MAX);
        let err = decode_flo(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, EvalError::FlowFormat(_)));
    }

    #[test]
    fn test_flo_huge_header_without_data() {
        let bytes = flo_header(100_000, 100_000);
        let err = decode_flo(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, EvalError::FlowFormat(_)));
    }

    #[test]
    fn test_flo_file_shorter_than_header_claims() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.flo");
        let mut bytes = flo_header(1024, 436);
        bytes.extend_from_slice(&[0u8; 64]);
        std::fs::write(&path, bytes).unwrap();

        let err = read_flo(&path).unwrap_err();
        assert!(matches!(err, EvalError::FlowFormat(ref msg) if msg.contains("broken.flo")));
    }

    #[test]
    fn test_kitti_encoding_truncates() {
        // 0.3 * 64 = 19.2 and -0.3 * 64 = -19.2
        let img = encode_kitti(&FlowField::constant(1, 1, 0.3, -0.3));
        assert_eq!(img.get_pixel(0, 0).0, [32768 + 19, 32768 - 20, 1]);
    }

    #[test]
    fn test_kitti_encoding() {
        let flow = FlowField::constant(1, 2, 1.0, -0.5);
        let img = encode_kitti(&flow);
        assert_eq!(img.get_pixel(1, 0).0, [32768 + 64, 32768 - 32, 1]);

        let (decoded, valid) = decode_kitti(&img);
        assert_eq!(decoded, flow);
        assert_eq!(valid.count_valid(), 2);
    }
}
