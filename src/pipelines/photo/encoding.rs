// SPDX-License-Identifier: GPL-3.0-only

//! Still image encoding
//!
//! Device frames are converted to RGB, resized when the requested size
//! differs, then encoded with the `image` crate. Raw output writes the device
//! bytes untouched.

use std::path::Path;

use image::{ImageFormat, RgbImage, imageops};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backends::camera::{CameraFrame, PixelFormat};
use crate::errors::PhotoError;

/// JPEG quality used for stills
const JPEG_QUALITY: u8 = 92;

/// Still image file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ImageFileFormat {
    /// Device bytes as read
    Raw,
    #[default]
    Jpeg,
    /// Written as JPEG
    Exif,
    Tiff,
    Gif,
    Png,
    Bmp,
}

impl ImageFileFormat {
    /// Get file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFileFormat::Raw => "raw",
            ImageFileFormat::Jpeg | ImageFileFormat::Exif => "jpg",
            ImageFileFormat::Tiff => "tiff",
            ImageFileFormat::Gif => "gif",
            ImageFileFormat::Png => "png",
            ImageFileFormat::Bmp => "bmp",
        }
    }

    /// Convert to image crate's ImageFormat (None for raw output)
    fn to_image_format(self) -> Option<ImageFormat> {
        match self {
            ImageFileFormat::Raw => None,
            ImageFileFormat::Jpeg | ImageFileFormat::Exif => Some(ImageFormat::Jpeg),
            ImageFileFormat::Tiff => Some(ImageFormat::Tiff),
            ImageFileFormat::Gif => Some(ImageFormat::Gif),
            ImageFileFormat::Png => Some(ImageFormat::Png),
            ImageFileFormat::Bmp => Some(ImageFormat::Bmp),
        }
    }
}

fn clamp(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// BT.601 full-range YUV to RGB
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = f32::from(y);
    let u = f32::from(u) - 128.0;
    let v = f32::from(v) - 128.0;
    [
        clamp(y + 1.402 * v),
        clamp(y - 0.344_136 * u - 0.714_136 * v),
        clamp(y + 1.772 * u),
    ]
}

/// Convert a frame to packed RGB, or None for layouts without a conversion
pub fn frame_to_rgb(frame: &CameraFrame) -> Option<RgbImage> {
    let (w, h) = (frame.width as usize, frame.height as usize);
    if frame.data.len() < frame.format.frame_size(frame.width, frame.height) {
        return None;
    }
    let data = &frame.data[..];

    let rgb: Vec<u8> = match frame.format {
        PixelFormat::Rgb24 => data[..w * h * 3].to_vec(),
        PixelFormat::Rgb32 => data[..w * h * 4]
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect(),
        PixelFormat::Grey => data[..w * h].iter().flat_map(|&l| [l, l, l]).collect(),
        PixelFormat::Uyvy => {
            let mut out = Vec::with_capacity(w * h * 3);
            for quad in data[..w * h * 2].chunks_exact(4) {
                let (u, y0, v, y1) = (quad[0], quad[1], quad[2], quad[3]);
                out.extend_from_slice(&yuv_to_rgb(y0, u, v));
                out.extend_from_slice(&yuv_to_rgb(y1, u, v));
            }
            out
        }
        PixelFormat::Yuv420 => {
            let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
            if data.len() < w * h + 2 * cw * ch {
                return None;
            }
            let (y_plane, rest) = data.split_at(w * h);
            let (u_plane, v_plane) = rest.split_at(cw * ch);
            let mut out = Vec::with_capacity(w * h * 3);
            for row in 0..h {
                for col in 0..w {
                    let c = (row / 2) * cw + col / 2;
                    out.extend_from_slice(&yuv_to_rgb(
                        y_plane[row * w + col],
                        u_plane[c],
                        v_plane[c],
                    ));
                }
            }
            out
        }
        PixelFormat::Yuv422P => return None,
    };

    RgbImage::from_raw(frame.width, frame.height, rgb)
}

/// Encode a frame, resizing to `size` when it is set and differs
pub fn encode_frame(
    frame: &CameraFrame,
    size: (u32, u32),
    format: ImageFileFormat,
) -> Result<Vec<u8>, PhotoError> {
    let Some(image_format) = format.to_image_format() else {
        return Ok(frame.data.to_vec());
    };

    let mut image = frame_to_rgb(frame)
        .ok_or_else(|| PhotoError::UnsupportedFormat(frame.format.to_string()))?;

    let (width, height) = size;
    if width > 0 && height > 0 && (width, height) != image.dimensions() {
        image = imageops::resize(&image, width, height, imageops::FilterType::Triangle);
    }

    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    if image_format == ImageFormat::Jpeg {
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
        encoder
            .encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ExtendedColorType::Rgb8,
            )
            .map_err(|e| PhotoError::EncodingFailed(format!("JPEG encoding failed: {}", e)))?;
    } else {
        image
            .write_to(&mut cursor, image_format)
            .map_err(|e| PhotoError::EncodingFailed(format!("{:?} encoding failed: {}", image_format, e)))?;
    }

    debug!(size = buffer.len(), format = ?format, "Encoding complete");
    Ok(buffer)
}

/// Encode and write a frame to `path`
///
/// Layouts without an RGB conversion fall back to raw bytes.
pub fn save_frame(
    frame: &CameraFrame,
    size: (u32, u32),
    format: ImageFileFormat,
    path: &Path,
) -> Result<(), PhotoError> {
    let bytes = match encode_frame(frame, size, format) {
        Err(PhotoError::UnsupportedFormat(layout)) => {
            debug!(layout = %layout, "No RGB conversion, writing raw frame");
            frame.data.to_vec()
        }
        other => other?,
    };

    std::fs::write(path, bytes)
        .map_err(|e| PhotoError::SaveFailed(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grey_frames_become_neutral_rgb() {
        let frame = CameraFrame::solid(2, 2, PixelFormat::Grey, 100);
        let rgb = frame_to_rgb(&frame).unwrap();
        assert_eq!(rgb.get_pixel(1, 1).0, [100, 100, 100]);
    }

    #[test]
    fn neutral_chroma_keeps_luma() {
        let mut data = vec![50u8; 4 * 2];
        data.extend(vec![128u8; 2 * 2]);
        let frame = CameraFrame::new(data.into(), 4, 2, PixelFormat::Yuv420);
        let rgb = frame_to_rgb(&frame).unwrap();
        assert_eq!(rgb.get_pixel(3, 1).0, [50, 50, 50]);
    }

    #[test]
    fn odd_sized_i420_converts() {
        let frame = CameraFrame::solid(3, 3, PixelFormat::Yuv420, 128);
        let rgb = frame_to_rgb(&frame).unwrap();
        assert_eq!((rgb.width(), rgb.height()), (3, 3));
        assert_eq!(rgb.get_pixel(2, 2).0, [128, 128, 128]);

        // Missing the last chroma samples
        let short = CameraFrame::new(vec![128u8; 13].into(), 3, 3, PixelFormat::Yuv420);
        assert!(frame_to_rgb(&short).is_none());
    }

    #[test]
    fn jpeg_output_has_jpeg_magic_and_requested_size() {
        let frame = CameraFrame::solid(16, 8, PixelFormat::Rgb24, 200);
        let bytes = encode_frame(&frame, (8, 4), ImageFileFormat::Jpeg).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 4));
    }

    #[test]
    fn raw_output_is_device_bytes() {
        let frame = CameraFrame::solid(2, 2, PixelFormat::Yuv422P, 7);
        let bytes = encode_frame(&frame, (0, 0), ImageFileFormat::Raw).unwrap();
        assert_eq!(bytes, vec![7u8; 8]);
        assert!(matches!(
            encode_frame(&frame, (0, 0), ImageFileFormat::Png),
            Err(PhotoError::UnsupportedFormat(_))
        ));
    }
}
