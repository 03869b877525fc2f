// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera device adapters

//! Frame, pixel format and device description types

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::errors::DeviceError;

/// Result type for device adapter calls
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Pixel layouts a device can deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PixelFormat {
    /// 8-bit luma only
    Grey,
    /// Planar 4:2:0 (I420)
    #[default]
    Yuv420,
    /// Planar 4:2:2 (Y42B)
    Yuv422P,
    /// Packed 4:2:2, U Y V Y order
    Uyvy,
    /// Packed 8-bit RGB
    Rgb24,
    /// Packed 8-bit RGB with a padding byte
    Rgb32,
}

impl PixelFormat {
    pub fn bits_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Grey => 8,
            PixelFormat::Yuv420 => 12,
            PixelFormat::Yuv422P | PixelFormat::Uyvy => 16,
            PixelFormat::Rgb24 => 24,
            PixelFormat::Rgb32 => 32,
        }
    }

    /// Size in bytes of one frame of `width` x `height`
    ///
    /// Planar chroma planes are subsampled with rounding up, so odd sizes
    /// carry a full chroma sample for the last column and row.
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            PixelFormat::Yuv420 => w * h + 2 * w.div_ceil(2) * h.div_ceil(2),
            PixelFormat::Yuv422P => w * h + 2 * w.div_ceil(2) * h,
            _ => (w * h * self.bits_per_pixel() as usize) / 8,
        }
    }

    /// Raw video format name understood by media graph caps
    pub fn caps_name(&self) -> &'static str {
        match self {
            PixelFormat::Grey => "GRAY8",
            PixelFormat::Yuv420 => "I420",
            PixelFormat::Yuv422P => "Y42B",
            PixelFormat::Uyvy => "UYVY",
            PixelFormat::Rgb24 => "RGB",
            PixelFormat::Rgb32 => "RGBx",
        }
    }

    /// Map a V4L2 FourCC to a pixel format
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"GREY" => Some(PixelFormat::Grey),
            b"YU12" | b"I420" => Some(PixelFormat::Yuv420),
            b"422P" => Some(PixelFormat::Yuv422P),
            b"UYVY" => Some(PixelFormat::Uyvy),
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"RGB4" | b"XR24" => Some(PixelFormat::Rgb32),
            _ => None,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.caps_name())
    }
}

/// A single frame read from a device
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub data: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Timestamp when the frame was read (for latency diagnostics)
    pub captured_at: Instant,
}

impl CameraFrame {
    pub fn new(data: Arc<[u8]>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
            captured_at: Instant::now(),
        }
    }

    /// Frame where every byte is `value`
    pub fn solid(width: u32, height: u32, format: PixelFormat, value: u8) -> Self {
        let data: Arc<[u8]> = vec![value; format.frame_size(width, height)].into();
        Self::new(data, width, height, format)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Operating mode of the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CameraMode {
    #[default]
    Still,
    Video,
    Survey,
}

impl CameraMode {
    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(CameraMode::Still),
            1 => Some(CameraMode::Video),
            2 => Some(CameraMode::Survey),
            _ => None,
        }
    }

    pub fn index(&self) -> u32 {
        match self {
            CameraMode::Still => 0,
            CameraMode::Video => 1,
            CameraMode::Survey => 2,
        }
    }
}

/// Capability flags advertised in [`CameraInfo`]
pub mod capability {
    pub const CAPTURE_VIDEO: u32 = 1;
    pub const CAPTURE_IMAGE: u32 = 2;
    pub const HAS_MODES: u32 = 4;
    pub const CAN_CAPTURE_IMAGE_IN_VIDEO_MODE: u32 = 8;
    pub const CAN_CAPTURE_VIDEO_IN_IMAGE_MODE: u32 = 16;
    pub const HAS_BASIC_ZOOM: u32 = 64;
    pub const HAS_VIDEO_STREAM: u32 = 256;
}

/// Static description of a camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CameraInfo {
    pub vendor: String,
    pub model: String,
    pub firmware_version: u32,
    /// Millimetres, 0 when unknown
    pub focal_length: f32,
    pub resolution_h: u32,
    pub resolution_v: u32,
    pub flags: u32,
    pub definition_uri: String,
}

impl std::fmt::Display for CameraInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} ({}x{})",
            self.vendor, self.model, self.resolution_h, self.resolution_v
        )
    }
}
