// SPDX-License-Identifier: GPL-3.0-only

//! Video recording
//!
//! - [`encoding`]: encoder and muxer fragments of the recording graph
//! - [`recorder`]: the video capture activity

pub mod encoding;
pub mod recorder;

pub use recorder::VideoCapture;

use serde::{Deserialize, Serialize};

use crate::constants::defaults;

/// Video compression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum VideoCodec {
    H263,
    Mpeg4,
    #[default]
    Avc,
    Mjpeg,
    Wmv,
}

/// Video container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum VideoFileFormat {
    Mp4,
    Avi,
    Wmv,
    Flv,
    Mov,
    #[default]
    Ts,
}

impl VideoFileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            VideoFileFormat::Mp4 => "mp4",
            VideoFileFormat::Avi => "avi",
            VideoFileFormat::Wmv => "wmv",
            VideoFileFormat::Flv => "flv",
            VideoFileFormat::Mov => "mov",
            VideoFileFormat::Ts => "ts",
        }
    }
}

/// Recording settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    /// Kilobits per second
    pub bitrate: u32,
    pub framerate: u32,
    pub encoder: VideoCodec,
    pub file_format: VideoFileFormat,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            width: defaults::VIDEO_WIDTH,
            height: defaults::VIDEO_HEIGHT,
            bitrate: defaults::VIDEO_BITRATE,
            framerate: defaults::VIDEO_FRAMERATE,
            encoder: VideoCodec::Avc,
            file_format: VideoFileFormat::Ts,
        }
    }
}
