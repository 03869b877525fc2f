// SPDX-License-Identifier: GPL-3.0-only

//! Still image capture
//!
//! - [`capture`]: the interval/count driven capture activity
//! - [`encoding`]: frame conversion and file encoding

pub mod capture;
pub mod encoding;

pub use capture::{CaptureCallback, ImageCapture};
pub use encoding::ImageFileFormat;

use serde::{Deserialize, Serialize};

/// Still capture settings; a zero size means the device's native size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ImageSettings {
    pub width: u32,
    pub height: u32,
    pub file_format: ImageFileFormat,
}
