// SPDX-License-Identifier: GPL-3.0-only

//! Camera device abstraction
//!
//! Activities never own the camera. They hold a shared [`CameraHandle`] and
//! talk to the device only through [`CameraDevice`]:
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ ImageCapture  VideoCapture  RTSP      │
//! └──────────────────┬───────────────────┘
//!                    │ Arc<dyn CameraDevice>
//!                    ▼
//! ┌──────────────────────────────────────┐
//! │        CameraDevice trait            │
//! └──────────┬──────────────────┬────────┘
//!            ▼                  ▼
//!      ┌──────────┐      ┌─────────────┐
//!      │   V4L2   │      │ TestPattern │
//!      └──────────┘      └─────────────┘
//! ```

pub mod pattern;
pub mod types;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use pattern::PatternCamera;
pub use types::*;

use std::sync::Arc;

use crate::parameters::{ParamValue, ParameterTable};

/// Shared, non-owning handle to a camera; outlives every activity using it
pub type CameraHandle = Arc<dyn CameraDevice>;

/// Camera device adapter
///
/// Only the first six methods are required. The lifecycle and parameter hooks
/// default to no-ops so simple sources stay simple.
pub trait CameraDevice: Send + Sync {
    // ===== Identity and geometry =====

    /// Stable identifier, used to derive the stream mount path
    fn device_id(&self) -> String;

    /// Native frame size as (width, height)
    fn size(&self) -> (u32, u32);

    fn pixel_format(&self) -> PixelFormat;

    /// Read one frame synchronously; may stall
    fn read(&self) -> DeviceResult<CameraFrame>;

    /// True when the media engine can open the device directly (kernel capture
    /// node) instead of being fed frames through [`CameraDevice::read`]
    fn is_native_capture_source(&self) -> bool;

    /// Graph description the device wants used verbatim for streaming
    fn own_graph_description(&self) -> Option<String>;

    // ===== Lifecycle =====

    fn info(&self) -> CameraInfo {
        let (width, height) = self.size();
        CameraInfo {
            model: self.device_id(),
            resolution_h: width,
            resolution_v: height,
            flags: capability::CAPTURE_IMAGE
                | capability::CAPTURE_VIDEO
                | capability::HAS_VIDEO_STREAM,
            ..CameraInfo::default()
        }
    }

    /// Prepare the device and publish its parameter values into `params`
    fn init(&self, _params: &mut ParameterTable) -> DeviceResult<()> {
        Ok(())
    }

    fn start(&self) -> DeviceResult<()> {
        Ok(())
    }

    fn stop(&self) -> DeviceResult<()> {
        Ok(())
    }

    fn uninit(&self) -> DeviceResult<()> {
        Ok(())
    }

    // ===== Parameters =====

    /// Apply a parameter change on the hardware; the caller stores it on success
    fn set_param(&self, _key: &str, _value: &ParamValue) -> DeviceResult<()> {
        Ok(())
    }

    /// Restore device defaults and republish them into `params`
    fn reset_params(&self, params: &mut ParameterTable) -> DeviceResult<()> {
        params.clear_values();
        self.init(params)
    }

    fn set_mode(&self, mode: CameraMode) -> DeviceResult<()> {
        if mode == CameraMode::Still {
            Ok(())
        } else {
            Err(crate::errors::DeviceError::Unsupported(format!(
                "{:?} mode",
                mode
            )))
        }
    }

    fn mode(&self) -> CameraMode {
        CameraMode::Still
    }
}
