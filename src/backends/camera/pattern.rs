// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic test-pattern camera
//!
//! Produces frames of a moving grey level so that every activity can run
//! without hardware. Reads can be made to fail on demand to exercise the
//! solid-frame substitution of the streaming path.

use std::sync::{Mutex, PoisonError};

use tracing::debug;

use super::{CameraDevice, CameraFrame, CameraInfo, CameraMode, DeviceResult, PixelFormat};
use crate::errors::DeviceError;
use crate::parameters::{ParamValue, ParameterTable, keys};

#[derive(Debug, Default)]
struct PatternState {
    frames_read: u64,
    failures_pending: usize,
    always_fail: bool,
    mode: CameraMode,
}

/// Camera adapter that synthesizes frames in memory
#[derive(Debug)]
pub struct PatternCamera {
    id: String,
    width: u32,
    height: u32,
    format: PixelFormat,
    native: bool,
    description: Option<String>,
    state: Mutex<PatternState>,
}

impl PatternCamera {
    pub fn new(id: &str, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            id: id.to_string(),
            width,
            height,
            format,
            native: false,
            description: None,
            state: Mutex::new(PatternState::default()),
        }
    }

    /// Supply a graph description to be used verbatim when streaming
    pub fn with_graph_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Report the device as a kernel capture node
    pub fn with_native_capture(mut self, native: bool) -> Self {
        self.native = native;
        self
    }

    /// Make the next `count` reads fail
    pub fn fail_next_reads(&self, count: usize) {
        self.lock().failures_pending = count;
    }

    /// Make every read fail until cleared
    pub fn set_always_fail(&self, fail: bool) {
        self.lock().always_fail = fail;
    }

    /// Number of frames successfully produced so far
    pub fn frames_read(&self) -> u64 {
        self.lock().frames_read
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PatternState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CameraDevice for PatternCamera {
    fn device_id(&self) -> String {
        self.id.clone()
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    fn read(&self) -> DeviceResult<CameraFrame> {
        let mut state = self.lock();
        if state.always_fail {
            return Err(DeviceError::ReadFailed(format!("{}: read disabled", self.id)));
        }
        if state.failures_pending > 0 {
            state.failures_pending -= 1;
            return Err(DeviceError::ReadFailed(format!("{}: injected failure", self.id)));
        }

        let level = (state.frames_read.wrapping_mul(8) % 0xF0) as u8;
        state.frames_read += 1;
        Ok(CameraFrame::solid(self.width, self.height, self.format, level))
    }

    fn is_native_capture_source(&self) -> bool {
        self.native
    }

    fn own_graph_description(&self) -> Option<String> {
        self.description.clone()
    }

    fn info(&self) -> CameraInfo {
        CameraInfo {
            vendor: "camera-manager".to_string(),
            model: format!("Test pattern {}", self.id),
            resolution_h: self.width,
            resolution_v: self.height,
            flags: super::capability::CAPTURE_IMAGE
                | super::capability::CAPTURE_VIDEO
                | super::capability::HAS_MODES
                | super::capability::HAS_BASIC_ZOOM
                | super::capability::HAS_VIDEO_STREAM,
            ..CameraInfo::default()
        }
    }

    fn init(&self, params: &mut ParameterTable) -> DeviceResult<()> {
        let mode = self.lock().mode;
        let defaults = [
            (keys::CAMERA_MODE, ParamValue::U32(mode.index())),
            (keys::BRIGHTNESS, ParamValue::U32(128)),
            (keys::CONTRAST, ParamValue::U32(32)),
            (keys::SATURATION, ParamValue::U32(64)),
            (keys::HUE, ParamValue::I32(0)),
            (keys::GAIN, ParamValue::U32(0)),
        ];
        for (key, value) in defaults {
            params
                .set(key, value)
                .map_err(|e| DeviceError::InitializationFailed(e.to_string()))?;
        }
        debug!(device = %self.id, "Test pattern parameters published");
        Ok(())
    }

    fn set_param(&self, key: &str, value: &ParamValue) -> DeviceResult<()> {
        if key == keys::CAMERA_MODE {
            let index = match value {
                ParamValue::U32(v) => *v,
                ParamValue::U8(v) => u32::from(*v),
                other => {
                    return Err(DeviceError::Unsupported(format!("camera mode {}", other)));
                }
            };
            let mode = CameraMode::from_index(index)
                .ok_or_else(|| DeviceError::Unsupported(format!("camera mode {}", index)))?;
            self.set_mode(mode)?;
        }
        Ok(())
    }

    fn set_mode(&self, mode: CameraMode) -> DeviceResult<()> {
        self.lock().mode = mode;
        Ok(())
    }

    fn mode(&self) -> CameraMode {
        self.lock().mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_have_device_geometry() {
        let cam = PatternCamera::new("pattern0", 8, 4, PixelFormat::Grey);
        let frame = cam.read().unwrap();
        assert_eq!((frame.width, frame.height), (8, 4));
        assert_eq!(frame.len(), 32);
        assert_eq!(cam.frames_read(), 1);
    }

    #[test]
    fn injected_failures_are_consumed() {
        let cam = PatternCamera::new("pattern0", 2, 2, PixelFormat::Rgb24);
        cam.fail_next_reads(2);
        assert!(cam.read().is_err());
        assert!(cam.read().is_err());
        assert!(cam.read().is_ok());
    }

    #[test]
    fn mode_follows_camera_mode_param() {
        let cam = PatternCamera::new("pattern0", 2, 2, PixelFormat::Grey);
        cam.set_param(keys::CAMERA_MODE, &ParamValue::U32(1)).unwrap();
        assert_eq!(cam.mode(), CameraMode::Video);
        assert!(cam.set_param(keys::CAMERA_MODE, &ParamValue::U32(9)).is_err());
    }
}
