// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 camera adapter
//!
//! The device is a kernel capture node, so streaming and recording graphs open
//! it directly with `v4l2src`. `read` is still available for still capture and
//! opens a short memory-mapped stream per call.

use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use super::{CameraDevice, CameraFrame, CameraInfo, DeviceResult, PixelFormat, capability};
use crate::errors::DeviceError;

/// Camera behind a `/dev/videoN` node
pub struct V4l2Camera {
    path: String,
    id: String,
    card: String,
    driver: String,
    width: u32,
    height: u32,
    format: PixelFormat,
    device: Mutex<Device>,
}

impl V4l2Camera {
    /// Open the device and read its current format
    pub fn open(path: &str) -> DeviceResult<Self> {
        let device = Device::with_path(path)
            .map_err(|e| DeviceError::InitializationFailed(format!("{}: {}", path, e)))?;
        let caps = device
            .query_caps()
            .map_err(|e| DeviceError::InitializationFailed(format!("query caps: {}", e)))?;
        let current = device
            .format()
            .map_err(|e| DeviceError::InitializationFailed(format!("query format: {}", e)))?;

        let format = PixelFormat::from_fourcc(&current.fourcc.repr).ok_or_else(|| {
            DeviceError::Unsupported(format!("pixel format {:?}", current.fourcc))
        })?;

        let id = path.rsplit('/').next().unwrap_or(path).to_string();
        info!(
            device = %id,
            card = %caps.card,
            width = current.width,
            height = current.height,
            format = %format,
            "Opened V4L2 camera"
        );

        Ok(Self {
            path: path.to_string(),
            id,
            card: caps.card,
            driver: caps.driver,
            width: current.width,
            height: current.height,
            format,
            device: Mutex::new(device),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// List `/dev/video*` nodes as (path, card name)
    pub fn enumerate() -> Vec<(String, String)> {
        let mut found = Vec::new();
        let Ok(entries) = std::fs::read_dir("/dev") else {
            return found;
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with("video") {
                continue;
            }
            let path = format!("/dev/{}", name);
            match Device::with_path(&path).and_then(|dev| dev.query_caps()) {
                Ok(caps) => found.push((path, caps.card)),
                Err(e) => debug!(path = %path, error = %e, "Skipping video node"),
            }
        }

        found.sort();
        found
    }
}

impl CameraDevice for V4l2Camera {
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
        let device = self.device.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stream = Stream::with_buffers(&device, Type::VideoCapture, 2)
            .map_err(|e| DeviceError::ReadFailed(format!("create stream: {}", e)))?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| DeviceError::ReadFailed(format!("dequeue: {}", e)))?;

        let expected = self.format.frame_size(self.width, self.height);
        let used = (meta.bytesused as usize).min(buf.len());
        if used < expected {
            warn!(device = %self.id, got = used, expected, "Short frame from V4L2");
            return Err(DeviceError::ReadFailed(format!(
                "short frame: {} of {} bytes",
                used, expected
            )));
        }

        Ok(CameraFrame::new(
            buf[..expected].to_vec().into(),
            self.width,
            self.height,
            self.format,
        ))
    }

    fn is_native_capture_source(&self) -> bool {
        true
    }

    fn own_graph_description(&self) -> Option<String> {
        None
    }

    fn info(&self) -> CameraInfo {
        CameraInfo {
            vendor: self.driver.clone(),
            model: self.card.clone(),
            resolution_h: self.width,
            resolution_v: self.height,
            flags: capability::CAPTURE_IMAGE
                | capability::CAPTURE_VIDEO
                | capability::HAS_BASIC_ZOOM
                | capability::HAS_VIDEO_STREAM,
            ..CameraInfo::default()
        }
    }
}
