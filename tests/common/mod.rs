// SPDX-License-Identifier: GPL-3.0-only

//! Shared fixtures for integration tests

#![allow(dead_code)]

use camera_manager::backends::camera::{CameraHandle, PatternCamera, PixelFormat};
use std::path::PathBuf;
use std::sync::Arc;

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 48;

/// Test-pattern camera plus the trait handle activities take
pub fn pattern(id: &str) -> (Arc<PatternCamera>, CameraHandle) {
    let camera = Arc::new(PatternCamera::new(id, WIDTH, HEIGHT, PixelFormat::Yuv420));
    let handle: CameraHandle = camera.clone();
    (camera, handle)
}

/// Fresh, empty directory under the system temp dir
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "camera-manager-{}-{}",
        name,
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}
