// SPDX-License-Identifier: GPL-3.0-only

//! Camera component
//!
//! Ties one camera device to its parameter table and to at most one instance
//! of each media activity: image capture, video capture and the live stream.
//!
//! # Exclusivity
//!
//! Activities are not mutually exclusive. Image capture, video capture and
//! streaming may all run on the same device at once; each reads frames from
//! the device independently. Callers that need exclusive access must
//! coordinate it themselves.
//!
//! # Priming
//!
//! Starting the stream also primes the capture activities (creates and
//! initializes them without starting), so a capture request that arrives
//! while streaming starts from a ready instance.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backends::camera::{CameraHandle, CameraInfo, CameraMode};
use crate::config::Config;
use crate::errors::{MediaError, MediaResult, ParamError};
use crate::media::MediaEngine;
use crate::parameters::{ParamType, ParamValue, ParameterTable, keys};
use crate::pipelines::photo::{CaptureCallback, ImageCapture, ImageSettings};
use crate::pipelines::state::ActivityState;
use crate::pipelines::video::{VideoCapture, VideoSettings};
use crate::storage::StorageInfo;
use crate::streaming::{ServerRegistry, VideoStreamRtsp};

/// Image capture status codes
pub mod image_status {
    pub const IDLE: u8 = 0;
    pub const CAPTURE_IN_PROGRESS: u8 = 1;
    pub const INTERVAL_IDLE: u8 = 2;
    pub const INTERVAL_IN_PROGRESS: u8 = 3;
}

fn no_instance(activity: &str) -> MediaError {
    MediaError::NotFound(format!("no {} instance", activity))
}

/// One camera and its media activities
pub struct CameraComponent {
    device: CameraHandle,
    engine: Arc<dyn MediaEngine>,
    registry: Arc<ServerRegistry>,
    config: Config,
    params: ParameterTable,
    image_capture: Option<ImageCapture>,
    video_capture: Option<VideoCapture>,
    video_stream: Option<VideoStreamRtsp>,
}

impl CameraComponent {
    pub fn new(
        device: CameraHandle,
        engine: Arc<dyn MediaEngine>,
        registry: Arc<ServerRegistry>,
        config: Config,
    ) -> Self {
        Self {
            device,
            engine,
            registry,
            config,
            params: ParameterTable::new(),
            image_capture: None,
            video_capture: None,
            video_stream: None,
        }
    }

    pub fn device(&self) -> &CameraHandle {
        &self.device
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Initialize and start the device; activities are left alone
    pub fn start(&mut self) -> MediaResult<()> {
        self.device.init(&mut self.params)?;
        self.device.start()?;
        info!(device = %self.device.device_id(), "Camera component started");
        Ok(())
    }

    /// Stop every activity, then stop and uninitialize the device
    pub fn stop(&mut self) -> MediaResult<()> {
        if let Some(mut image) = self.image_capture.take() {
            teardown_image(&mut image);
        }
        if let Some(mut video) = self.video_capture.take() {
            teardown_video(&mut video);
        }
        if let Some(mut stream) = self.video_stream.take() {
            teardown_stream(&mut stream);
        }

        self.device.stop()?;
        self.device.uninit()?;
        info!(device = %self.device.device_id(), "Camera component stopped");
        Ok(())
    }

    // ===== Device information and parameters =====

    pub fn camera_info(&self) -> CameraInfo {
        self.device.info()
    }

    pub fn storage_info(&self) -> StorageInfo {
        StorageInfo::query(&self.config.storage_path)
    }

    /// Every parameter with a value, in string form
    pub fn param_list(&self) -> BTreeMap<String, String> {
        self.params.values()
    }

    pub fn param_type(&self, key: &str) -> Result<ParamType, ParamError> {
        self.params.param_type(key)
    }

    /// Encode the value of `key` into `out`, returning the bytes written
    pub fn get_param(&self, key: &str, out: &mut [u8]) -> Result<usize, ParamError> {
        self.params.get_into(key, out)
    }

    /// Apply a parameter on the device, then record it in the table
    pub fn set_param(&mut self, key: &str, value: &[u8], type_tag: u8) -> Result<(), ParamError> {
        self.params.param_type(key)?;
        let decoded = ParamValue::from_le_bytes(ParamType::from_tag(type_tag)?, value)?;
        self.device.set_param(key, &decoded)?;
        self.params.set_from_bytes(key, value, type_tag)?;
        debug!(key, value = %decoded, "Parameter set");
        Ok(())
    }

    pub fn set_camera_mode(&mut self, mode: CameraMode) -> MediaResult<()> {
        self.device.set_mode(mode)?;
        if let Err(e) = self.params.set(keys::CAMERA_MODE, ParamValue::U32(mode.index())) {
            warn!(error = %e, "Failed to record camera mode");
        }
        Ok(())
    }

    pub fn camera_mode(&self) -> CameraMode {
        self.device.mode()
    }

    /// Restore the device's default parameters
    pub fn reset_camera_settings(&mut self) -> MediaResult<()> {
        self.device.reset_params(&mut self.params)?;
        Ok(())
    }

    // ===== Image capture =====

    pub fn set_image_capture_location(&mut self, location: &Path) {
        self.config.image_location = location.to_path_buf();
        if let Some(image) = self.image_capture.as_mut() {
            image.set_location(location);
        }
    }

    pub fn set_image_capture_settings(&mut self, settings: ImageSettings) {
        self.config.image = settings;
        if let Some(image) = self.image_capture.as_mut() {
            let (width, height) = if settings.width > 0 && settings.height > 0 {
                (settings.width, settings.height)
            } else {
                self.device.size()
            };
            image.set_resolution(width, height);
            image.set_format(settings.file_format);
        }
    }

    /// (status, interval) of the image capture activity
    pub fn image_capture_status(&self) -> (u8, i32) {
        match self.image_capture.as_ref() {
            Some(image) if image.state() == ActivityState::Run => {
                let status = if image.interval() > 0 {
                    image_status::INTERVAL_IN_PROGRESS
                } else {
                    image_status::CAPTURE_IN_PROGRESS
                };
                (status, image.interval())
            }
            Some(image) => (image_status::IDLE, image.interval()),
            None => (image_status::IDLE, 0),
        }
    }

    /// Start a fresh image capture, replacing any previous instance
    pub fn start_image_capture(
        &mut self,
        interval: i32,
        count: i32,
        callback: CaptureCallback,
    ) -> MediaResult<()> {
        if let Some(mut previous) = self.image_capture.take() {
            teardown_image(&mut previous);
        }

        let mut image = self.new_image_capture();
        image.init()?;
        if let Err(e) = image.start(interval, count, callback) {
            if let Err(uninit) = image.uninit() {
                warn!(error = %uninit, "Failed to uninitialize image capture");
            }
            return Err(e);
        }

        self.image_capture = Some(image);
        Ok(())
    }

    pub fn stop_image_capture(&mut self) -> MediaResult<()> {
        self.image_capture
            .as_mut()
            .ok_or_else(|| no_instance("image capture"))?
            .stop()
    }

    pub fn image_capture(&mut self) -> Option<&mut ImageCapture> {
        self.image_capture.as_mut()
    }

    fn new_image_capture(&self) -> ImageCapture {
        let mut image = ImageCapture::with_settings(Arc::clone(&self.device), self.config.image);
        image.set_location(&self.config.image_location);
        image
    }

    // ===== Video capture =====

    pub fn set_video_capture_location(&mut self, location: &Path) {
        self.config.video_location = location.to_path_buf();
        if let Some(video) = self.video_capture.as_mut() {
            video.set_location(location);
        }
    }

    pub fn set_video_capture_settings(&mut self, settings: VideoSettings) {
        self.config.video = settings;
        if let Some(video) = self.video_capture.as_mut() {
            video.set_settings(settings);
        }
    }

    /// Start recording, reusing a primed instance when there is one
    pub fn start_video_capture(&mut self) -> MediaResult<()> {
        let mut video = match self.video_capture.take() {
            Some(video) if matches!(video.state(), ActivityState::Init | ActivityState::Run) => video,
            previous => {
                if let Some(mut previous) = previous {
                    teardown_video(&mut previous);
                }
                let mut video = self.new_video_capture();
                video.init()?;
                video
            }
        };

        if let Err(e) = video.start() {
            // Already recording: keep the running instance
            if video.state() == ActivityState::Run {
                self.video_capture = Some(video);
            } else if let Err(uninit) = video.uninit() {
                warn!(error = %uninit, "Failed to uninitialize video capture");
            }
            return Err(e);
        }

        self.video_capture = Some(video);
        Ok(())
    }

    pub fn stop_video_capture(&mut self) -> MediaResult<()> {
        self.video_capture
            .as_mut()
            .ok_or_else(|| no_instance("video capture"))?
            .stop()
    }

    /// 1 while recording, else 0
    pub fn video_capture_status(&self) -> u8 {
        match self.video_capture.as_ref() {
            Some(video) if video.state() == ActivityState::Run => 1,
            _ => 0,
        }
    }

    pub fn video_capture(&mut self) -> Option<&mut VideoCapture> {
        self.video_capture.as_mut()
    }

    fn new_video_capture(&self) -> VideoCapture {
        let mut video = VideoCapture::with_settings(
            Arc::clone(&self.device),
            Arc::clone(&self.engine),
            self.config.video,
        );
        video.set_location(&self.config.video_location);
        video
    }

    // ===== Live stream =====

    /// Replace any stream with a fresh one, then prime the capture activities
    pub fn start_video_stream(&mut self) -> MediaResult<()> {
        if let Some(mut previous) = self.video_stream.take() {
            teardown_stream(&mut previous);
        }

        let result = self.launch_stream();
        self.prime_capture_activities();
        result
    }

    fn launch_stream(&mut self) -> MediaResult<()> {
        let mut stream = VideoStreamRtsp::new(
            Arc::clone(&self.device),
            Arc::clone(&self.engine),
            Arc::clone(&self.registry),
        );
        let rtsp = &self.config.rtsp;
        stream.set_host(&rtsp.host);
        stream.set_port(rtsp.port);
        stream.set_encoder(&rtsp.encoder);
        if let Some((width, height)) = rtsp.resolution() {
            stream.set_resolution(width, height);
        }

        stream.init()?;
        if let Err(e) = stream.start() {
            if let Err(uninit) = stream.uninit() {
                warn!(error = %uninit, "Failed to uninitialize stream");
            }
            return Err(e);
        }

        self.video_stream = Some(stream);
        Ok(())
    }

    /// Create and initialize capture activities without starting them
    ///
    /// Instances already in Init or Run are kept; anything else (Idle, Error)
    /// is torn down and replaced.
    pub fn prime_capture_activities(&mut self) {
        if let Some(mut image) = self
            .image_capture
            .take_if(|image| !matches!(image.state(), ActivityState::Init | ActivityState::Run))
        {
            teardown_image(&mut image);
        }
        if let Some(mut video) = self
            .video_capture
            .take_if(|video| !matches!(video.state(), ActivityState::Init | ActivityState::Run))
        {
            teardown_video(&mut video);
        }

        if self.image_capture.is_none() {
            let mut image = self.new_image_capture();
            match image.init() {
                Ok(()) => self.image_capture = Some(image),
                Err(e) => warn!(error = %e, "Failed to prime image capture"),
            }
        }
        if self.video_capture.is_none() {
            let mut video = self.new_video_capture();
            match video.init() {
                Ok(()) => self.video_capture = Some(video),
                Err(e) => warn!(error = %e, "Failed to prime video capture"),
            }
        }
        debug!("Capture activities primed");
    }

    pub fn stop_video_stream(&mut self) -> MediaResult<()> {
        let mut stream = self.video_stream.take().ok_or_else(|| no_instance("video stream"))?;
        stream.stop()?;
        stream.uninit()?;
        Ok(())
    }

    /// 1 while the stream is mounted, else 0
    pub fn video_stream_status(&self) -> u8 {
        match self.video_stream.as_ref() {
            Some(stream) if stream.state() == ActivityState::Run => 1,
            _ => 0,
        }
    }

    pub fn video_stream(&self) -> Option<&VideoStreamRtsp> {
        self.video_stream.as_ref()
    }

    // ===== Stream controls =====

    pub fn set_zoom(&self, level: i32) -> MediaResult<()> {
        self.video_stream
            .as_ref()
            .ok_or_else(|| no_instance("video stream"))?
            .set_zoom(level)
    }

    pub fn zoom(&self) -> Option<i32> {
        self.video_stream.as_ref().map(VideoStreamRtsp::zoom)
    }

    pub fn take_snapshot(&self, url: &str) -> bool {
        self.video_stream
            .as_ref()
            .is_some_and(|stream| stream.take_snapshot(url))
    }

    pub fn start_stream_recording(&self, url: &str) -> bool {
        self.video_stream
            .as_ref()
            .is_some_and(|stream| stream.start_recording(url))
    }

    /// Close the recording gate; moving the scratch file is up to the caller
    pub fn stop_stream_recording(&self) -> bool {
        self.video_stream
            .as_ref()
            .is_some_and(VideoStreamRtsp::stop_recording)
    }

    pub fn last_stream_recording_url(&self) -> Option<PathBuf> {
        self.video_stream
            .as_ref()
            .and_then(VideoStreamRtsp::last_recording_url)
            .map(PathBuf::from)
    }
}

fn teardown_image(image: &mut ImageCapture) {
    if matches!(image.state(), ActivityState::Run | ActivityState::Error)
        && let Err(e) = image.stop()
    {
        warn!(error = %e, "Failed to stop image capture");
    }
    if matches!(image.state(), ActivityState::Init | ActivityState::Error)
        && let Err(e) = image.uninit()
    {
        warn!(error = %e, "Failed to uninitialize image capture");
    }
}

fn teardown_video(video: &mut VideoCapture) {
    if matches!(video.state(), ActivityState::Run | ActivityState::Error)
        && let Err(e) = video.stop()
    {
        warn!(error = %e, "Failed to stop video capture");
    }
    if matches!(video.state(), ActivityState::Init | ActivityState::Error)
        && let Err(e) = video.uninit()
    {
        warn!(error = %e, "Failed to uninitialize video capture");
    }
}

fn teardown_stream(stream: &mut VideoStreamRtsp) {
    if matches!(stream.state(), ActivityState::Run | ActivityState::Error)
        && let Err(e) = stream.stop()
    {
        warn!(error = %e, "Failed to stop stream");
    }
    if matches!(stream.state(), ActivityState::Init | ActivityState::Error)
        && let Err(e) = stream.uninit()
    {
        warn!(error = %e, "Failed to uninitialize stream");
    }
}
