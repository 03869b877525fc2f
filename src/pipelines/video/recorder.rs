// SPDX-License-Identifier: GPL-3.0-only

//! Video capture activity
//!
//! Each `start` builds a fresh recording graph through the media engine and
//! writes to `<location>/video_<YYYYmmdd_HHMMSS>.<ext>`. `stop` sends
//! end-of-stream, gives the muxer time to finalize, then shuts the graph down.
//! Settings changed while recording apply to the next recording.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Local;
use tracing::{info, warn};

use super::VideoSettings;
use super::encoding::recording_description;
use super::{VideoCodec, VideoFileFormat};
use crate::backends::camera::CameraHandle;
use crate::constants::{defaults, elements, timing};
use crate::errors::MediaResult;
use crate::media::{ElementState, FrameSourceConfig, MediaEngine, MediaGraph, device_frame_puller};
use crate::pipelines::state::{ActivityEvent, ActivityState, StateMachine};
use crate::streaming::launch::StreamSource;

struct Recording {
    graph: Box<dyn MediaGraph>,
    output: PathBuf,
    live: Arc<AtomicBool>,
}

/// Continuous recording of one camera
pub struct VideoCapture {
    device: CameraHandle,
    engine: Arc<dyn MediaEngine>,
    machine: StateMachine,
    settings: VideoSettings,
    location: PathBuf,
    recording: Option<Recording>,
    last_capture: Option<PathBuf>,
}

impl VideoCapture {
    /// Activity with the default settings
    pub fn new(device: CameraHandle, engine: Arc<dyn MediaEngine>) -> Self {
        Self::with_settings(device, engine, VideoSettings::default())
    }

    pub fn with_settings(device: CameraHandle, engine: Arc<dyn MediaEngine>, settings: VideoSettings) -> Self {
        Self {
            device,
            engine,
            machine: StateMachine::new("video-capture"),
            settings,
            location: PathBuf::from(defaults::CAPTURE_LOCATION),
            recording: None,
            last_capture: None,
        }
    }

    pub fn state(&self) -> ActivityState {
        self.machine.state()
    }

    pub fn init(&mut self) -> MediaResult<()> {
        self.machine.apply(ActivityEvent::Init)?;
        Ok(())
    }

    pub fn uninit(&mut self) -> MediaResult<()> {
        self.machine.apply(ActivityEvent::Uninit)?;
        Ok(())
    }

    /// Build the recording graph and set it playing
    pub fn start(&mut self) -> MediaResult<()> {
        self.machine.check(ActivityEvent::Start)?;

        let output = self.location.join(format!(
            "video_{}.{}",
            Local::now().format("%Y%m%d_%H%M%S"),
            self.settings.file_format.extension()
        ));
        let source = if self.device.is_native_capture_source() {
            StreamSource::Native {
                device_id: self.device.device_id(),
            }
        } else {
            StreamSource::Application
        };
        let description = recording_description(&source, &self.settings, &output);

        let recording = match self.build(&description, output) {
            Ok(recording) => recording,
            Err(e) => {
                self.machine.fault(&e.to_string());
                return Err(e);
            }
        };

        info!(path = %recording.output.display(), "Recording started");
        self.recording = Some(recording);
        self.machine.apply(ActivityEvent::Start)?;
        Ok(())
    }

    fn build(&self, description: &str, output: PathBuf) -> MediaResult<Recording> {
        let graph = self.engine.parse_graph(description)?;
        let live = Arc::new(AtomicBool::new(true));

        if !self.device.is_native_capture_source() {
            let (width, height) = self.device.size();
            let config = FrameSourceConfig {
                format: self.device.pixel_format(),
                width,
                height,
                framerate: self.settings.framerate as i32,
            };
            let puller = device_frame_puller(Arc::clone(&self.device), Arc::clone(&live));
            graph.configure_frame_source(elements::RECORDING_SOURCE, &config, puller)?;
        }

        if let Err(e) = graph.set_state(ElementState::Playing) {
            live.store(false, Ordering::Release);
            let _ = graph.set_state(ElementState::Null);
            return Err(e);
        }

        Ok(Recording { graph, output, live })
    }

    /// Finalize the current recording
    pub fn stop(&mut self) -> MediaResult<()> {
        self.machine.check(ActivityEvent::Stop)?;

        if let Some(recording) = self.recording.take() {
            if let Err(e) = recording.graph.send_eos() {
                warn!(error = %e, "Failed to send end-of-stream to recording");
            }
            // Give the muxer a brief moment to write its trailer
            std::thread::sleep(timing::EOS_FINALIZE);
            recording.live.store(false, Ordering::Release);
            if let Err(e) = recording.graph.set_state(ElementState::Null) {
                warn!(error = %e, "Failed to shut down recording graph");
            }
            info!(path = %recording.output.display(), "Recording finished");
            self.last_capture = Some(recording.output);
        }

        self.machine.apply(ActivityEvent::Stop)?;
        Ok(())
    }

    // ===== Settings =====

    pub fn settings(&self) -> &VideoSettings {
        &self.settings
    }

    /// Replace every setting at once
    pub fn set_settings(&mut self, settings: VideoSettings) {
        self.warn_if_running("settings");
        self.settings = settings;
    }

    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.warn_if_running("resolution");
        self.settings.width = width;
        self.settings.height = height;
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.settings.width, self.settings.height)
    }

    pub fn set_bitrate(&mut self, kbps: u32) {
        self.warn_if_running("bitrate");
        self.settings.bitrate = kbps;
    }

    pub fn bitrate(&self) -> u32 {
        self.settings.bitrate
    }

    pub fn set_framerate(&mut self, fps: u32) {
        self.warn_if_running("framerate");
        self.settings.framerate = fps;
    }

    pub fn framerate(&self) -> u32 {
        self.settings.framerate
    }

    pub fn set_encoder(&mut self, codec: VideoCodec) {
        self.warn_if_running("encoder");
        self.settings.encoder = codec;
    }

    pub fn encoder(&self) -> VideoCodec {
        self.settings.encoder
    }

    pub fn set_format(&mut self, format: VideoFileFormat) {
        self.warn_if_running("file format");
        self.settings.file_format = format;
    }

    pub fn format(&self) -> VideoFileFormat {
        self.settings.file_format
    }

    pub fn set_location(&mut self, location: &Path) {
        self.warn_if_running("location");
        self.location = location.to_path_buf();
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// File of the last finished recording
    pub fn last_capture_url(&self) -> Option<&Path> {
        self.last_capture.as_deref()
    }

    /// File the current recording is written to
    pub fn current_capture_url(&self) -> Option<&Path> {
        self.recording.as_ref().map(|r| r.output.as_path())
    }

    fn warn_if_running(&self, what: &str) {
        if self.machine.state() == ActivityState::Run {
            warn!(setting = what, "Recording in progress. Change will not take effect until next start");
        }
    }
}

impl Drop for VideoCapture {
    fn drop(&mut self) {
        if let Some(recording) = self.recording.take() {
            recording.live.store(false, Ordering::Release);
            let _ = recording.graph.set_state(ElementState::Null);
        }
    }
}
