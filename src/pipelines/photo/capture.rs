// SPDX-License-Identifier: GPL-3.0-only

//! Image capture activity
//!
//! `start(interval, count, callback)` runs a capture-loop worker that reads a
//! frame from the device, encodes it to `<location>/img_<seq>.<ext>` and
//! reports `(result, sequence)` through the callback. Result 0 is success and
//! -1 a failed read or write; a failure still uses up its sequence number.
//!
//! | interval | count | behaviour                               |
//! |----------|-------|-----------------------------------------|
//! | > 0      | > 0   | `count` frames, `interval` seconds apart |
//! | <= 0     | > 0   | `count` frames back to back              |
//! | > 0      | <= 0  | one frame per interval until `stop`      |
//! | <= 0     | <= 0  | rejected                                 |
//!
//! A count-bounded run returns the activity to Init on its own.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::ImageSettings;
use super::encoding::{ImageFileFormat, save_frame};
use crate::backends::camera::CameraHandle;
use crate::constants::defaults;
use crate::errors::{MediaError, MediaResult};
use crate::pipelines::capture_loop::{CaptureLoopController, LoopAction};
use crate::pipelines::state::{ActivityEvent, ActivityState, StateMachine};

/// Per-frame notification: (result code, sequence number)
pub type CaptureCallback = Arc<dyn Fn(i32, i32) + Send + Sync>;

/// File name for a sequence number
fn file_name(sequence: i32, format: ImageFileFormat) -> String {
    format!("img_{:04}.{}", sequence, format.extension())
}

/// What the worker needs, copied at start so later setters do not affect a run
struct CaptureJob {
    device: CameraHandle,
    size: (u32, u32),
    format: ImageFileFormat,
    location: PathBuf,
    sequence: Arc<AtomicI32>,
    last_capture: Arc<Mutex<Option<PathBuf>>>,
    callback: CaptureCallback,
    remaining: Option<u32>,
    machine: Arc<StateMachine>,
}

impl CaptureJob {
    fn capture_next(&mut self) -> LoopAction {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let path = self.location.join(file_name(sequence, self.format));

        let result = self
            .device
            .read()
            .map_err(|e| e.to_string())
            .and_then(|frame| save_frame(&frame, self.size, self.format, &path).map_err(|e| e.to_string()));

        let code = match result {
            Ok(()) => {
                debug!(sequence, path = %path.display(), "Image captured");
                *self
                    .last_capture
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(path);
                0
            }
            Err(e) => {
                warn!(sequence, error = %e, "Image capture failed");
                -1
            }
        };

        (self.callback)(code, sequence);

        match self.remaining.as_mut() {
            Some(remaining) => {
                *remaining -= 1;
                if *remaining == 0 {
                    self.machine.complete_run();
                    LoopAction::Stop
                } else {
                    LoopAction::Continue
                }
            }
            None => LoopAction::Continue,
        }
    }
}

/// Still capture activity for one camera
pub struct ImageCapture {
    device: CameraHandle,
    machine: Arc<StateMachine>,
    width: u32,
    height: u32,
    format: ImageFileFormat,
    location: PathBuf,
    interval: i32,
    sequence: Arc<AtomicI32>,
    last_capture: Arc<Mutex<Option<PathBuf>>>,
    worker: Option<CaptureLoopController>,
}

impl ImageCapture {
    /// Activity capturing at the device's native size as JPEG
    pub fn new(device: CameraHandle) -> Self {
        Self::with_settings(device, ImageSettings::default())
    }

    pub fn with_settings(device: CameraHandle, settings: ImageSettings) -> Self {
        let (native_w, native_h) = device.size();
        let (width, height) = if settings.width > 0 && settings.height > 0 {
            (settings.width, settings.height)
        } else {
            (native_w, native_h)
        };

        Self {
            device,
            machine: Arc::new(StateMachine::new("image-capture")),
            width,
            height,
            format: settings.file_format,
            location: PathBuf::from(defaults::CAPTURE_LOCATION),
            interval: 0,
            sequence: Arc::new(AtomicI32::new(0)),
            last_capture: Arc::new(Mutex::new(None)),
            worker: None,
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
        self.join_worker();
        Ok(())
    }

    /// Start capturing; see the module docs for interval/count semantics
    pub fn start(&mut self, interval: i32, count: i32, callback: CaptureCallback) -> MediaResult<()> {
        if interval <= 0 && count <= 0 {
            return Err(MediaError::InvalidArgument(format!(
                "interval {} and count {} are both non-positive",
                interval, count
            )));
        }
        self.machine.check(ActivityEvent::Start)?;

        // A previous count-bounded run may have finished on its own
        self.join_worker();

        self.interval = interval.max(0);
        let job = CaptureJob {
            device: Arc::clone(&self.device),
            size: (self.width, self.height),
            format: self.format,
            location: self.location.clone(),
            sequence: Arc::clone(&self.sequence),
            last_capture: Arc::clone(&self.last_capture),
            callback,
            remaining: (count > 0).then_some(count as u32),
            machine: Arc::clone(&self.machine),
        };

        self.machine.apply(ActivityEvent::Start)?;
        info!(interval, count, location = %self.location.display(), "Image capture started");

        let period = Duration::from_secs(self.interval as u64);
        let mut job = job;
        self.worker = Some(CaptureLoopController::start_periodic(
            "image-capture",
            period,
            move || job.capture_next(),
        ));
        Ok(())
    }

    /// Stop capturing and wait for the worker
    pub fn stop(&mut self) -> MediaResult<()> {
        self.machine.check(ActivityEvent::Stop)?;

        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }

        // The worker may have completed the run while we were stopping it
        if self.machine.state() == ActivityState::Init {
            return Ok(());
        }
        self.machine.apply(ActivityEvent::Stop)?;
        info!("Image capture stopped");
        Ok(())
    }

    /// Block until a count-bounded run has finished
    pub fn wait(&mut self) {
        self.join_worker();
    }

    fn join_worker(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.join();
        }
    }

    // ===== Settings =====

    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.warn_if_running("resolution");
        self.width = width;
        self.height = height;
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Interval in seconds between frames
    pub fn set_interval(&mut self, interval: i32) -> MediaResult<()> {
        if interval < 0 {
            return Err(MediaError::InvalidArgument(format!("negative interval {}", interval)));
        }
        self.warn_if_running("interval");
        self.interval = interval;
        Ok(())
    }

    pub fn interval(&self) -> i32 {
        self.interval
    }

    pub fn set_format(&mut self, format: ImageFileFormat) {
        self.warn_if_running("format");
        self.format = format;
    }

    pub fn format(&self) -> ImageFileFormat {
        self.format
    }

    pub fn set_location(&mut self, location: &Path) {
        self.warn_if_running("location");
        self.location = location.to_path_buf();
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Sequence number the next frame will get
    pub fn next_sequence(&self) -> i32 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// File written by the last successful capture
    pub fn last_capture_url(&self) -> Option<PathBuf> {
        self.last_capture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Predicted file name of the next capture; nothing is created
    pub fn next_capture_url(&self) -> PathBuf {
        self.location.join(file_name(self.next_sequence(), self.format))
    }

    fn warn_if_running(&self, what: &str) {
        if self.machine.state() == ActivityState::Run {
            warn!(setting = what, "Capture in progress. Change will not take effect until next start");
        }
    }
}

impl Drop for ImageCapture {
    fn drop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_zero_padded() {
        assert_eq!(file_name(7, ImageFileFormat::Jpeg), "img_0007.jpg");
        assert_eq!(file_name(12345, ImageFileFormat::Png), "img_12345.png");
    }
}
