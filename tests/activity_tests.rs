// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the image and video capture activities

mod common;

use camera_manager::backends::camera::{CameraHandle, PatternCamera, PixelFormat};
use camera_manager::errors::{MediaError, MediaResult};
use camera_manager::media::headless::HeadlessEngine;
use camera_manager::media::{MediaEngine, MediaGraph};
use camera_manager::pipelines::photo::{CaptureCallback, ImageCapture, ImageFileFormat};
use camera_manager::pipelines::state::{ActivityEvent, ActivityState};
use camera_manager::pipelines::video::{VideoCapture, VideoCodec, VideoFileFormat};
use std::sync::{Arc, Mutex};

fn recording_callback() -> (CaptureCallback, Arc<Mutex<Vec<(i32, i32)>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let calls_clone = Arc::clone(&calls);
    let callback: CaptureCallback = Arc::new(move |result, sequence| {
        calls_clone.lock().unwrap().push((result, sequence));
    });
    (callback, calls)
}

/// Engine whose every graph description is rejected
struct RejectingEngine;

impl MediaEngine for RejectingEngine {
    fn name(&self) -> &'static str {
        "rejecting"
    }

    fn parse_graph(&self, _description: &str) -> MediaResult<Box<dyn MediaGraph>> {
        Err(MediaError::ProtocolError("no such element".to_string()))
    }
}

// ===== Image capture =====

#[test]
fn test_image_start_before_init_is_rejected() {
    let (_, device) = common::pattern("video0");
    let mut capture = ImageCapture::new(device);
    let (callback, calls) = recording_callback();

    let result = capture.start(1, 1, callback);
    assert_eq!(
        result,
        Err(MediaError::InvalidState {
            from: ActivityState::Idle,
            event: ActivityEvent::Start,
        })
    );
    assert_eq!(capture.state(), ActivityState::Idle);
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn test_image_zero_interval_and_count_is_invalid_argument() {
    let (_, device) = common::pattern("video0");
    let mut capture = ImageCapture::new(device);
    let (callback, _) = recording_callback();

    // Argument validation comes before state validation
    assert!(matches!(
        capture.start(0, 0, Arc::clone(&callback)),
        Err(MediaError::InvalidArgument(_))
    ));
    assert_eq!(capture.state(), ActivityState::Idle);

    capture.init().unwrap();
    assert!(matches!(
        capture.start(0, -1, callback),
        Err(MediaError::InvalidArgument(_))
    ));
    assert_eq!(capture.state(), ActivityState::Init);
}

#[test]
fn test_image_count_bounded_run_returns_to_init() {
    let (_, device) = common::pattern("video0");
    let dir = common::scratch_dir("image-count");
    let mut capture = ImageCapture::new(device);
    capture.set_location(&dir);
    let (callback, calls) = recording_callback();

    capture.init().unwrap();
    capture.start(0, 3, callback).unwrap();
    capture.wait();

    assert_eq!(*calls.lock().unwrap(), vec![(0, 0), (0, 1), (0, 2)]);
    assert_eq!(capture.state(), ActivityState::Init);
    for name in ["img_0000.jpg", "img_0001.jpg", "img_0002.jpg"] {
        assert!(dir.join(name).is_file(), "{} should exist", name);
    }
    assert_eq!(capture.last_capture_url(), Some(dir.join("img_0002.jpg")));
    assert_eq!(capture.next_capture_url(), dir.join("img_0003.jpg"));
    assert!(!dir.join("img_0003.jpg").exists());

    capture.uninit().unwrap();
    assert_eq!(capture.state(), ActivityState::Idle);
}

#[test]
fn test_image_sequence_continues_across_runs() {
    let (_, device) = common::pattern("video0");
    let dir = common::scratch_dir("image-sequence");
    let mut capture = ImageCapture::new(device);
    capture.set_location(&dir);
    capture.set_format(ImageFileFormat::Png);
    capture.init().unwrap();

    let (callback, calls) = recording_callback();
    capture.start(0, 2, Arc::clone(&callback)).unwrap();
    capture.wait();
    capture.start(0, 1, callback).unwrap();
    capture.wait();

    assert_eq!(*calls.lock().unwrap(), vec![(0, 0), (0, 1), (0, 2)]);
    assert!(dir.join("img_0002.png").is_file());
}

#[test]
fn test_image_read_failure_consumes_sequence_number() {
    let (camera, device) = common::pattern("video0");
    let dir = common::scratch_dir("image-failure");
    let mut capture = ImageCapture::new(device);
    capture.set_location(&dir);
    let (callback, calls) = recording_callback();

    camera.fail_next_reads(1);
    capture.init().unwrap();
    capture.start(0, 2, callback).unwrap();
    capture.wait();

    assert_eq!(*calls.lock().unwrap(), vec![(-1, 0), (0, 1)]);
    assert!(!dir.join("img_0000.jpg").exists());
    assert!(dir.join("img_0001.jpg").is_file());
}

#[test]
fn test_image_odd_sized_i420_frames_are_encoded() {
    let device: CameraHandle = Arc::new(PatternCamera::new("video0", 3, 3, PixelFormat::Yuv420));
    let dir = common::scratch_dir("image-odd-i420");
    let mut capture = ImageCapture::new(device);
    capture.set_location(&dir);
    let (callback, calls) = recording_callback();

    capture.init().unwrap();
    capture.start(0, 2, callback).unwrap();
    capture.wait();

    assert_eq!(*calls.lock().unwrap(), vec![(0, 0), (0, 1)]);
    assert_eq!(capture.state(), ActivityState::Init);
    assert!(dir.join("img_0001.jpg").is_file());
}

#[test]
fn test_image_interval_run_until_stopped() {
    let (_, device) = common::pattern("video0");
    let dir = common::scratch_dir("image-interval");
    let mut capture = ImageCapture::new(device);
    capture.set_location(&dir);
    let (callback, calls) = recording_callback();

    capture.init().unwrap();
    capture.start(1, 0, Arc::clone(&callback)).unwrap();
    assert_eq!(capture.state(), ActivityState::Run);
    assert_eq!(capture.interval(), 1);

    // Starting again while running is rejected and changes nothing
    assert!(matches!(
        capture.start(1, 0, callback),
        Err(MediaError::InvalidState { .. })
    ));
    assert_eq!(capture.state(), ActivityState::Run);

    capture.stop().unwrap();
    assert_eq!(capture.state(), ActivityState::Init);
    assert!(!calls.lock().unwrap().is_empty());

    capture.uninit().unwrap();
    assert_eq!(capture.state(), ActivityState::Idle);
}

#[test]
fn test_image_negative_interval_setter_rejected() {
    let (_, device) = common::pattern("video0");
    let mut capture = ImageCapture::new(device);
    assert!(matches!(capture.set_interval(-1), Err(MediaError::InvalidArgument(_))));
    capture.set_interval(5).unwrap();
    assert_eq!(capture.interval(), 5);
}

#[test]
fn test_image_resolution_defaults_to_device_size() {
    let (_, device) = common::pattern("video0");
    let capture = ImageCapture::new(device);
    assert_eq!(capture.resolution(), (common::WIDTH, common::HEIGHT));
}

// ===== Video capture =====

#[test]
fn test_video_full_cycle() {
    let (_, device) = common::pattern("video0");
    let dir = common::scratch_dir("video-cycle");
    let engine = Arc::new(HeadlessEngine::new());
    let mut video = VideoCapture::new(device, engine.clone());
    video.set_location(&dir);

    assert!(matches!(video.start(), Err(MediaError::InvalidState { .. })));
    assert_eq!(video.state(), ActivityState::Idle);

    video.init().unwrap();
    video.start().unwrap();
    assert_eq!(video.state(), ActivityState::Run);
    assert_eq!(engine.graphs_parsed(), 1);

    let output = video.current_capture_url().unwrap().to_path_buf();
    assert_eq!(output.parent(), Some(dir.as_path()));
    assert_eq!(output.extension().and_then(|e| e.to_str()), Some("ts"));

    assert!(matches!(video.start(), Err(MediaError::InvalidState { .. })));
    assert_eq!(video.state(), ActivityState::Run);

    video.stop().unwrap();
    assert_eq!(video.state(), ActivityState::Init);
    assert_eq!(video.last_capture_url(), Some(output.as_path()));
    assert!(video.current_capture_url().is_none());

    video.uninit().unwrap();
    assert_eq!(video.state(), ActivityState::Idle);
}

#[test]
fn test_video_location_with_spaces_records() {
    let (_, device) = common::pattern("video0");
    let dir = common::scratch_dir("video-spaces").join("my videos");
    std::fs::create_dir_all(&dir).unwrap();
    let mut video = VideoCapture::new(device, Arc::new(HeadlessEngine::new()));
    video.set_location(&dir);

    video.init().unwrap();
    video.start().unwrap();
    assert_eq!(video.state(), ActivityState::Run);
    assert_eq!(
        video.current_capture_url().and_then(|path| path.parent()),
        Some(dir.as_path())
    );

    video.stop().unwrap();
    assert_eq!(video.state(), ActivityState::Init);
}

#[test]
fn test_video_setters_while_running_are_deferred() {
    let (_, device) = common::pattern("video0");
    let mut video = VideoCapture::new(device, Arc::new(HeadlessEngine::new()));
    video.set_location(&common::scratch_dir("video-setters"));
    video.init().unwrap();
    video.start().unwrap();

    video.set_resolution(1280, 720);
    video.set_bitrate(2048);
    video.set_framerate(15);
    video.set_encoder(VideoCodec::Mjpeg);
    video.set_format(VideoFileFormat::Avi);
    assert_eq!(video.state(), ActivityState::Run);

    // The running recording keeps its original container
    let current = video.current_capture_url().unwrap().to_path_buf();
    assert_eq!(current.extension().and_then(|e| e.to_str()), Some("ts"));

    video.stop().unwrap();
    assert_eq!(video.resolution(), (1280, 720));
    assert_eq!(video.bitrate(), 2048);
    assert_eq!(video.framerate(), 15);
    assert_eq!(video.encoder(), VideoCodec::Mjpeg);
    assert_eq!(video.format(), VideoFileFormat::Avi);
}

#[test]
fn test_video_engine_failure_faults_activity() {
    let (_, device) = common::pattern("video0");
    let mut video = VideoCapture::new(device, Arc::new(RejectingEngine));
    video.init().unwrap();

    assert!(matches!(video.start(), Err(MediaError::ProtocolError(_))));
    assert_eq!(video.state(), ActivityState::Error);

    // Error only drains through uninit
    video.stop().unwrap();
    assert_eq!(video.state(), ActivityState::Error);
    assert!(matches!(video.init(), Err(MediaError::InvalidState { .. })));
    video.uninit().unwrap();
    assert_eq!(video.state(), ActivityState::Idle);
}
