// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! This module provides command-line functionality for:
//! - Streaming a camera over RTSP
//! - Listing available cameras
//! - Capturing still images
//! - Recording videos

use camera_manager::backends::camera::{CameraHandle, PatternCamera, PixelFormat};
use camera_manager::component::CameraComponent;
use camera_manager::config::Config;
use camera_manager::media::MediaEngine;
use camera_manager::media::headless::HeadlessEngine;
use camera_manager::pipelines::photo::{CaptureCallback, ImageCapture};
use camera_manager::pipelines::video::VideoCapture;
use camera_manager::streaming::ServerRegistry;
use camera_manager::streaming::StreamServerBackend;
use camera_manager::streaming::loopback::LoopbackBackend;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Device name selecting the built-in test pattern
const PATTERN_DEVICE: &str = "pattern";
const PATTERN_SIZE: (u32, u32) = (1280, 720);

pub struct ServeOptions {
    pub device: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub size: Option<(u32, u32)>,
    pub headless: bool,
}

/// Load the configuration named on the command line, else the default file
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn Error>> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None => match Config::default_path() {
            Some(path) => Config::load_or_default(&path)?,
            None => Config::default(),
        },
    };
    Ok(config)
}

/// Stream a camera until Ctrl+C
pub fn serve(mut config: Config, options: ServeOptions) -> Result<(), Box<dyn Error>> {
    if let Some(host) = options.host {
        config.rtsp.host = host;
    }
    if let Some(port) = options.port {
        config.rtsp.port = port;
    }
    if let Some((width, height)) = options.size {
        config.rtsp.width = Some(width);
        config.rtsp.height = Some(height);
    }

    let device = open_device(&options.device)?;
    let engine = media_engine(options.headless)?;
    let registry = Arc::new(ServerRegistry::new(server_backend(options.headless)?));

    let mut camera = CameraComponent::new(device, engine, registry, config);
    camera.start()?;
    camera.start_video_stream()?;

    if let Some(stream) = camera.video_stream() {
        println!("Streaming at {}", stream.stream_url());
    }
    println!("Press Ctrl+C to stop");

    if options.headless {
        wait_for_interrupt(None)?;
    } else {
        run_main_loop()?;
    }

    println!();
    println!("Stopping...");
    camera.stop_video_stream()?;
    camera.stop()?;
    Ok(())
}

/// List all available cameras
pub fn list_cameras() -> Result<(), Box<dyn Error>> {
    let cameras = enumerate_cameras()?;

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for (path, card) in cameras {
        println!("  {}  {}", path, card);
    }
    Ok(())
}

/// Capture `count` images `interval` seconds apart
///
/// A non-positive count captures until Ctrl+C.
pub fn take_photos(
    config: Config,
    device: &str,
    count: i32,
    interval: i32,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let device = open_device(device)?;
    println!("Using camera: {}", device.info().model);

    let output_dir = output.unwrap_or_else(|| config.image_location.clone());
    std::fs::create_dir_all(&output_dir)?;

    let mut capture = ImageCapture::with_settings(device, config.image);
    capture.set_location(&output_dir);
    capture.init()?;

    let callback: CaptureCallback = Arc::new(|result, sequence| {
        if result == 0 {
            println!("Captured image {}", sequence);
        } else {
            eprintln!("Image {} failed", sequence);
        }
    });
    capture.start(interval, count, callback)?;

    if count > 0 {
        capture.wait();
    } else {
        println!("Capturing every {} s (press Ctrl+C to stop)", interval);
        wait_for_interrupt(None)?;
        capture.stop()?;
    }

    if let Some(last) = capture.last_capture_url() {
        println!("Last image: {}", last.display());
    }
    capture.uninit()?;
    Ok(())
}

/// Record a video for `duration` seconds
pub fn record_video(
    config: Config,
    device: &str,
    duration: u64,
    output: Option<PathBuf>,
    headless: bool,
) -> Result<(), Box<dyn Error>> {
    let device = open_device(device)?;
    println!("Using camera: {}", device.info().model);

    let output_dir = output.unwrap_or_else(|| config.video_location.clone());
    std::fs::create_dir_all(&output_dir)?;

    let mut recorder = VideoCapture::with_settings(device, media_engine(headless)?, config.video);
    recorder.set_location(&output_dir);
    recorder.init()?;

    let (width, height) = recorder.resolution();
    println!(
        "Recording format: {}x{} @ {} fps, {} kbps",
        width,
        height,
        recorder.framerate(),
        recorder.bitrate()
    );

    recorder.start()?;
    if let Some(path) = recorder.current_capture_url() {
        println!("Output: {}", path.display());
    }
    println!("Duration: {} seconds", duration);
    println!();
    println!("Recording... (press Ctrl+C to stop early)");

    wait_for_interrupt(Some(Duration::from_secs(duration)))?;
    println!();

    recorder.stop()?;
    if let Some(path) = recorder.last_capture_url() {
        println!("Video saved: {}", path.display());
    }
    recorder.uninit()?;
    Ok(())
}

/// Block until Ctrl+C or until `limit` has elapsed
fn wait_for_interrupt(limit: Option<Duration>) -> Result<(), Box<dyn Error>> {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    let start = Instant::now();
    while !stop_flag.load(Ordering::SeqCst) {
        if let Some(limit) = limit {
            if start.elapsed() >= limit {
                return Ok(());
            }
            let elapsed = start.elapsed().as_secs();
            print!("\rRecording: {:02}:{:02}", elapsed / 60, elapsed % 60);
            std::io::Write::flush(&mut std::io::stdout())?;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Ok(())
}

fn open_device(device: &str) -> Result<CameraHandle, Box<dyn Error>> {
    if device == PATTERN_DEVICE {
        let (width, height) = PATTERN_SIZE;
        return Ok(Arc::new(PatternCamera::new(
            PATTERN_DEVICE,
            width,
            height,
            PixelFormat::Yuv420,
        )));
    }
    open_v4l2(device)
}

#[cfg(feature = "v4l2")]
fn open_v4l2(device: &str) -> Result<CameraHandle, Box<dyn Error>> {
    use camera_manager::backends::camera::v4l2::V4l2Camera;

    let path = if device.starts_with('/') {
        device.to_string()
    } else {
        format!("/dev/{}", device)
    };
    Ok(Arc::new(V4l2Camera::open(&path)?))
}

#[cfg(not(feature = "v4l2"))]
fn open_v4l2(device: &str) -> Result<CameraHandle, Box<dyn Error>> {
    Err(format!("Cannot open {}: built without the v4l2 feature", device).into())
}

#[cfg(feature = "v4l2")]
fn enumerate_cameras() -> Result<Vec<(String, String)>, Box<dyn Error>> {
    Ok(camera_manager::backends::camera::v4l2::V4l2Camera::enumerate())
}

#[cfg(not(feature = "v4l2"))]
fn enumerate_cameras() -> Result<Vec<(String, String)>, Box<dyn Error>> {
    Err("Camera listing needs the v4l2 feature".into())
}

fn media_engine(headless: bool) -> Result<Arc<dyn MediaEngine>, Box<dyn Error>> {
    if headless {
        return Ok(Arc::new(HeadlessEngine::new()));
    }
    gst_engine()
}

fn server_backend(headless: bool) -> Result<Arc<dyn StreamServerBackend>, Box<dyn Error>> {
    if headless {
        return Ok(Arc::new(LoopbackBackend::new()));
    }
    gst_server_backend()
}

#[cfg(feature = "gst")]
fn gst_engine() -> Result<Arc<dyn MediaEngine>, Box<dyn Error>> {
    Ok(Arc::new(camera_manager::media::gst::GstEngine::new()?))
}

#[cfg(feature = "gst")]
fn gst_server_backend() -> Result<Arc<dyn StreamServerBackend>, Box<dyn Error>> {
    Ok(Arc::new(camera_manager::streaming::gst_server::GstRtspBackend))
}

/// Serve RTSP clients from the default main context until Ctrl+C
#[cfg(feature = "gst")]
fn run_main_loop() -> Result<(), Box<dyn Error>> {
    use gstreamer::glib;

    let main_loop = glib::MainLoop::new(None, false);
    let quit = main_loop.clone();
    ctrlc::set_handler(move || quit.quit())?;
    main_loop.run();
    Ok(())
}

#[cfg(not(feature = "gst"))]
fn gst_engine() -> Result<Arc<dyn MediaEngine>, Box<dyn Error>> {
    Err("Built without the gst feature; use --headless".into())
}

#[cfg(not(feature = "gst"))]
fn gst_server_backend() -> Result<Arc<dyn StreamServerBackend>, Box<dyn Error>> {
    Err("Built without the gst feature; use --headless".into())
}

#[cfg(not(feature = "gst"))]
fn run_main_loop() -> Result<(), Box<dyn Error>> {
    Err("Built without the gst feature; use --headless".into())
}
