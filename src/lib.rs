// SPDX-License-Identifier: GPL-3.0-only

//! Camera Manager - still capture, recording and RTSP streaming for one camera
//!
//! A camera is exposed as three independently controlled media activities
//! that share one lifecycle (Idle, Init, Run, Error) and one device handle.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Camera device contract and adapters (V4L2, test pattern)
//! - [`media`]: Media engine seam, headless engine and GStreamer engine
//! - [`pipelines`]: Activity state machine, image capture and video capture
//! - [`streaming`]: RTSP stream activity, sessions and the shared server registry
//! - [`component`]: Orchestrator owning the device and its activities
//! - [`parameters`]: Typed camera parameter table
//! - [`config`]: User configuration handling
//! - [`storage`]: Capture storage information
//!
//! # Example
//!
//! ```ignore
//! let device: CameraHandle = Arc::new(PatternCamera::new("video0", 640, 480, PixelFormat::Yuv420));
//! let registry = Arc::new(ServerRegistry::new(Arc::new(LoopbackBackend::new())));
//! let mut camera = CameraComponent::new(device, Arc::new(HeadlessEngine::new()), registry, Config::default());
//! camera.start()?;
//! camera.start_video_stream()?;
//! ```

pub mod backends;
pub mod component;
pub mod config;
pub mod constants;
pub mod errors;
pub mod media;
pub mod parameters;
pub mod pipelines;
pub mod storage;
pub mod streaming;

// Re-export commonly used types
pub use backends::camera::{CameraDevice, CameraHandle, PatternCamera, PixelFormat};
pub use component::CameraComponent;
pub use config::Config;
pub use errors::{MediaError, MediaResult, ParamError};
pub use pipelines::state::{ActivityEvent, ActivityState};
