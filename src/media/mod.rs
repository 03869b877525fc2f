// SPDX-License-Identifier: GPL-3.0-only

//! Media engine seam
//!
//! Activities describe graphs as text, hand them to a [`MediaEngine`] and then
//! steer the running graph through named elements. Element handles are weak:
//! the engine (or the network layer it hands the graph to) owns the graph, and
//! a handle whose element is gone simply fails with `NotFound`.
//!
//! Two engines exist:
//! - [`headless::HeadlessEngine`]: in-process, records property changes, used
//!   by tests and dry runs
//! - `gst::GstEngine`: GStreamer, behind the `gst` feature

pub mod headless;
#[cfg(feature = "gst")]
pub mod gst;

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::backends::camera::{CameraDevice, CameraFrame, PixelFormat};
use crate::errors::MediaResult;

/// Value assigned to an element property
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i32),
    UInt(u32),
    Str(String),
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        PropertyValue::UInt(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Str(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Str(value)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::UInt(v) => write!(f, "{}", v),
            PropertyValue::Str(v) => f.write_str(v),
        }
    }
}

/// Execution state of a graph or element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    Null,
    Ready,
    Paused,
    Playing,
}

/// Weak, name-resolved reference to an element inside a running graph
pub trait ElementHandle: Send + Sync {
    fn name(&self) -> &str;

    /// False once the owning graph has been destroyed
    fn is_alive(&self) -> bool;

    fn property(&self, name: &str) -> MediaResult<PropertyValue>;

    fn set_property(&self, name: &str, value: PropertyValue) -> MediaResult<()>;

    fn set_state(&self, state: ElementState) -> MediaResult<()>;
}

pub type ElementRef = Arc<dyn ElementHandle>;

/// Caps of an application-fed source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSourceConfig {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub framerate: i32,
}

impl FrameSourceConfig {
    pub fn caps_string(&self) -> String {
        format!(
            "video/x-raw,format={},width={},height={},framerate={}/1",
            self.format.caps_name(),
            self.width,
            self.height,
            self.framerate
        )
    }
}

/// Called by the engine whenever an application source needs another frame;
/// `None` means push nothing
pub type FramePuller = Box<dyn FnMut() -> Option<CameraFrame> + Send>;

/// A parsed graph
pub trait MediaGraph: Send + Sync {
    fn description(&self) -> &str;

    /// Look up an element by its `name=` in the description
    fn element(&self, name: &str) -> Option<ElementRef>;

    /// Handle on the graph itself
    fn root(&self) -> ElementRef;

    /// Set caps on the named application source and feed it from `puller`
    fn configure_frame_source(
        &self,
        name: &str,
        config: &FrameSourceConfig,
        puller: FramePuller,
    ) -> MediaResult<()>;

    fn set_state(&self, state: ElementState) -> MediaResult<()>;

    fn send_eos(&self) -> MediaResult<()>;

    /// Lets a network layer recover its engine's concrete graph type
    fn as_any(&self) -> &dyn Any;
}

/// Parses textual graph descriptions
pub trait MediaEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fails with `ProtocolError` on a malformed description
    fn parse_graph(&self, description: &str) -> MediaResult<Box<dyn MediaGraph>>;
}

/// Feed an application source from a device
///
/// Returns nothing once `live` is cleared, so the engine may keep asking after
/// a stop without faulting. A failed read is replaced by one solid white frame
/// of the device geometry, allocated on first use and reused afterwards.
pub fn device_frame_puller(device: Arc<dyn CameraDevice>, live: Arc<AtomicBool>) -> FramePuller {
    let (width, height) = device.size();
    let format = device.pixel_format();
    let mut fallback: Option<CameraFrame> = None;

    Box::new(move || {
        if !live.load(Ordering::Acquire) {
            return None;
        }
        match device.read() {
            Ok(frame) => Some(frame),
            Err(err) => {
                warn!(
                    device = %device.device_id(),
                    error = %err,
                    "Camera returned no frame, pushing solid frame"
                );
                let frame = fallback
                    .get_or_insert_with(|| CameraFrame::solid(width, height, format, 0xFF));
                Some(frame.clone())
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::PatternCamera;

    #[test]
    fn puller_substitutes_solid_frame_on_read_failure() {
        let camera = Arc::new(PatternCamera::new("p", 4, 4, PixelFormat::Rgb24));
        let live = Arc::new(AtomicBool::new(true));
        let mut pull = device_frame_puller(camera.clone(), live.clone());

        camera.fail_next_reads(2);
        let first = pull().unwrap();
        let second = pull().unwrap();
        assert_eq!(first.len(), 4 * 4 * 3);
        assert!(first.data.iter().all(|b| *b == 0xFF));
        assert!(Arc::ptr_eq(&first.data, &second.data));

        live.store(false, Ordering::Release);
        assert!(pull().is_none());
    }

    #[test]
    fn caps_string_lists_geometry() {
        let config = FrameSourceConfig {
            format: PixelFormat::Uyvy,
            width: 640,
            height: 480,
            framerate: 25,
        };
        assert_eq!(
            config.caps_string(),
            "video/x-raw,format=UYVY,width=640,height=480,framerate=25/1"
        );
    }
}
