// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer media engine
//!
//! Descriptions go through `gst::parse::launch`. Element handles hold a
//! `glib::WeakRef`, so once the RTSP server (or the recorder) drops the
//! pipeline every handle reports `NotFound` instead of touching freed state.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};

use gstreamer as gst;
use gstreamer::glib;
use gstreamer::prelude::*;
use gstreamer_app::AppSrc;
use tracing::{debug, error, info};

use super::{
    ElementHandle, ElementRef, ElementState, FramePuller, FrameSourceConfig, MediaEngine,
    MediaGraph, PropertyValue,
};
use crate::errors::{MediaError, MediaResult};
use std::sync::Arc;

/// Frames pushed into application sources, for periodic logging
static FRAME_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Engine backed by the GStreamer runtime
#[derive(Debug)]
pub struct GstEngine;

impl GstEngine {
    /// Initialize GStreamer
    pub fn new() -> MediaResult<Self> {
        gst::init().map_err(|e| {
            MediaError::ResourceUnavailable(format!("Failed to initialize GStreamer: {}", e))
        })?;
        info!(version = %gst::version_string(), "GStreamer initialized");
        Ok(Self)
    }
}

impl MediaEngine for GstEngine {
    fn name(&self) -> &'static str {
        "gstreamer"
    }

    fn parse_graph(&self, description: &str) -> MediaResult<Box<dyn MediaGraph>> {
        let element = gst::parse::launch(description).map_err(|e| {
            error!(error = %e, "Failed to parse graph description");
            MediaError::ProtocolError(e.to_string())
        })?;
        debug!(name = %element.name(), "Parsed GStreamer graph");
        Ok(Box::new(GstGraph {
            description: description.to_string(),
            element,
        }))
    }
}

/// Parsed GStreamer pipeline
pub struct GstGraph {
    description: String,
    element: gst::Element,
}

impl GstGraph {
    /// The top-level element, for handing ownership to the RTSP server
    pub fn element(&self) -> gst::Element {
        self.element.clone()
    }

    fn by_name(&self, name: &str) -> Option<gst::Element> {
        self.element
            .downcast_ref::<gst::Bin>()
            .and_then(|bin| bin.by_name(name))
    }
}

fn to_gst_state(state: ElementState) -> gst::State {
    match state {
        ElementState::Null => gst::State::Null,
        ElementState::Ready => gst::State::Ready,
        ElementState::Paused => gst::State::Paused,
        ElementState::Playing => gst::State::Playing,
    }
}

impl MediaGraph for GstGraph {
    fn description(&self) -> &str {
        &self.description
    }

    fn element(&self, name: &str) -> Option<ElementRef> {
        self.by_name(name)
            .map(|e| Arc::new(GstElementRef::new(name, &e)) as ElementRef)
    }

    fn root(&self) -> ElementRef {
        Arc::new(GstElementRef::new(&self.element.name(), &self.element))
    }

    fn configure_frame_source(
        &self,
        name: &str,
        config: &FrameSourceConfig,
        mut puller: FramePuller,
    ) -> MediaResult<()> {
        let appsrc = self
            .by_name(name)
            .ok_or_else(|| MediaError::NotFound(format!("frame source {}", name)))?
            .downcast::<AppSrc>()
            .map_err(|_| MediaError::InvalidArgument(format!("{} is not an appsrc", name)))?;

        let caps = gst::Caps::builder("video/x-raw")
            .field("format", config.format.caps_name())
            .field("width", config.width as i32)
            .field("height", config.height as i32)
            .field("framerate", gst::Fraction::new(config.framerate, 1))
            .build();

        appsrc.set_caps(Some(&caps));
        appsrc.set_format(gst::Format::Time);
        appsrc.set_is_live(true);
        appsrc.set_do_timestamp(true);

        appsrc.set_callbacks(
            gstreamer_app::AppSrcCallbacks::builder()
                .need_data(move |appsrc, _length| {
                    let Some(frame) = puller() else {
                        return;
                    };
                    let buffer = gst::Buffer::from_slice(frame.data);
                    match appsrc.push_buffer(buffer) {
                        Ok(_) => {
                            let count = FRAME_COUNTER.fetch_add(1, Ordering::Relaxed);
                            if count % 100 == 0 {
                                debug!(frame = count, "Frames pushed to application source");
                            }
                        }
                        Err(e) => error!(?e, "Failed to push frame to application source"),
                    }
                })
                .build(),
        );

        debug!(source = name, caps = %caps, "Configured application source");
        Ok(())
    }

    fn set_state(&self, state: ElementState) -> MediaResult<()> {
        self.element
            .set_state(to_gst_state(state))
            .map(|_| ())
            .map_err(|e| MediaError::ResourceUnavailable(format!("state change failed: {}", e)))
    }

    fn send_eos(&self) -> MediaResult<()> {
        if self.element.send_event(gst::event::Eos::new()) {
            Ok(())
        } else {
            Err(MediaError::ResourceUnavailable(
                "end-of-stream was not handled".into(),
            ))
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Weak reference to a GStreamer element
struct GstElementRef {
    name: String,
    element: glib::WeakRef<gst::Element>,
}

impl GstElementRef {
    fn new(name: &str, element: &gst::Element) -> Self {
        Self {
            name: name.to_string(),
            element: element.downgrade(),
        }
    }

    fn upgrade(&self) -> MediaResult<gst::Element> {
        self.element
            .upgrade()
            .ok_or_else(|| MediaError::NotFound(format!("element {} is gone", self.name)))
    }
}

impl ElementHandle for GstElementRef {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_alive(&self) -> bool {
        self.element.upgrade().is_some()
    }

    fn property(&self, name: &str) -> MediaResult<PropertyValue> {
        let element = self.upgrade()?;
        if element.find_property(name).is_none() {
            return Err(MediaError::NotFound(format!("{}.{}", self.name, name)));
        }
        let value = element.property_value(name);
        if let Ok(v) = value.get::<bool>() {
            Ok(PropertyValue::Bool(v))
        } else if let Ok(v) = value.get::<i32>() {
            Ok(PropertyValue::Int(v))
        } else if let Ok(v) = value.get::<u32>() {
            Ok(PropertyValue::UInt(v))
        } else if let Ok(v) = value.get::<Option<String>>() {
            Ok(PropertyValue::Str(v.unwrap_or_default()))
        } else {
            Err(MediaError::InvalidArgument(format!(
                "{}.{} has unsupported type {}",
                self.name,
                name,
                value.type_()
            )))
        }
    }

    fn set_property(&self, name: &str, value: PropertyValue) -> MediaResult<()> {
        let element = self.upgrade()?;
        let pspec = element
            .find_property(name)
            .ok_or_else(|| MediaError::NotFound(format!("{}.{}", self.name, name)))?;

        let gvalue = match &value {
            PropertyValue::Bool(v) => v.to_value(),
            PropertyValue::Int(v) => v.to_value(),
            PropertyValue::UInt(v) => v.to_value(),
            PropertyValue::Str(v) => v.to_value(),
        };
        if !gvalue.type_().is_a(pspec.value_type()) {
            return Err(MediaError::InvalidArgument(format!(
                "{}.{} expects {}, got {}",
                self.name,
                name,
                pspec.value_type(),
                value
            )));
        }

        element.set_property_from_value(name, &gvalue);
        Ok(())
    }

    fn set_state(&self, state: ElementState) -> MediaResult<()> {
        let element = self.upgrade()?;
        element
            .set_state(to_gst_state(state))
            .map(|_| ())
            .map_err(|e| {
                MediaError::ResourceUnavailable(format!("{}: state change failed: {}", self.name, e))
            })
    }
}
