// SPDX-License-Identifier: GPL-3.0-only

//! Streaming graph description
//!
//! ```text
//! source ─ convert ─ crop ─ scale ─ convert ─ caps(I420[, WxH]) ─ tee
//!                                                      ├─ encode ─ tenc ─ pay0  (network)
//!                                                      ├─ vvideo ─ encode ─ fsvideo  (record)
//!                                                      └─ vimage ─ jpeg ─ fsimage    (still)
//! ```
//!
//! Both gates start closed; snapshots and local recordings open them on a
//! running graph. `tenc` has a single branch and is a tap point on the
//! encoded stream.

use crate::constants::{elements, rtsp};

/// Where the streaming graph gets its frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSource {
    /// The engine opens the kernel capture node itself
    Native { device_id: String },
    /// Frames are pushed from the device adapter
    Application,
}

impl StreamSource {
    pub fn element(&self) -> String {
        match self {
            StreamSource::Native { device_id } => format!("v4l2src device=/dev/{}", device_id),
            StreamSource::Application => format!("appsrc name={}", elements::APP_SOURCE),
        }
    }
}

/// Pick the stream size: query first, then the configured size
///
/// `None` leaves the size out of the caps so the engine negotiates the
/// device's native size.
pub fn resolve_size(requested: Option<(u32, u32)>, configured: (u32, u32)) -> Option<(u32, u32)> {
    requested.or_else(|| (configured.0 > 0 && configured.1 > 0).then_some(configured))
}

/// Encoder fragment for an encoder element name
pub fn encoder_fragment(encoder: &str) -> String {
    if encoder == rtsp::DEFAULT_ENCODER {
        format!("{} tune=zerolatency", encoder)
    } else {
        encoder.to_string()
    }
}

/// Build the full launch description for one client session
pub fn stream_description(source: &StreamSource, size: Option<(u32, u32)>, encoder: &str) -> String {
    let caps = match size {
        Some((width, height)) => {
            format!("video/x-raw, format=I420, width={}, height={}", width, height)
        }
        None => "video/x-raw, format=I420".to_string(),
    };
    let encoder = encoder_fragment(encoder);

    format!(
        "{source} ! queue ! videoconvert ! videocrop name={crop} ! videoscale ! videoconvert \
         ! {caps} ! tee name=traw \
         traw. ! queue ! {encoder} ! tee name=tenc tenc. ! h264parse ! rtph264pay name={pay} \
         traw. ! queue ! valve name={record_gate} drop=true ! {encoder} ! h264parse ! mpegtsmux \
         ! tsparse ! multifilesink name={record_sink} location={record_scratch} async=false next-file=1 \
         traw. ! queue ! valve name={still_gate} drop=true ! jpegenc ! queue \
         ! multifilesink name={still_sink} location={still_scratch} async=false",
        source = source.element(),
        crop = elements::CROP,
        caps = caps,
        encoder = encoder,
        pay = elements::PAYLOADER,
        record_gate = elements::RECORD_GATE,
        record_sink = elements::RECORD_SINK,
        record_scratch = rtsp::RECORDING_SCRATCH,
        still_gate = elements::STILL_GATE,
        still_sink = elements::STILL_SINK,
        still_scratch = rtsp::SNAPSHOT_SCRATCH,
    )
}
