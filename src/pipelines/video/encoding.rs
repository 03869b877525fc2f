// SPDX-License-Identifier: GPL-3.0-only

//! Recording graph description
//!
//! ```text
//! source ─ queue ─ convert ─ scale ─ rate ─ caps(WxH@F) ─ encoder ─ parser ─ muxer ─ filesink
//! ```

use std::path::Path;

use super::{VideoCodec, VideoFileFormat, VideoSettings};
use crate::constants::elements;
use crate::streaming::launch::StreamSource;

/// Encoder plus parser for a codec at `bitrate_kbps`
pub fn encoder_fragment(codec: VideoCodec, bitrate_kbps: u32) -> String {
    let bps = u64::from(bitrate_kbps) * 1000;
    match codec {
        VideoCodec::Avc => format!(
            "x264enc bitrate={} tune=zerolatency speed-preset=ultrafast ! h264parse",
            bitrate_kbps
        ),
        VideoCodec::Mpeg4 => format!("avenc_mpeg4 bitrate={} ! mpeg4videoparse", bps),
        VideoCodec::H263 => format!("avenc_h263 bitrate={}", bps),
        VideoCodec::Mjpeg => "jpegenc ! jpegparse".to_string(),
        VideoCodec::Wmv => format!("avenc_wmv2 bitrate={}", bps),
    }
}

/// Muxer element for a container
pub fn muxer_element(format: VideoFileFormat) -> &'static str {
    match format {
        VideoFileFormat::Mp4 => "mp4mux",
        VideoFileFormat::Avi => "avimux",
        VideoFileFormat::Wmv => "asfmux",
        VideoFileFormat::Flv => "flvmux",
        VideoFileFormat::Mov => "qtmux",
        VideoFileFormat::Ts => "mpegtsmux",
    }
}

/// Source element of a recording graph
pub fn recording_source(source: &StreamSource) -> String {
    match source {
        StreamSource::Native { device_id } => format!("v4l2src device=/dev/{}", device_id),
        StreamSource::Application => format!("appsrc name={}", elements::RECORDING_SOURCE),
    }
}

/// Double-quote a property value for a launch description
fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Full launch description of a recording to `output`
pub fn recording_description(source: &StreamSource, settings: &VideoSettings, output: &Path) -> String {
    format!(
        "{source} ! queue ! videoconvert ! videoscale ! videorate \
         ! video/x-raw, width={width}, height={height}, framerate={fps}/1 \
         ! {encoder} ! {muxer} ! filesink name={sink} location={location}",
        source = recording_source(source),
        width = settings.width,
        height = settings.height,
        fps = settings.framerate,
        encoder = encoder_fragment(settings.encoder, settings.bitrate),
        muxer = muxer_element(settings.file_format),
        sink = elements::RECORDING_SINK,
        location = quoted(&output.display().to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn defaults_record_avc_in_transport_stream() {
        let desc = recording_description(
            &StreamSource::Application,
            &VideoSettings::default(),
            &PathBuf::from("/tmp/video_1.ts"),
        );
        assert!(desc.starts_with("appsrc name=recsrc ! queue"));
        assert!(desc.contains("width=3840, height=2160, framerate=30/1"));
        assert!(desc.contains("x264enc bitrate=512"));
        assert!(desc.contains("! mpegtsmux ! filesink name=recsink location=\"/tmp/video_1.ts\""));
    }

    #[test]
    fn output_path_with_spaces_stays_one_property() {
        let desc = recording_description(
            &StreamSource::Application,
            &VideoSettings::default(),
            &PathBuf::from("/tmp/my videos/video_1.ts"),
        );
        assert!(desc.ends_with("location=\"/tmp/my videos/video_1.ts\""));
        assert_eq!(quoted(r#"a"b\c"#), r#""a\"b\\c""#);
    }

    #[test]
    fn bitrate_is_scaled_for_libav_encoders() {
        assert_eq!(
            encoder_fragment(VideoCodec::Mpeg4, 512),
            "avenc_mpeg4 bitrate=512000 ! mpeg4videoparse"
        );
        assert_eq!(muxer_element(VideoFileFormat::Mov), "qtmux");
    }
}
