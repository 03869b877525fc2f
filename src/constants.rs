// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// RTSP server defaults
pub mod rtsp {
    /// Address the shared server binds to when none is configured
    pub const DEFAULT_HOST: &str = "127.0.0.1";

    /// RTSP service port
    pub const DEFAULT_PORT: u16 = 8554;

    /// Devices whose id contains this marker share a fixed mount point
    pub const SIMULATOR_MARKER: &str = "gazebo";

    /// Mount point used for simulator devices
    pub const SIMULATOR_MOUNT: &str = "/gazebo";

    /// Frame rate advertised by the application source
    pub const APP_SOURCE_FPS: i32 = 25;

    /// Default H.264 encoder element for streaming
    pub const DEFAULT_ENCODER: &str = "x264enc";

    /// Scratch location of the stream-side recording sink
    pub const RECORDING_SCRATCH: &str = "/tmp/recording.ts";

    /// Scratch location pattern of the stream-side still sink
    pub const SNAPSHOT_SCRATCH: &str = "/tmp/img__%0004d.jpg";
}

/// Names of control points inside a streaming graph
pub mod elements {
    pub const CROP: &str = "crop";
    pub const STILL_GATE: &str = "vimage";
    pub const STILL_SINK: &str = "fsimage";
    pub const RECORD_GATE: &str = "vvideo";
    pub const RECORD_SINK: &str = "fsvideo";
    pub const APP_SOURCE: &str = "mysrc";
    pub const PAYLOADER: &str = "pay0";

    /// Application source of the recording graph
    pub const RECORDING_SOURCE: &str = "recsrc";
    /// File sink of the recording graph
    pub const RECORDING_SINK: &str = "recsink";
}

/// Digital zoom, applied as symmetric crop margins
pub mod zoom {
    /// Pixels cropped from left and right per zoom step
    pub const WIDTH_PER_SIDE: i32 = 80;
    /// Pixels cropped from top and bottom per zoom step
    pub const HEIGHT_PER_SIDE: i32 = 45;
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// How long the still gate stays open for one snapshot
    pub const SNAPSHOT_PULSE: Duration = Duration::from_millis(75);

    /// Settle delay between record sink reset, relocation and restart
    pub const RECORD_SINK_SETTLE: Duration = Duration::from_millis(30);

    /// Cadence of the expired-session sweep on shared servers
    pub const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(2);

    /// Time given to the muxer to finalize after end-of-stream
    pub const EOS_FINALIZE: Duration = Duration::from_millis(500);
}

/// Default capture settings
pub mod defaults {
    pub const VIDEO_WIDTH: u32 = 3840;
    pub const VIDEO_HEIGHT: u32 = 2160;
    /// Kilobits per second
    pub const VIDEO_BITRATE: u32 = 512;
    pub const VIDEO_FRAMERATE: u32 = 30;
    pub const CAPTURE_LOCATION: &str = "/tmp/";
    pub const STORAGE_PATH: &str = "/mnt/sdcard";

    /// Reported when the storage path cannot be queried, in MiB
    pub const STORAGE_CAPACITY_MIB: f64 = 8000.0;
    pub const STORAGE_AVAILABLE_MIB: f64 = 4000.0;
    pub const STORAGE_USED_MIB: f64 = 4000.0;
}

/// Configuration file location under the user config directory
pub mod app_info {
    pub const CONFIG_DIR: &str = "camera-manager";
    pub const CONFIG_FILE: &str = "config.json";
}
