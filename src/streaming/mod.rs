// SPDX-License-Identifier: GPL-3.0-only

//! Live streaming over RTSP
//!
//! - [`query`]: request query parsing
//! - [`launch`]: streaming graph description
//! - [`session`]: per-path session state and runtime controls
//! - [`server`]: network layer traits and the shared server registry
//! - [`rtsp`]: the stream activity
//! - [`loopback`]: in-process network layer
//! - `gst_server`: gst-rtsp-server network layer (`gst` feature)

#[cfg(feature = "gst")]
pub mod gst_server;
pub mod launch;
pub mod loopback;
pub mod query;
pub mod rtsp;
pub mod server;
pub mod session;

pub use rtsp::{VideoStreamRtsp, mount_path};
pub use server::{
    GraphFactory, PreparedGraph, ServerRegistry, StreamRequest, StreamServer, StreamServerBackend,
};
pub use session::StreamSession;
