// SPDX-License-Identifier: GPL-3.0-only

//! RTSP live stream activity
//!
//! `start` only registers a mount on the shared server for host:port. The
//! streaming graph is built later, per client, by [`SessionGraphFactory`]
//! when the network layer routes a request to the mount; so "server ready"
//! and "graph exists" are separate conditions. Zoom, snapshot and local
//! recording act on whatever graph is currently bound.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::launch::{StreamSource, resolve_size, stream_description};
use super::query::{parse_query, requested_size};
use super::server::{GraphFactory, PreparedGraph, ServerRegistry, StreamRequest};
use super::session::{ControlPoints, StreamSession};
use crate::backends::camera::CameraHandle;
use crate::constants::{elements, rtsp};
use crate::errors::{MediaError, MediaResult};
use crate::media::{FrameSourceConfig, MediaEngine, device_frame_puller};
use crate::pipelines::state::{ActivityEvent, ActivityState, StateMachine};
use crate::pipelines::video::VideoCodec;

/// Mount path for a device
pub fn mount_path(device_id: &str) -> String {
    if device_id.contains(rtsp::SIMULATOR_MARKER) {
        rtsp::SIMULATOR_MOUNT.to_string()
    } else {
        format!("/{}", device_id)
    }
}

/// Builds the streaming graph for each client of one mount
pub struct SessionGraphFactory {
    device: CameraHandle,
    engine: Arc<dyn MediaEngine>,
    session: StreamSession,
    configured: (u32, u32),
    encoder: String,
}

impl SessionGraphFactory {
    fn description(&self, request: &StreamRequest) -> (String, Option<(u32, u32)>, bool) {
        if let Some(own) = self.device.own_graph_description() {
            return (own, None, true);
        }

        let params = parse_query(request.query.as_deref());
        let size = resolve_size(requested_size(&params), self.configured);
        let source = if self.device.is_native_capture_source() {
            StreamSource::Native {
                device_id: self.device.device_id(),
            }
        } else {
            StreamSource::Application
        };
        (stream_description(&source, size, &self.encoder), size, false)
    }
}

impl GraphFactory for SessionGraphFactory {
    fn create_graph(&self, request: &StreamRequest) -> MediaResult<PreparedGraph> {
        let (description, size, device_supplied) = self.description(request);
        info!(
            path = %request.path,
            query = request.query.as_deref().unwrap_or(""),
            device_supplied,
            "Building stream graph"
        );
        debug!(description = %description, "Stream graph description");

        let graph = self.engine.parse_graph(&description).map_err(|e| {
            error!(path = %request.path, error = %e, "Stream graph rejected");
            e
        })?;

        let controls = ControlPoints::locate(graph.as_ref());
        let (generation, live) = self.session.bind(controls, size.unwrap_or((0, 0)));

        if !self.device.is_native_capture_source() {
            let (width, height) = self.device.size();
            let config = FrameSourceConfig {
                format: self.device.pixel_format(),
                width,
                height,
                framerate: rtsp::APP_SOURCE_FPS,
            };
            let puller = device_frame_puller(Arc::clone(&self.device), Arc::clone(&live));
            match graph.configure_frame_source(elements::APP_SOURCE, &config, puller) {
                Ok(()) => {}
                Err(MediaError::NotFound(_)) if device_supplied => {
                    warn!(path = %request.path, "Device graph has no application source");
                }
                Err(e) => {
                    self.session.end(generation);
                    return Err(e);
                }
            }
        }

        let session = self.session.clone();
        Ok(PreparedGraph {
            graph,
            teardown: Box::new(move || session.end(generation)),
        })
    }
}

/// Live stream activity for one camera
pub struct VideoStreamRtsp {
    device: CameraHandle,
    engine: Arc<dyn MediaEngine>,
    registry: Arc<ServerRegistry>,
    machine: StateMachine,
    session: StreamSession,
    host: String,
    port: u16,
    width: u32,
    height: u32,
    encoder: String,
    /// host:port holding our mount while running
    bound: Option<(String, u16)>,
}

impl VideoStreamRtsp {
    pub fn new(device: CameraHandle, engine: Arc<dyn MediaEngine>, registry: Arc<ServerRegistry>) -> Self {
        let (width, height) = device.size();
        let path = mount_path(&device.device_id());
        Self {
            session: StreamSession::new(&path, width, height, VideoCodec::Avc),
            device,
            engine,
            registry,
            machine: StateMachine::new("video-stream"),
            host: rtsp::DEFAULT_HOST.to_string(),
            port: rtsp::DEFAULT_PORT,
            width,
            height,
            encoder: rtsp::DEFAULT_ENCODER.to_string(),
            bound: None,
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
        Ok(())
    }

    /// Mount this camera on the shared server for host:port
    pub fn start(&mut self) -> MediaResult<()> {
        self.machine.check(ActivityEvent::Start)?;

        let server = self.registry.acquire(&self.host, self.port)?;
        let factory = Arc::new(SessionGraphFactory {
            device: Arc::clone(&self.device),
            engine: Arc::clone(&self.engine),
            session: self.session.clone(),
            configured: (self.width, self.height),
            encoder: self.encoder.clone(),
        });
        if let Err(e) = server.add_mount(self.session.path(), factory) {
            if let Err(release) = self.registry.release(&self.host, self.port) {
                warn!(error = %release, "Failed to release stream server");
            }
            return Err(e);
        }

        self.bound = Some((self.host.clone(), self.port));
        self.machine.apply(ActivityEvent::Start)?;
        info!(url = %self.stream_url(), "Stream ready");
        Ok(())
    }

    /// Remove the mount and release the shared server
    pub fn stop(&mut self) -> MediaResult<()> {
        self.machine.check(ActivityEvent::Stop)?;

        self.session.unbind();
        if let Some((host, port)) = self.bound.take() {
            if let Some(server) = self.registry.server(&host, port)
                && let Err(e) = server.remove_mount(self.session.path())
            {
                warn!(path = %self.session.path(), error = %e, "Failed to remove mount");
            }
            // The mount is gone either way; a missing server must not strand Run
            if let Err(e) = self.registry.release(&host, port) {
                warn!(host = %host, port, error = %e, "Failed to release stream server");
            }
        }

        self.machine.apply(ActivityEvent::Stop)?;
        info!(path = %self.session.path(), "Stream stopped");
        Ok(())
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

    pub fn set_host(&mut self, host: &str) {
        self.warn_if_running("host");
        self.host = host.to_string();
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn set_port(&mut self, port: u16) {
        self.warn_if_running("port");
        self.port = port;
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// H.264 encoder element used by new client graphs
    pub fn set_encoder(&mut self, encoder: &str) {
        self.warn_if_running("encoder");
        self.encoder = encoder.to_string();
    }

    pub fn encoder(&self) -> &str {
        &self.encoder
    }

    /// Mount path
    pub fn address(&self) -> &str {
        self.session.path()
    }

    pub fn stream_url(&self) -> String {
        format!("rtsp://{}:{}{}", self.host, self.port, self.session.path())
    }

    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    /// True while a client graph is bound
    pub fn is_streaming(&self) -> bool {
        self.session.is_running()
    }

    // ===== Runtime controls =====

    pub fn set_zoom(&self, level: i32) -> MediaResult<()> {
        self.session.set_zoom(level)
    }

    pub fn zoom(&self) -> i32 {
        self.session.zoom()
    }

    pub fn take_snapshot(&self, url: &str) -> bool {
        self.session.take_snapshot(url)
    }

    pub fn start_recording(&self, url: &str) -> bool {
        self.session.start_recording(url)
    }

    pub fn stop_recording(&self) -> bool {
        self.session.stop_recording()
    }

    pub fn last_recording_url(&self) -> Option<String> {
        self.session.last_recording_url()
    }

    fn warn_if_running(&self, what: &str) {
        if self.machine.state() == ActivityState::Run {
            warn!(setting = what, "Stream is running. Change will not take effect until restart");
        }
    }
}

impl Drop for VideoStreamRtsp {
    fn drop(&mut self) {
        if matches!(self.state(), ActivityState::Run | ActivityState::Error)
            && let Err(e) = self.stop()
        {
            warn!(error = %e, "Failed to stop stream on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulator_devices_share_one_mount() {
        assert_eq!(mount_path("video0"), "/video0");
        assert_eq!(mount_path("gazebo-cam"), "/gazebo");
    }
}
