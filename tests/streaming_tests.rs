// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the RTSP stream activity over the loopback network layer

mod common;

use camera_manager::backends::camera::{CameraHandle, PatternCamera, PixelFormat};
use camera_manager::constants::rtsp;
use camera_manager::errors::MediaError;
use camera_manager::media::headless::{HeadlessEngine, HeadlessGraph};
use camera_manager::media::{MediaGraph, PropertyValue};
use camera_manager::pipelines::state::ActivityState;
use camera_manager::streaming::loopback::LoopbackBackend;
use camera_manager::streaming::query::{parse_query, requested_size};
use camera_manager::streaming::{ServerRegistry, VideoStreamRtsp};
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    backend: Arc<LoopbackBackend>,
    engine: Arc<HeadlessEngine>,
    registry: Arc<ServerRegistry>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_sweep_interval(Duration::from_secs(2))
    }

    fn with_sweep_interval(interval: Duration) -> Self {
        let backend = Arc::new(LoopbackBackend::new());
        let registry = Arc::new(ServerRegistry::with_sweep_interval(backend.clone(), interval));
        Self {
            backend,
            engine: Arc::new(HeadlessEngine::new()),
            registry,
        }
    }

    fn stream(&self, device: CameraHandle) -> VideoStreamRtsp {
        VideoStreamRtsp::new(device, self.engine.clone(), Arc::clone(&self.registry))
    }

    fn started(&self, device: CameraHandle) -> VideoStreamRtsp {
        let mut stream = self.stream(device);
        stream.init().unwrap();
        stream.start().unwrap();
        stream
    }

    fn refcount(&self) -> usize {
        self.registry.refcount(rtsp::DEFAULT_HOST, rtsp::DEFAULT_PORT)
    }
}

fn headless(graph: &dyn MediaGraph) -> &HeadlessGraph {
    graph
        .as_any()
        .downcast_ref::<HeadlessGraph>()
        .expect("headless graph")
}

#[test]
fn test_query_parsing_drops_pairs_without_value() {
    let params = parse_query(Some("width=640&height=480"));
    assert_eq!(params.get("width").map(String::as_str), Some("640"));
    assert_eq!(params.get("height").map(String::as_str), Some("480"));
    assert_eq!(requested_size(&params), Some((640, 480)));

    let params = parse_query(Some("bad&width=640"));
    assert_eq!(params.len(), 1);
    assert_eq!(params.get("width").map(String::as_str), Some("640"));
    assert_eq!(requested_size(&params), None);
}

#[test]
fn test_start_before_init_is_rejected() {
    let fixture = Fixture::new();
    let (_, device) = common::pattern("video0");
    let mut stream = fixture.stream(device);

    assert!(matches!(stream.start(), Err(MediaError::InvalidState { .. })));
    assert_eq!(stream.state(), ActivityState::Idle);
    assert_eq!(fixture.refcount(), 0);
}

#[test]
fn test_sessions_on_one_port_share_a_server() {
    let fixture = Fixture::new();
    let (_, first_device) = common::pattern("video0");
    let (_, second_device) = common::pattern("video1");

    let mut first = fixture.started(first_device);
    let mut second = fixture.started(second_device);

    assert_eq!(fixture.refcount(), 2);
    assert_eq!(fixture.backend.servers().len(), 1);
    let server = fixture.backend.server(rtsp::DEFAULT_PORT).unwrap();
    assert!(server.is_attached());
    assert!(server.has_mount("/video0"));
    assert!(server.has_mount("/video1"));

    first.stop().unwrap();
    assert_eq!(first.state(), ActivityState::Init);
    assert_eq!(fixture.refcount(), 1);
    assert!(!server.is_shut_down());
    assert!(!server.has_mount("/video0"));

    second.stop().unwrap();
    assert_eq!(fixture.refcount(), 0);
    assert!(server.is_shut_down());
    assert_eq!(fixture.registry.active_servers(), 0);
}

#[test]
fn test_graph_is_built_per_client() {
    let fixture = Fixture::new();
    let (_, device) = common::pattern("video0");
    let stream = fixture.started(device);
    assert_eq!(stream.stream_url(), "rtsp://127.0.0.1:8554/video0");

    // Mounted but no graph yet
    assert_eq!(fixture.engine.graphs_parsed(), 0);
    assert!(!stream.is_streaming());

    let server = fixture.backend.server(rtsp::DEFAULT_PORT).unwrap();
    let client = server.connect("/video0?width=640&height=480").unwrap();
    assert_eq!(fixture.engine.graphs_parsed(), 1);
    assert!(stream.is_streaming());

    let width = server
        .with_graph(client, |graph| headless(graph).property("video/x-raw0", "width"))
        .flatten();
    assert_eq!(width, Some(PropertyValue::Int(640)));
    let has_source = server.with_graph(client, |graph| headless(graph).has_frame_source("mysrc"));
    assert_eq!(has_source, Some(true));

    assert!(server.disconnect(client));
    assert!(!stream.is_streaming());
}

#[test]
fn test_unknown_mount_is_not_found() {
    let fixture = Fixture::new();
    let (_, device) = common::pattern("video0");
    let _stream = fixture.started(device);
    let server = fixture.backend.server(rtsp::DEFAULT_PORT).unwrap();

    assert!(matches!(server.connect("/video9"), Err(MediaError::NotFound(_))));
}

#[test]
fn test_read_failure_pushes_solid_frame() {
    let fixture = Fixture::new();
    let (camera, device) = common::pattern("video0");
    let stream = fixture.started(device);
    let server = fixture.backend.server(rtsp::DEFAULT_PORT).unwrap();
    let client = server.connect("/video0").unwrap();

    let frame = server
        .with_graph(client, |graph| headless(graph).pull_frame("mysrc"))
        .flatten()
        .unwrap();
    assert_eq!((frame.width, frame.height), (common::WIDTH, common::HEIGHT));

    camera.fail_next_reads(1);
    let solid = server
        .with_graph(client, |graph| headless(graph).pull_frame("mysrc"))
        .flatten()
        .unwrap();
    assert_eq!(solid.len(), PixelFormat::Yuv420.frame_size(common::WIDTH, common::HEIGHT));
    assert!(solid.data.iter().all(|&b| b == 0xFF));

    // Once the session is released the source goes quiet
    stream.session().unbind();
    let after = server
        .with_graph(client, |graph| headless(graph).pull_frame("mysrc"))
        .flatten();
    assert!(after.is_none());
}

#[test]
fn test_malformed_device_description_aborts_session() {
    let fixture = Fixture::new();
    let device: CameraHandle = Arc::new(
        PatternCamera::new("video0", common::WIDTH, common::HEIGHT, PixelFormat::Yuv420)
            .with_graph_description("appsrc name=mysrc ! ! fakesink"),
    );
    let stream = fixture.started(device);
    let server = fixture.backend.server(rtsp::DEFAULT_PORT).unwrap();

    assert!(matches!(server.connect("/video0"), Err(MediaError::ProtocolError(_))));
    assert_eq!(server.client_count(), 0);
    assert!(!stream.is_streaming());
    assert!(!stream.take_snapshot("/tmp/never.jpg"));
}

#[test]
fn test_device_description_is_used_verbatim() {
    let fixture = Fixture::new();
    let description = "appsrc name=mysrc ! videoconvert ! x264enc ! rtph264pay name=pay0";
    let device: CameraHandle = Arc::new(
        PatternCamera::new("video0", common::WIDTH, common::HEIGHT, PixelFormat::Yuv420)
            .with_graph_description(description),
    );
    let stream = fixture.started(device);
    let server = fixture.backend.server(rtsp::DEFAULT_PORT).unwrap();
    let client = server.connect("/video0?width=640&height=480").unwrap();

    let used = server.with_graph(client, |graph| graph.description().to_string());
    assert_eq!(used.as_deref(), Some(description));
    assert!(stream.is_streaming());

    // No still branch in this graph
    assert!(!stream.take_snapshot("/tmp/never.jpg"));
}

#[test]
fn test_runtime_controls_act_on_bound_graph() {
    let fixture = Fixture::new();
    let (_, device) = common::pattern("video0");
    let stream = fixture.started(device);

    // Before any client: zoom is stored, snapshot has nothing to act on
    stream.set_zoom(2).unwrap();
    assert_eq!(stream.zoom(), 2);
    assert!(!stream.take_snapshot("/tmp/shot.jpg"));
    assert!(!stream.start_recording("/tmp/rec.ts"));

    let server = fixture.backend.server(rtsp::DEFAULT_PORT).unwrap();
    let client = server.connect("/video0").unwrap();

    let margins = server.with_graph(client, |graph| {
        let g = headless(graph);
        ["left", "right", "top", "bottom"].map(|side| g.property("crop", side))
    });
    assert_eq!(
        margins,
        Some([
            Some(PropertyValue::Int(160)),
            Some(PropertyValue::Int(160)),
            Some(PropertyValue::Int(90)),
            Some(PropertyValue::Int(90)),
        ])
    );

    assert!(stream.take_snapshot("/tmp/shot.jpg"));
    let still = server.with_graph(client, |graph| {
        let g = headless(graph);
        (g.property("fsimage", "location"), g.property("vimage", "drop"))
    });
    assert_eq!(
        still,
        Some((
            Some(PropertyValue::Str("/tmp/shot.jpg".into())),
            Some(PropertyValue::Bool(true))
        ))
    );

    assert!(stream.start_recording("/tmp/rec.ts"));
    assert_eq!(stream.last_recording_url().as_deref(), Some("/tmp/rec.ts"));
    let gate = server.with_graph(client, |graph| headless(graph).property("vvideo", "drop"));
    assert_eq!(gate, Some(Some(PropertyValue::Bool(false))));

    assert!(stream.stop_recording());
    let gate = server.with_graph(client, |graph| headless(graph).property("vvideo", "drop"));
    assert_eq!(gate, Some(Some(PropertyValue::Bool(true))));
}

#[test]
fn test_sweeper_prunes_expired_sessions() {
    let fixture = Fixture::with_sweep_interval(Duration::from_millis(20));
    let (_, device) = common::pattern("video0");
    let stream = fixture.started(device);
    let server = fixture.backend.server(rtsp::DEFAULT_PORT).unwrap();

    let client = server.connect("/video0").unwrap();
    assert!(server.expire(client));

    let mut waited = Duration::ZERO;
    while server.client_count() > 0 && waited < Duration::from_secs(5) {
        std::thread::sleep(Duration::from_millis(20));
        waited += Duration::from_millis(20);
    }

    assert_eq!(server.client_count(), 0);
    assert!(server.sweep_count() > 0);
    assert!(!stream.is_streaming());
}

#[test]
fn test_stop_completes_when_server_already_released() {
    let fixture = Fixture::new();
    let (_, device) = common::pattern("video0");
    let mut stream = fixture.started(device);

    // Drop the only reference behind the activity's back
    fixture.registry.release(rtsp::DEFAULT_HOST, rtsp::DEFAULT_PORT).unwrap();
    assert_eq!(fixture.registry.active_servers(), 0);

    stream.stop().unwrap();
    assert_eq!(stream.state(), ActivityState::Init);
    assert!(matches!(stream.stop(), Err(MediaError::InvalidState { .. })));
    stream.uninit().unwrap();
}

#[test]
fn test_server_creation_failure_leaves_activity_initialized() {
    let fixture = Fixture::new();
    fixture.backend.set_fail_creation(true);
    let (_, device) = common::pattern("video0");
    let mut stream = fixture.stream(device);
    stream.init().unwrap();

    assert!(matches!(stream.start(), Err(MediaError::ResourceUnavailable(_))));
    assert_eq!(stream.state(), ActivityState::Init);
    assert_eq!(fixture.refcount(), 0);
}
