// SPDX-License-Identifier: GPL-3.0-only

//! Per-path stream session and its runtime controls
//!
//! A session outlives the graphs built for it. Each client connection binds
//! fresh control points; controls copy the handles out of the lock before
//! touching the graph so the lock is never held across a sleep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use tracing::{debug, info, warn};

use crate::constants::{elements, timing, zoom};
use crate::errors::MediaResult;
use crate::media::{ElementRef, ElementState, MediaGraph};
use crate::pipelines::video::VideoCodec;

/// Crop margins (horizontal, vertical) for a zoom level
pub fn zoom_margins(level: i32) -> (i32, i32) {
    (
        level.saturating_mul(zoom::WIDTH_PER_SIDE),
        level.saturating_mul(zoom::HEIGHT_PER_SIDE),
    )
}

/// Named, non-owning handles into a running streaming graph
#[derive(Clone, Default)]
pub struct ControlPoints {
    pub crop: Option<ElementRef>,
    pub still_gate: Option<ElementRef>,
    pub still_sink: Option<ElementRef>,
    pub record_gate: Option<ElementRef>,
    pub record_sink: Option<ElementRef>,
    pub root: Option<ElementRef>,
}

impl ControlPoints {
    /// Look up every control point; missing ones are logged and left unbound
    pub fn locate(graph: &dyn MediaGraph) -> Self {
        let find = |name: &str| {
            let handle = graph.element(name);
            if handle.is_none() {
                debug!(element = name, "Control point not present in graph");
            }
            handle
        };

        Self {
            crop: find(elements::CROP),
            still_gate: find(elements::STILL_GATE),
            still_sink: find(elements::STILL_SINK),
            record_gate: find(elements::RECORD_GATE),
            record_sink: find(elements::RECORD_SINK),
            root: Some(graph.root()),
        }
    }
}

impl std::fmt::Debug for ControlPoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPoints")
            .field("crop", &self.crop.is_some())
            .field("still_gate", &self.still_gate.is_some())
            .field("still_sink", &self.still_sink.is_some())
            .field("record_gate", &self.record_gate.is_some())
            .field("record_sink", &self.record_sink.is_some())
            .field("root", &self.root.is_some())
            .finish()
    }
}

#[derive(Debug)]
struct SessionState {
    width: u32,
    height: u32,
    zoom: i32,
    controls: ControlPoints,
    generation: u64,
    /// Frame-source flags of connected graphs, by binding generation
    bindings: Vec<(u64, Arc<AtomicBool>)>,
    last_recording_url: Option<String>,
}

/// Shared state of one mount path
#[derive(Debug, Clone)]
pub struct StreamSession {
    path: String,
    encoder: VideoCodec,
    inner: Arc<Mutex<SessionState>>,
}

impl StreamSession {
    pub fn new(path: &str, width: u32, height: u32, encoder: VideoCodec) -> Self {
        Self {
            path: path.to_string(),
            encoder,
            inner: Arc::new(Mutex::new(SessionState {
                width,
                height,
                zoom: 0,
                controls: ControlPoints::default(),
                generation: 0,
                bindings: Vec::new(),
                last_recording_url: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn encoder(&self) -> VideoCodec {
        self.encoder
    }

    /// Size of the most recently built graph, or the initial size
    pub fn resolution(&self) -> (u32, u32) {
        let state = self.lock();
        (state.width, state.height)
    }

    pub fn zoom(&self) -> i32 {
        self.lock().zoom
    }

    /// True while at least one client graph is bound
    pub fn is_running(&self) -> bool {
        !self.lock().bindings.is_empty()
    }

    pub fn last_recording_url(&self) -> Option<String> {
        self.lock().last_recording_url.clone()
    }

    pub fn controls(&self) -> ControlPoints {
        self.lock().controls.clone()
    }

    /// Bind control points of a freshly built graph
    ///
    /// Returns the generation of this binding and the flag that gates the
    /// graph's frame source. The stored zoom level is applied right away.
    pub fn bind(&self, controls: ControlPoints, size: (u32, u32)) -> (u64, Arc<AtomicBool>) {
        let (generation, live, crop, level) = {
            let mut state = self.lock();
            state.generation += 1;
            let live = Arc::new(AtomicBool::new(true));
            let generation = state.generation;
            state.bindings.push((generation, Arc::clone(&live)));
            state.controls = controls;
            if size.0 > 0 && size.1 > 0 {
                state.width = size.0;
                state.height = size.1;
            }
            (generation, live, state.controls.crop.clone(), state.zoom)
        };

        if let Some(crop) = crop
            && let Err(e) = apply_zoom(&crop, level)
        {
            warn!(path = %self.path, error = %e, "Failed to apply stored zoom");
        }

        info!(path = %self.path, generation, "Stream session bound");
        (generation, live)
    }

    /// Client teardown for one binding
    ///
    /// Silences that binding's frame source. Control points are released only
    /// when it is the most recent binding, so an older connection going away
    /// leaves a newer one controllable.
    pub fn end(&self, generation: u64) {
        let mut state = self.lock();
        state.bindings.retain(|(g, live)| {
            if *g == generation {
                live.store(false, Ordering::Release);
            }
            *g != generation
        });
        if state.generation == generation {
            state.controls = ControlPoints::default();
            info!(path = %self.path, generation, "Stream session ended");
        } else {
            debug!(path = %self.path, generation, current = state.generation, "Stale session teardown");
        }
    }

    /// Drop every binding and silence all frame sources
    pub fn unbind(&self) {
        let mut state = self.lock();
        for (_, live) in state.bindings.drain(..) {
            live.store(false, Ordering::Release);
        }
        state.controls = ControlPoints::default();
    }

    /// Store the zoom level and apply it when a crop point is bound
    pub fn set_zoom(&self, level: i32) -> MediaResult<()> {
        let crop = {
            let mut state = self.lock();
            state.zoom = level;
            state.controls.crop.clone()
        };

        match crop {
            Some(crop) => apply_zoom(&crop, level),
            None => {
                debug!(path = %self.path, level, "Zoom stored until a graph is bound");
                Ok(())
            }
        }
    }

    /// Capture exactly one frame to `url` through the still branch
    pub fn take_snapshot(&self, url: &str) -> bool {
        let (gate, sink) = {
            let state = self.lock();
            (state.controls.still_gate.clone(), state.controls.still_sink.clone())
        };
        let (Some(gate), Some(sink)) = (gate, sink) else {
            warn!(path = %self.path, "Snapshot requested without a bound still branch");
            return false;
        };

        if let Err(e) = sink.set_property("location", url.into()) {
            warn!(path = %self.path, error = %e, "Failed to set snapshot location");
            return false;
        }
        if let Err(e) = gate.set_property("drop", false.into()) {
            warn!(path = %self.path, error = %e, "Failed to open still gate");
            return false;
        }

        thread::sleep(timing::SNAPSHOT_PULSE);

        match gate.set_property("drop", true.into()) {
            Ok(()) => {
                info!(path = %self.path, url, "Snapshot taken");
                true
            }
            Err(e) => {
                warn!(path = %self.path, error = %e, "Failed to close still gate");
                false
            }
        }
    }

    /// Point the record branch at `url` and open its gate
    pub fn start_recording(&self, url: &str) -> bool {
        let (gate, sink) = {
            let state = self.lock();
            (state.controls.record_gate.clone(), state.controls.record_sink.clone())
        };
        let (Some(gate), Some(sink)) = (gate, sink) else {
            warn!(path = %self.path, "Recording requested without a bound record branch");
            return false;
        };

        let result = (|| -> MediaResult<()> {
            sink.set_state(ElementState::Null)?;
            thread::sleep(timing::RECORD_SINK_SETTLE);
            sink.set_property("location", url.into())?;
            thread::sleep(timing::RECORD_SINK_SETTLE);
            sink.set_state(ElementState::Playing)?;
            thread::sleep(timing::RECORD_SINK_SETTLE);
            gate.set_property("drop", false.into())
        })();

        match result {
            Ok(()) => {
                self.lock().last_recording_url = Some(url.to_string());
                info!(path = %self.path, url, "Stream recording started");
                true
            }
            Err(e) => {
                warn!(path = %self.path, error = %e, "Failed to start stream recording");
                false
            }
        }
    }

    /// Close the record gate; moving the file is left to the caller
    pub fn stop_recording(&self) -> bool {
        let (gate, sink) = {
            let state = self.lock();
            (state.controls.record_gate.clone(), state.controls.record_sink.clone())
        };
        let (Some(gate), Some(_sink)) = (gate, sink) else {
            warn!(path = %self.path, "Stop recording without a bound record branch");
            return false;
        };

        match gate.set_property("drop", true.into()) {
            Ok(()) => {
                info!(path = %self.path, "Stream recording stopped");
                true
            }
            Err(e) => {
                warn!(path = %self.path, error = %e, "Failed to close record gate");
                false
            }
        }
    }
}

fn apply_zoom(crop: &ElementRef, level: i32) -> MediaResult<()> {
    let (horizontal, vertical) = zoom_margins(level);
    for (side, margin) in [
        ("left", horizontal),
        ("right", horizontal),
        ("top", vertical),
        ("bottom", vertical),
    ] {
        crop.set_property(side, margin.into())?;
    }
    debug!(level, horizontal, vertical, "Zoom applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::headless::{HeadlessEngine, HeadlessGraph};
    use crate::media::{MediaEngine, PropertyValue};

    const GRAPH: &str = "videotestsrc ! videocrop name=crop ! tee name=t \
                         t. ! valve name=vimage drop=true ! multifilesink name=fsimage \
                         t. ! valve name=vvideo drop=true ! multifilesink name=fsvideo";

    fn bound_session() -> (StreamSession, Box<dyn MediaGraph>) {
        let graph = HeadlessEngine::new().parse_graph(GRAPH).unwrap();
        let session = StreamSession::new("/test", 640, 480, VideoCodec::Avc);
        session.bind(ControlPoints::locate(graph.as_ref()), (640, 480));
        (session, graph)
    }

    fn headless(graph: &dyn MediaGraph) -> &HeadlessGraph {
        graph.as_any().downcast_ref().unwrap()
    }

    #[test]
    fn zoom_sets_per_axis_margins() {
        let (session, graph) = bound_session();
        session.set_zoom(2).unwrap();

        let g = headless(graph.as_ref());
        assert_eq!(g.property("crop", "left"), Some(PropertyValue::Int(160)));
        assert_eq!(g.property("crop", "right"), Some(PropertyValue::Int(160)));
        assert_eq!(g.property("crop", "top"), Some(PropertyValue::Int(90)));
        assert_eq!(g.property("crop", "bottom"), Some(PropertyValue::Int(90)));
    }

    #[test]
    fn stored_zoom_is_applied_on_bind() {
        let session = StreamSession::new("/test", 640, 480, VideoCodec::Avc);
        session.set_zoom(1).unwrap();

        let graph = HeadlessEngine::new().parse_graph(GRAPH).unwrap();
        session.bind(ControlPoints::locate(graph.as_ref()), (0, 0));
        assert_eq!(
            headless(graph.as_ref()).property("crop", "top"),
            Some(PropertyValue::Int(45))
        );
        assert_eq!(session.resolution(), (640, 480));
    }

    #[test]
    fn snapshot_without_still_branch_has_no_effect() {
        let session = StreamSession::new("/test", 640, 480, VideoCodec::Avc);
        assert!(!session.take_snapshot("/tmp/a.jpg"));

        let graph = HeadlessEngine::new()
            .parse_graph("videotestsrc ! valve name=vimage drop=true ! fakesink")
            .unwrap();
        session.bind(ControlPoints::locate(graph.as_ref()), (0, 0));
        assert!(!session.take_snapshot("/tmp/a.jpg"));
        assert!(headless(graph.as_ref()).property_history("vimage").is_empty());
    }

    #[test]
    fn snapshot_pulses_the_still_gate() {
        let (session, graph) = bound_session();
        assert!(session.take_snapshot("/tmp/shot.jpg"));

        let g = headless(graph.as_ref());
        assert_eq!(
            g.property("fsimage", "location"),
            Some(PropertyValue::Str("/tmp/shot.jpg".into()))
        );
        assert_eq!(
            g.property_history("vimage"),
            vec![
                ("drop".to_string(), PropertyValue::Bool(false)),
                ("drop".to_string(), PropertyValue::Bool(true)),
            ]
        );
    }

    #[test]
    fn recording_opens_and_closes_record_gate() {
        let (session, graph) = bound_session();
        assert!(session.start_recording("/tmp/rec.ts"));
        assert_eq!(session.last_recording_url().as_deref(), Some("/tmp/rec.ts"));

        let g = headless(graph.as_ref());
        assert_eq!(g.element_state("fsvideo"), Some(ElementState::Playing));
        assert_eq!(g.property("vvideo", "drop"), Some(PropertyValue::Bool(false)));

        assert!(session.stop_recording());
        assert_eq!(g.property("vvideo", "drop"), Some(PropertyValue::Bool(true)));
    }

    #[test]
    fn stale_teardown_keeps_newer_binding() {
        let session = StreamSession::new("/test", 640, 480, VideoCodec::Avc);
        let engine = HeadlessEngine::new();
        let first = engine.parse_graph(GRAPH).unwrap();
        let (gen1, live1) = session.bind(ControlPoints::locate(first.as_ref()), (0, 0));
        let second = engine.parse_graph(GRAPH).unwrap();
        let (gen2, live2) = session.bind(ControlPoints::locate(second.as_ref()), (0, 0));
        assert!(live1.load(Ordering::Acquire));

        session.end(gen1);
        assert!(!live1.load(Ordering::Acquire));
        assert!(live2.load(Ordering::Acquire));
        assert!(session.is_running());
        assert!(session.controls().crop.is_some());

        session.end(gen2);
        assert!(!session.is_running());
        assert!(session.controls().crop.is_none());
    }

    #[test]
    fn unbind_silences_every_binding() {
        let (session, _graph) = bound_session();
        let graph = HeadlessEngine::new().parse_graph(GRAPH).unwrap();
        let (_, live) = session.bind(ControlPoints::locate(graph.as_ref()), (0, 0));

        session.unbind();
        assert!(!live.load(Ordering::Acquire));
        assert!(!session.is_running());
    }
}
