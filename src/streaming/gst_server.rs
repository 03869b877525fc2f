// SPDX-License-Identifier: GPL-3.0-only

//! gst-rtsp-server network layer
//!
//! Each mount gets a [`CameraMediaFactory`], an `RTSPMediaFactory` subclass
//! whose `create_element` forwards the request path and query to the
//! mounted [`GraphFactory`]. The graph's teardown hook runs when the media is
//! unprepared, i.e. when the last client of that media goes away.

use std::sync::{Arc, Mutex, PoisonError};

use gstreamer::glib;
use gstreamer_rtsp_server as gst_rtsp_server;
use gstreamer_rtsp_server::prelude::*;
use gstreamer_rtsp_server::subclass::prelude::*;
use tracing::{debug, error, info};

use super::server::{GraphFactory, StreamServer, StreamServerBackend};
use crate::errors::{MediaError, MediaResult};

/// Backend creating gst-rtsp-server instances
#[derive(Debug, Default)]
pub struct GstRtspBackend;

impl StreamServerBackend for GstRtspBackend {
    fn create_server(&self, host: &str, port: u16) -> MediaResult<Arc<dyn StreamServer>> {
        Ok(Arc::new(GstRtspServer::new(host, port)))
    }
}

/// One bound `RTSPServer`
pub struct GstRtspServer {
    host: String,
    port: u16,
    server: gst_rtsp_server::RTSPServer,
    source: Mutex<Option<glib::SourceId>>,
}

impl GstRtspServer {
    pub fn new(host: &str, port: u16) -> Self {
        let server = gst_rtsp_server::RTSPServer::new();
        server.set_address(host);
        server.set_service(&port.to_string());
        Self {
            host: host.to_string(),
            port,
            server,
            source: Mutex::new(None),
        }
    }

    fn mounts(&self) -> MediaResult<gst_rtsp_server::RTSPMountPoints> {
        self.server
            .mount_points()
            .ok_or_else(|| MediaError::ResourceUnavailable("server has no mount points".into()))
    }
}

impl StreamServer for GstRtspServer {
    fn host(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn add_mount(&self, path: &str, factory: Arc<dyn GraphFactory>) -> MediaResult<()> {
        let media_factory = CameraMediaFactory::new(factory);
        self.mounts()?.add_factory(path, media_factory);
        info!(path, port = self.port, "RTSP mount added");
        Ok(())
    }

    fn remove_mount(&self, path: &str) -> MediaResult<()> {
        self.mounts()?.remove_factory(path);
        debug!(path, port = self.port, "RTSP mount removed");
        Ok(())
    }

    fn attach(&self) -> MediaResult<()> {
        let id = self.server.attach(None).map_err(|e| {
            MediaError::ResourceUnavailable(format!(
                "cannot attach RTSP server on {}:{}: {}",
                self.host, self.port, e
            ))
        })?;
        *self.source.lock().unwrap_or_else(PoisonError::into_inner) = Some(id);
        info!(host = %self.host, port = self.port, "RTSP server attached");
        Ok(())
    }

    fn cleanup_expired_sessions(&self) -> usize {
        self.server
            .session_pool()
            .map(|pool| pool.cleanup() as usize)
            .unwrap_or(0)
    }

    fn shutdown(&self) {
        if let Some(id) = self
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            id.remove();
        }
        debug!(port = self.port, "RTSP server detached");
    }
}

mod imp {
    use std::sync::{Mutex, OnceLock, PoisonError};

    use gstreamer as gst;
    use gstreamer::glib;
    use gstreamer_rtsp as gst_rtsp;
    use gstreamer_rtsp_server as gst_rtsp_server;
    use gstreamer_rtsp_server::prelude::*;
    use gstreamer_rtsp_server::subclass::prelude::*;
    use tracing::{error, info};

    use crate::media::gst::GstGraph;
    use crate::streaming::query::split_request_uri;
    use crate::streaming::server::{GraphFactory, SessionTeardown, StreamRequest};

    #[derive(Default)]
    pub struct CameraMediaFactory {
        pub(super) builder: OnceLock<std::sync::Arc<dyn GraphFactory>>,
        /// Teardown of the element built last, claimed by `configure`
        pending: Mutex<Option<SessionTeardown>>,
    }

    #[glib::object_subclass]
    impl ObjectSubclass for CameraMediaFactory {
        const NAME: &'static str = "CameraManagerMediaFactory";
        type Type = super::CameraMediaFactory;
        type ParentType = gst_rtsp_server::RTSPMediaFactory;
    }

    impl ObjectImpl for CameraMediaFactory {}

    impl RTSPMediaFactoryImpl for CameraMediaFactory {
        fn create_element(&self, url: &gst_rtsp::RTSPUrl) -> Option<gst::Element> {
            let builder = self.builder.get()?;
            let (path, query) = split_request_uri(url.request_uri().as_str());
            info!(path = %path, "RTSP client requested stream");

            let prepared = match builder.create_graph(&StreamRequest { path, query }) {
                Ok(prepared) => prepared,
                Err(e) => {
                    error!(error = %e, "No graph for RTSP client");
                    return None;
                }
            };

            let Some(graph) = prepared.graph.as_any().downcast_ref::<GstGraph>() else {
                error!("Graph was not built by the GStreamer engine");
                (prepared.teardown)();
                return None;
            };
            let element = graph.element();
            *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(prepared.teardown);
            Some(element)
        }

        fn configure(&self, media: &gst_rtsp_server::RTSPMedia) {
            self.parent_configure(media);

            let teardown = self
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(teardown) = teardown {
                let teardown = Mutex::new(Some(teardown));
                media.connect_unprepared(move |_| {
                    if let Some(teardown) = teardown
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .take()
                    {
                        teardown();
                    }
                });
            }
        }
    }
}

glib::wrapper! {
    /// Media factory that delegates graph construction to a [`GraphFactory`]
    pub struct CameraMediaFactory(ObjectSubclass<imp::CameraMediaFactory>)
        @extends gst_rtsp_server::RTSPMediaFactory;
}

impl CameraMediaFactory {
    pub fn new(builder: Arc<dyn GraphFactory>) -> Self {
        let factory: Self = glib::Object::new();
        if factory.imp().builder.set(builder).is_err() {
            error!("Media factory builder already set");
        }
        factory
    }
}
