// SPDX-License-Identifier: GPL-3.0-only

//! Network layer seam and the shared server registry
//!
//! Every stream activity bound to the same host:port shares one server. The
//! [`ServerRegistry`] owns those servers behind a mutex and counts how many
//! mounts use each one:
//!
//! - `acquire` creates and attaches the server on first use (refcount 1) and
//!   starts its session sweeper; later calls only bump the count
//! - `release` drops the count and tears the server down at zero
//!
//! The binary creates one registry at startup and drops it at shutdown, which
//! tears down whatever is still registered.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::constants::timing;
use crate::errors::{MediaError, MediaResult};
use crate::media::MediaGraph;
use crate::pipelines::capture_loop::{CaptureLoopController, LoopAction};

/// Client request routed to a mount
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub path: String,
    /// Raw query string without the leading `?`
    pub query: Option<String>,
}

/// Invoked once when the client session that owns a graph goes away
pub type SessionTeardown = Box<dyn FnOnce() + Send>;

/// Graph built for one client, plus its teardown hook
pub struct PreparedGraph {
    pub graph: Box<dyn MediaGraph>,
    pub teardown: SessionTeardown,
}

/// Builds a graph for a path and query when a client connects
pub trait GraphFactory: Send + Sync {
    fn create_graph(&self, request: &StreamRequest) -> MediaResult<PreparedGraph>;
}

/// A bound network server that serves mounts
pub trait StreamServer: Send + Sync {
    fn host(&self) -> &str;

    fn port(&self) -> u16;

    /// Register `factory` at `path`, replacing any previous factory
    fn add_mount(&self, path: &str, factory: Arc<dyn GraphFactory>) -> MediaResult<()>;

    fn remove_mount(&self, path: &str) -> MediaResult<()>;

    /// Start accepting connections
    fn attach(&self) -> MediaResult<()>;

    /// Drop sessions whose clients timed out; returns how many were removed
    fn cleanup_expired_sessions(&self) -> usize;

    /// Stop accepting connections
    fn shutdown(&self);
}

/// Creates servers for the registry
pub trait StreamServerBackend: Send + Sync {
    fn create_server(&self, host: &str, port: u16) -> MediaResult<Arc<dyn StreamServer>>;
}

type ServerKey = (String, u16);

struct ServerEntry {
    server: Arc<dyn StreamServer>,
    refcount: usize,
    sweeper: CaptureLoopController,
}

/// Process-wide table of shared servers keyed by host:port
pub struct ServerRegistry {
    backend: Arc<dyn StreamServerBackend>,
    sweep_interval: Duration,
    entries: Mutex<HashMap<ServerKey, ServerEntry>>,
}

impl ServerRegistry {
    pub fn new(backend: Arc<dyn StreamServerBackend>) -> Self {
        Self::with_sweep_interval(backend, timing::SESSION_SWEEP_INTERVAL)
    }

    pub fn with_sweep_interval(backend: Arc<dyn StreamServerBackend>, sweep_interval: Duration) -> Self {
        Self {
            backend,
            sweep_interval,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ServerKey, ServerEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the server for host:port, creating it on first use
    pub fn acquire(&self, host: &str, port: u16) -> MediaResult<Arc<dyn StreamServer>> {
        let mut entries = self.lock();
        let key = (host.to_string(), port);

        if let Some(entry) = entries.get_mut(&key) {
            entry.refcount += 1;
            debug!(host, port, refcount = entry.refcount, "Reusing stream server");
            return Ok(Arc::clone(&entry.server));
        }

        let server = self.backend.create_server(host, port)?;
        server.attach()?;

        let sweep_target = Arc::clone(&server);
        let sweeper = CaptureLoopController::start_periodic(
            &format!("session-sweep-{}", port),
            self.sweep_interval,
            move || {
                let removed = sweep_target.cleanup_expired_sessions();
                if removed > 0 {
                    debug!(removed, "Expired stream sessions removed");
                }
                LoopAction::Continue
            },
        );

        info!(host, port, "Stream server created");
        entries.insert(
            key,
            ServerEntry {
                server: Arc::clone(&server),
                refcount: 1,
                sweeper,
            },
        );
        Ok(server)
    }

    /// Drop one reference; the server is destroyed with the last one
    pub fn release(&self, host: &str, port: u16) -> MediaResult<()> {
        let removed = {
            let mut entries = self.lock();
            let key = (host.to_string(), port);
            let entry = entries
                .get_mut(&key)
                .ok_or_else(|| MediaError::NotFound(format!("stream server {}:{}", host, port)))?;

            entry.refcount -= 1;
            debug!(host, port, refcount = entry.refcount, "Released stream server");
            if entry.refcount == 0 {
                entries.remove(&key)
            } else {
                None
            }
        };

        if let Some(entry) = removed {
            destroy(entry);
            info!(host, port, "Stream server destroyed");
        }
        Ok(())
    }

    /// Current reference count, zero when no server exists
    pub fn refcount(&self, host: &str, port: u16) -> usize {
        self.lock()
            .get(&(host.to_string(), port))
            .map(|e| e.refcount)
            .unwrap_or(0)
    }

    pub fn server(&self, host: &str, port: u16) -> Option<Arc<dyn StreamServer>> {
        self.lock()
            .get(&(host.to_string(), port))
            .map(|e| Arc::clone(&e.server))
    }

    pub fn active_servers(&self) -> usize {
        self.lock().len()
    }
}

fn destroy(mut entry: ServerEntry) {
    entry.sweeper.stop();
    entry.server.shutdown();
}

impl Drop for ServerRegistry {
    fn drop(&mut self) {
        let entries: Vec<_> = self.lock().drain().collect();
        for ((host, port), entry) in entries {
            warn!(host = %host, port, refcount = entry.refcount, "Destroying stream server still in use");
            destroy(entry);
        }
    }
}
