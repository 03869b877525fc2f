// SPDX-License-Identifier: GPL-3.0-only

//! In-process network layer
//!
//! Servers are never bound to a socket. "Clients" connect by calling
//! [`LoopbackServer::connect`], which routes the request to the mounted
//! factory exactly as a real RTSP server would on DESCRIBE, and keeps the
//! resulting graph alive until the client disconnects or expires.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use super::query::split_request_uri;
use super::server::{
    GraphFactory, SessionTeardown, StreamRequest, StreamServer, StreamServerBackend,
};
use crate::errors::{MediaError, MediaResult};
use crate::media::MediaGraph;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Identifies one connected client
pub type ClientId = u64;

/// Backend creating [`LoopbackServer`]s
#[derive(Default)]
pub struct LoopbackBackend {
    servers: Mutex<Vec<Arc<LoopbackServer>>>,
    fail_creation: AtomicBool,
}

impl LoopbackBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent server creation fail
    pub fn set_fail_creation(&self, fail: bool) {
        self.fail_creation.store(fail, Ordering::SeqCst);
    }

    /// Every server created so far, oldest first
    pub fn servers(&self) -> Vec<Arc<LoopbackServer>> {
        lock(&self.servers).clone()
    }

    /// Newest server created for `port`
    pub fn server(&self, port: u16) -> Option<Arc<LoopbackServer>> {
        lock(&self.servers)
            .iter()
            .rev()
            .find(|s| s.port == port)
            .cloned()
    }
}

impl StreamServerBackend for LoopbackBackend {
    fn create_server(&self, host: &str, port: u16) -> MediaResult<Arc<dyn StreamServer>> {
        if self.fail_creation.load(Ordering::SeqCst) {
            return Err(MediaError::ResourceUnavailable(format!(
                "cannot bind {}:{}",
                host, port
            )));
        }
        let server = Arc::new(LoopbackServer::new(host, port));
        lock(&self.servers).push(Arc::clone(&server));
        Ok(server)
    }
}

struct LoopbackClient {
    path: String,
    graph: Box<dyn MediaGraph>,
    teardown: Option<SessionTeardown>,
    expired: bool,
}

impl LoopbackClient {
    fn close(mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
        drop(self.graph);
    }
}

/// Server that serves mounts to in-process clients
pub struct LoopbackServer {
    host: String,
    port: u16,
    mounts: Mutex<HashMap<String, Arc<dyn GraphFactory>>>,
    clients: Mutex<HashMap<ClientId, LoopbackClient>>,
    next_client: AtomicU64,
    attached: AtomicBool,
    shut_down: AtomicBool,
    sweeps: AtomicUsize,
}

impl LoopbackServer {
    fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            mounts: Mutex::new(HashMap::new()),
            clients: Mutex::new(HashMap::new()),
            next_client: AtomicU64::new(1),
            attached: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            sweeps: AtomicUsize::new(0),
        }
    }

    /// Connect a client to `uri` (`/path?query` or a full `rtsp://` URL)
    pub fn connect(&self, uri: &str) -> MediaResult<ClientId> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(MediaError::ResourceUnavailable(format!(
                "server {}:{} is shut down",
                self.host, self.port
            )));
        }

        let (path, query) = split_request_uri(uri);
        let factory = lock(&self.mounts)
            .get(&path)
            .cloned()
            .ok_or_else(|| MediaError::NotFound(format!("mount {}", path)))?;

        let prepared = factory.create_graph(&StreamRequest {
            path: path.clone(),
            query,
        })?;

        let id = self.next_client.fetch_add(1, Ordering::SeqCst);
        info!(client = id, path = %path, "Loopback client connected");
        lock(&self.clients).insert(
            id,
            LoopbackClient {
                path,
                graph: prepared.graph,
                teardown: Some(prepared.teardown),
                expired: false,
            },
        );
        Ok(id)
    }

    /// Disconnect a client, running its teardown and destroying its graph
    pub fn disconnect(&self, client: ClientId) -> bool {
        let removed = lock(&self.clients).remove(&client);
        match removed {
            Some(c) => {
                debug!(client, path = %c.path, "Loopback client disconnected");
                c.close();
                true
            }
            None => false,
        }
    }

    /// Mark a client as timed out; the next sweep removes it
    pub fn expire(&self, client: ClientId) -> bool {
        match lock(&self.clients).get_mut(&client) {
            Some(c) => {
                c.expired = true;
                true
            }
            None => false,
        }
    }

    /// Run `f` against a connected client's graph
    pub fn with_graph<R>(&self, client: ClientId, f: impl FnOnce(&dyn MediaGraph) -> R) -> Option<R> {
        let clients = lock(&self.clients);
        clients.get(&client).map(|c| f(c.graph.as_ref()))
    }

    pub fn has_mount(&self, path: &str) -> bool {
        lock(&self.mounts).contains_key(path)
    }

    pub fn mount_count(&self) -> usize {
        lock(&self.mounts).len()
    }

    pub fn client_count(&self) -> usize {
        lock(&self.clients).len()
    }

    pub fn sweep_count(&self) -> usize {
        self.sweeps.load(Ordering::SeqCst)
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn close_clients(&self, expired_only: bool) -> usize {
        let closing: Vec<LoopbackClient> = {
            let mut clients = lock(&self.clients);
            let ids: Vec<ClientId> = clients
                .iter()
                .filter(|(_, c)| !expired_only || c.expired)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| clients.remove(id)).collect()
        };

        let count = closing.len();
        for client in closing {
            client.close();
        }
        count
    }
}

impl StreamServer for LoopbackServer {
    fn host(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn add_mount(&self, path: &str, factory: Arc<dyn GraphFactory>) -> MediaResult<()> {
        lock(&self.mounts).insert(path.to_string(), factory);
        debug!(path, port = self.port, "Mount added");
        Ok(())
    }

    fn remove_mount(&self, path: &str) -> MediaResult<()> {
        match lock(&self.mounts).remove(path) {
            Some(_) => {
                debug!(path, port = self.port, "Mount removed");
                Ok(())
            }
            None => Err(MediaError::NotFound(format!("mount {}", path))),
        }
    }

    fn attach(&self) -> MediaResult<()> {
        self.attached.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn cleanup_expired_sessions(&self) -> usize {
        self.sweeps.fetch_add(1, Ordering::SeqCst);
        self.close_clients(true)
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        self.attached.store(false, Ordering::SeqCst);
        let closed = self.close_clients(false);
        debug!(port = self.port, closed, "Loopback server shut down");
    }
}
