use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use phaseloop_types::{Phase, error_code};
use tokio::net::TcpStream;
use tokio::task::LocalSet;

use crate::error::LoopError;
use crate::ids::{ServerId, SocketId, TimerId};
use crate::state::{LoopState, ServerEntry, SocketEntry};
use crate::tasks::{self, Completion, CompletionSender};

pub(crate) type Callback = Box<dyn FnOnce(&LoopHandle)>;
pub(crate) type ErrorCallback = Box<dyn FnOnce(&LoopHandle, io::Error)>;
pub(crate) type ListeningCallback = Box<dyn FnOnce(&LoopHandle, SocketAddr)>;
pub(crate) type ConnectionCallback = Rc<dyn Fn(&LoopHandle, SocketId)>;

/// Scheduling interface to an [`EventLoop`](crate::EventLoop).
///
/// Cheap to clone. Every callback receives a `&LoopHandle` so it can schedule
/// further work; callbacks never run while another callback is running.
#[derive(Clone)]
pub struct LoopHandle {
    inner: Rc<Inner>,
}

struct Inner {
    state: RefCell<LoopState>,
    local: LocalSet,
    completions: CompletionSender,
}

impl fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("LoopHandle")
            .field("iteration", &state.iteration)
            .field("phase", &state.phase)
            .field("sockets", &state.sockets.len())
            .field("servers", &state.servers.len())
            .finish_non_exhaustive()
    }
}

impl LoopHandle {
    pub(crate) fn new(now: Instant, completions: CompletionSender) -> Self {
        Self {
            inner: Rc::new(Inner {
                state: RefCell::new(LoopState::new(now)),
                local: LocalSet::new(),
                completions,
            }),
        }
    }

    /// Run `f` with the loop state borrowed. `f` must not call back into the handle.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut LoopState) -> R) -> R {
        f(&mut self.inner.state.borrow_mut())
    }

    pub(crate) fn local(&self) -> &LocalSet {
        &self.inner.local
    }

    /// Cached loop time, refreshed at the start of each iteration.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.with_state(|state| state.now)
    }

    /// Number of the current iteration. Zero while the main body runs.
    #[must_use]
    pub fn iteration(&self) -> u64 {
        self.with_state(|state| state.iteration)
    }

    /// The phase currently running, or `None` during the main body.
    #[must_use]
    pub fn phase(&self) -> Option<Phase> {
        self.with_state(|state| state.phase)
    }

    // ========================================================================
    // Deferred callbacks
    // ========================================================================

    /// Run `callback` in a TIMERS phase once `delay` has passed since the cached loop time.
    ///
    /// A timer added while a TIMERS phase is running never fires in that same phase.
    pub fn set_timeout(
        &self,
        delay: Duration,
        callback: impl FnOnce(&LoopHandle) + 'static,
    ) -> TimerId {
        self.with_state(|state| {
            let deadline = state.now + delay;
            state.timers.insert(deadline, Box::new(callback))
        })
    }

    /// Cancel a timer. Returns `false` if it already fired or was cleared.
    pub fn clear_timeout(&self, timer: TimerId) -> bool {
        self.with_state(|state| state.timers.remove(timer).is_some())
    }

    /// Run `callback` in the next CHECK phase. Immediates added while CHECK
    /// runs wait for the following iteration.
    pub fn set_immediate(&self, callback: impl FnOnce(&LoopHandle) + 'static) {
        self.with_state(|state| state.immediates.push_back(Box::new(callback)));
    }

    /// Run `callback` as soon as the current callback returns.
    pub fn queue_microtask(&self, callback: impl FnOnce(&LoopHandle) + 'static) {
        self.push_microtask(Box::new(callback));
    }

    pub(crate) fn push_microtask(&self, callback: Callback) {
        self.with_state(|state| state.microtasks.push_back(callback));
    }

    pub(crate) fn pop_microtask(&self) -> Option<Callback> {
        self.with_state(|state| state.microtasks.pop_front())
    }

    /// Queue a callback for the next PENDING phase.
    pub(crate) fn defer(&self, callback: Callback) {
        self.with_state(|state| state.pending.push_back(callback));
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Read a whole file; `callback` runs in POLL once the contents are in.
    ///
    /// A failed read is fatal: [`EventLoop::run`](crate::EventLoop::run) returns
    /// [`LoopError::ReadFile`].
    pub fn read_file(
        &self,
        path: impl Into<PathBuf>,
        callback: impl FnOnce(&LoopHandle, Vec<u8>) + 'static,
    ) {
        let path = path.into();
        let completions = self.inner.completions.clone();
        self.begin_request();
        self.inner.local.spawn_local(async move {
            let completion = match tokio::fs::read(&path).await {
                Ok(contents) => {
                    Completion::Ready(Box::new(move |handle: &LoopHandle| {
                        callback(handle, contents);
                    }))
                }
                Err(source) => Completion::Failed(LoopError::ReadFile { path, source }),
            };
            let _ = completions.send(completion);
        });
    }

    /// Drive `future` on the I/O side. When it settles during POLL, `then`
    /// runs as a microtask, before POLL moves on to its next completion.
    pub fn spawn<F, T>(&self, future: F, then: impl FnOnce(&LoopHandle, T) + 'static)
    where
        F: Future<Output = T> + 'static,
        T: 'static,
    {
        let completions = self.inner.completions.clone();
        self.begin_request();
        self.inner.local.spawn_local(async move {
            let value = future.await;
            let reaction: Callback = Box::new(move |handle: &LoopHandle| then(handle, value));
            let _ = completions.send(Completion::Settled(reaction));
        });
    }

    fn begin_request(&self) {
        self.with_state(|state| state.in_flight += 1);
    }

    pub(crate) fn end_request(&self) {
        self.with_state(|state| state.in_flight = state.in_flight.saturating_sub(1));
    }

    // ========================================================================
    // Sockets
    // ========================================================================

    /// Open a TCP connection. Attach handlers with [`on_connect`](Self::on_connect),
    /// [`on_error`](Self::on_error) and [`on_close`](Self::on_close) before
    /// returning from the current callback.
    pub fn connect(&self, addr: SocketAddr) -> SocketId {
        let socket = self.with_state(LoopState::next_socket_id);
        let task = self.inner.local.spawn_local(tasks::connect(
            socket,
            addr,
            self.inner.completions.clone(),
        ));
        self.with_state(|state| {
            state.sockets.insert(socket, SocketEntry::new(None, task));
        });
        tracing::debug!(%socket, %addr, "connecting");
        socket
    }

    /// Runs in POLL once the connection is established.
    pub fn on_connect(&self, socket: SocketId, callback: impl FnOnce(&LoopHandle) + 'static) {
        self.with_socket(socket, |entry| entry.on_connect = Some(Box::new(callback)));
    }

    /// Runs in the PENDING phase after a connect or read error. The socket is
    /// destroyed after the handler returns if the handler did not do it.
    pub fn on_error(
        &self,
        socket: SocketId,
        callback: impl FnOnce(&LoopHandle, io::Error) + 'static,
    ) {
        self.with_socket(socket, |entry| entry.on_error = Some(Box::new(callback)));
    }

    /// Runs in CLOSE after the socket is destroyed.
    pub fn on_close(&self, socket: SocketId, callback: impl FnOnce(&LoopHandle) + 'static) {
        self.with_socket(socket, |entry| entry.on_close = Some(Box::new(callback)));
    }

    /// Tear the connection down and queue its close callback. Destroying a
    /// socket twice is a no-op.
    pub fn destroy(&self, socket: SocketId) {
        if self.with_state(|state| state.destroy_socket(socket)) {
            tracing::debug!(%socket, "destroyed");
        }
    }

    fn with_socket(&self, socket: SocketId, f: impl FnOnce(&mut SocketEntry)) {
        self.with_state(|state| match state.sockets.get_mut(&socket) {
            Some(entry) if !entry.destroyed => f(entry),
            _ => tracing::debug!(%socket, "handler ignored for closed socket"),
        });
    }

    pub(crate) fn take_connect_handler(&self, socket: SocketId) -> Option<Callback> {
        self.with_state(|state| {
            state
                .sockets
                .get_mut(&socket)
                .filter(|entry| !entry.destroyed)
                .and_then(|entry| entry.on_connect.take())
        })
    }

    pub(crate) fn emit_socket_error(&self, socket: SocketId, error: io::Error) {
        let live = self.with_state(|state| {
            state
                .sockets
                .get_mut(&socket)
                .filter(|entry| !entry.destroyed)
                .map(|entry| entry.on_error.take())
        });
        let Some(handler) = live else {
            return;
        };
        match handler {
            Some(handler) => handler(self, error),
            None => tracing::warn!(%socket, code = %error_code(&error), "unhandled socket error: {error}"),
        }
        self.destroy(socket);
    }

    // ========================================================================
    // Servers
    // ========================================================================

    /// Bind a TCP listener. `on_connection` runs in POLL for every accepted
    /// connection and owns the new socket.
    pub fn listen(
        &self,
        addr: SocketAddr,
        on_connection: impl Fn(&LoopHandle, SocketId) + 'static,
    ) -> ServerId {
        let server = self.with_state(LoopState::next_server_id);
        let task = self.inner.local.spawn_local(tasks::listen(
            server,
            addr,
            self.inner.completions.clone(),
        ));
        self.with_state(|state| {
            state
                .servers
                .insert(server, ServerEntry::new(task, Rc::new(on_connection)));
        });
        tracing::debug!(%server, %addr, "listening");
        server
    }

    /// Runs in POLL once the listener is bound, with the bound address.
    pub fn on_listening(
        &self,
        server: ServerId,
        callback: impl FnOnce(&LoopHandle, SocketAddr) + 'static,
    ) {
        self.with_state(|state| {
            if let Some(entry) = state.servers.get_mut(&server) {
                entry.on_listening = Some(Box::new(callback));
            }
        });
    }

    /// Runs in PENDING if binding or accepting fails. The server is closed afterwards.
    pub fn on_server_error(
        &self,
        server: ServerId,
        callback: impl FnOnce(&LoopHandle, io::Error) + 'static,
    ) {
        self.with_state(|state| {
            if let Some(entry) = state.servers.get_mut(&server) {
                entry.on_error = Some(Box::new(callback));
            }
        });
    }

    /// Address the server is bound to, once it is listening.
    #[must_use]
    pub fn local_addr(&self, server: ServerId) -> Option<SocketAddr> {
        self.with_state(|state| state.servers.get(&server).and_then(|entry| entry.local_addr))
    }

    /// Stop accepting connections. `callback` runs in CLOSE once every
    /// connection the server accepted has closed.
    pub fn close_server(&self, server: ServerId, callback: impl FnOnce(&LoopHandle) + 'static) {
        if !self.with_state(|state| state.begin_server_close(server, Some(Box::new(callback)))) {
            tracing::warn!(%server, "close requested for a server that is not running");
        }
    }

    pub(crate) fn take_listening_handler(
        &self,
        server: ServerId,
        local_addr: SocketAddr,
    ) -> Option<ListeningCallback> {
        self.with_state(|state| {
            let entry = state.servers.get_mut(&server)?;
            entry.local_addr = Some(local_addr);
            entry.on_listening.take()
        })
    }

    /// Register an accepted stream as a socket owned by `server`.
    pub(crate) fn adopt_connection(
        &self,
        server: ServerId,
        stream: TcpStream,
    ) -> Option<(SocketId, ConnectionCallback)> {
        let on_connection = self.with_state(|state| {
            state
                .servers
                .get(&server)
                .filter(|entry| !entry.closing)
                .map(|entry| Rc::clone(&entry.on_connection))
        })?;
        let socket = self.with_state(LoopState::next_socket_id);
        let task = self.inner.local.spawn_local(tasks::watch(
            socket,
            stream,
            self.inner.completions.clone(),
        ));
        self.with_state(|state| {
            state
                .sockets
                .insert(socket, SocketEntry::new(Some(server), task));
            if let Some(entry) = state.servers.get_mut(&server) {
                entry.connections.insert(socket);
            }
        });
        Some((socket, on_connection))
    }

    pub(crate) fn emit_server_error(&self, server: ServerId, error: io::Error) {
        let live = self.with_state(|state| {
            state
                .servers
                .get_mut(&server)
                .filter(|entry| !entry.closing)
                .map(|entry| entry.on_error.take())
        });
        let Some(handler) = live else {
            return;
        };
        match handler {
            Some(handler) => handler(self, error),
            None => tracing::warn!(%server, code = %error_code(&error), "unhandled server error: {error}"),
        }
        self.with_state(|state| {
            state.begin_server_close(server, None);
        });
    }
}
