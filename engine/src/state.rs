use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::time::Instant;

use phaseloop_types::Phase;
use tokio::task::JoinHandle;

use crate::handle::{Callback, ConnectionCallback, ErrorCallback, ListeningCallback};
use crate::ids::{ServerId, SocketId};
use crate::timers::TimerQueue;

/// Work queued for the CLOSE phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Closing {
    Socket(SocketId),
    Server(ServerId),
}

pub(crate) struct SocketEntry {
    /// Listener that accepted this socket, if it is a server-side connection.
    pub(crate) server: Option<ServerId>,
    pub(crate) task: Option<JoinHandle<()>>,
    pub(crate) destroyed: bool,
    pub(crate) on_connect: Option<Callback>,
    pub(crate) on_error: Option<ErrorCallback>,
    pub(crate) on_close: Option<Callback>,
}

impl SocketEntry {
    pub(crate) fn new(server: Option<ServerId>, task: JoinHandle<()>) -> Self {
        Self {
            server,
            task: Some(task),
            destroyed: false,
            on_connect: None,
            on_error: None,
            on_close: None,
        }
    }
}

pub(crate) struct ServerEntry {
    pub(crate) task: Option<JoinHandle<()>>,
    pub(crate) local_addr: Option<SocketAddr>,
    pub(crate) on_connection: ConnectionCallback,
    pub(crate) on_listening: Option<ListeningCallback>,
    pub(crate) on_error: Option<ErrorCallback>,
    pub(crate) on_close: Option<Callback>,
    pub(crate) connections: HashSet<SocketId>,
    pub(crate) closing: bool,
    pub(crate) close_queued: bool,
}

impl ServerEntry {
    pub(crate) fn new(task: JoinHandle<()>, on_connection: ConnectionCallback) -> Self {
        Self {
            task: Some(task),
            local_addr: None,
            on_connection,
            on_listening: None,
            on_error: None,
            on_close: None,
            connections: HashSet::new(),
            closing: false,
            close_queued: false,
        }
    }
}

pub(crate) struct LoopState {
    /// Loop time, refreshed once at the start of every iteration.
    pub(crate) now: Instant,
    pub(crate) iteration: u64,
    pub(crate) phase: Option<Phase>,
    pub(crate) timers: TimerQueue<Callback>,
    pub(crate) immediates: VecDeque<Callback>,
    pub(crate) pending: VecDeque<Callback>,
    pub(crate) closing: VecDeque<Closing>,
    pub(crate) microtasks: VecDeque<Callback>,
    pub(crate) sockets: HashMap<SocketId, SocketEntry>,
    pub(crate) servers: HashMap<ServerId, ServerEntry>,
    /// File reads and spawned futures that have not delivered their completion.
    pub(crate) in_flight: usize,
    next_id: u64,
}

impl LoopState {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            now,
            iteration: 0,
            phase: None,
            timers: TimerQueue::default(),
            immediates: VecDeque::new(),
            pending: VecDeque::new(),
            closing: VecDeque::new(),
            microtasks: VecDeque::new(),
            sockets: HashMap::new(),
            servers: HashMap::new(),
            in_flight: 0,
            next_id: 1,
        }
    }

    pub(crate) fn next_socket_id(&mut self) -> SocketId {
        SocketId::new(self.bump_id())
    }

    pub(crate) fn next_server_id(&mut self) -> ServerId {
        ServerId::new(self.bump_id())
    }

    fn bump_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Work that must run without blocking in POLL.
    pub(crate) fn has_ready_work(&self) -> bool {
        !self.immediates.is_empty() || !self.pending.is_empty() || !self.closing.is_empty()
    }

    pub(crate) fn has_io(&self) -> bool {
        self.in_flight > 0 || !self.sockets.is_empty() || !self.servers.is_empty()
    }

    pub(crate) fn is_alive(&self) -> bool {
        !self.timers.is_empty() || self.has_ready_work() || self.has_io()
    }

    /// Mark a socket destroyed and queue its close. Returns `false` if the
    /// socket is unknown or was already destroyed.
    pub(crate) fn destroy_socket(&mut self, socket: SocketId) -> bool {
        let Some(entry) = self.sockets.get_mut(&socket) else {
            return false;
        };
        if entry.destroyed {
            return false;
        }
        entry.destroyed = true;
        entry.on_connect = None;
        entry.on_error = None;
        if let Some(task) = entry.task.take() {
            task.abort();
        }
        self.closing.push_back(Closing::Socket(socket));
        true
    }

    /// Forget a closed socket and hand back its close callback.
    pub(crate) fn finish_socket_close(&mut self, socket: SocketId) -> Option<Callback> {
        let entry = self.sockets.remove(&socket)?;
        if let Some(server) = entry.server {
            self.release_connection(server, socket);
        }
        entry.on_close
    }

    fn release_connection(&mut self, server: ServerId, socket: SocketId) {
        let Some(entry) = self.servers.get_mut(&server) else {
            return;
        };
        entry.connections.remove(&socket);
        if entry.closing && entry.connections.is_empty() && !entry.close_queued {
            entry.close_queued = true;
            self.closing.push_back(Closing::Server(server));
        }
    }

    /// Stop accepting and queue the server's close once its connections are gone.
    /// Returns `false` if the server is unknown or already closing.
    pub(crate) fn begin_server_close(
        &mut self,
        server: ServerId,
        on_close: Option<Callback>,
    ) -> bool {
        let Some(entry) = self.servers.get_mut(&server) else {
            return false;
        };
        if entry.closing {
            return false;
        }
        entry.closing = true;
        entry.on_close = on_close;
        entry.on_listening = None;
        if let Some(task) = entry.task.take() {
            task.abort();
        }
        if entry.connections.is_empty() {
            entry.close_queued = true;
            self.closing.push_back(Closing::Server(server));
        }
        true
    }

    pub(crate) fn finish_server_close(&mut self, server: ServerId) -> Option<Callback> {
        self.servers.remove(&server)?.on_close
    }
}
