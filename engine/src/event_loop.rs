use std::mem;
use std::time::Instant;

use phaseloop_types::Phase;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::{task, time};

use crate::error::LoopError;
use crate::handle::{Callback, LoopHandle};
use crate::state::Closing;
use crate::tasks::Completion;

/// How long POLL may block waiting for I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollTimeout {
    /// Something is already queued for a later phase; only collect what is ready.
    NonBlocking,
    /// Block until the earliest timer is due.
    Until(Instant),
    /// Only I/O can wake the loop.
    Forever,
}

/// The loop itself. Build it, schedule work through [`handle`](Self::handle)
/// (this is the "main body"), then call [`run`](Self::run).
pub struct EventLoop {
    handle: LoopHandle,
    completions: UnboundedReceiver<Completion>,
    runtime: Runtime,
}

impl EventLoop {
    pub fn new() -> Result<Self, LoopError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(LoopError::Runtime)?;
        let (sender, completions) = mpsc::unbounded_channel();
        Ok(Self {
            handle: LoopHandle::new(Instant::now(), sender),
            completions,
            runtime,
        })
    }

    #[must_use]
    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Drain microtasks left by the main body, then iterate until nothing
    /// keeps the loop alive: no timers, immediates, pending or close work,
    /// in-flight requests, open sockets or servers.
    pub fn run(&mut self) -> Result<(), LoopError> {
        self.drain_microtasks();

        while self.handle.with_state(|state| state.is_alive()) {
            let iteration = self.handle.with_state(|state| {
                state.now = Instant::now();
                state.iteration += 1;
                state.iteration
            });
            tracing::trace!(iteration, "loop iteration");

            self.run_timers();
            self.run_pending();
            self.run_poll()?;
            self.run_check();
            self.run_close();
        }

        self.enter(None);
        tracing::debug!(
            iterations = self.handle.iteration(),
            "event loop drained"
        );
        Ok(())
    }

    fn enter(&self, phase: Option<Phase>) {
        self.handle.with_state(|state| state.phase = phase);
        if let Some(phase) = phase {
            tracing::trace!(%phase, "entering phase");
        }
    }

    /// Run one callback to completion, then every microtask it produced.
    fn invoke(&self, callback: Callback) {
        callback(&self.handle);
        self.drain_microtasks();
    }

    fn drain_microtasks(&self) {
        while let Some(task) = self.handle.pop_microtask() {
            task(&self.handle);
        }
    }

    fn run_timers(&self) {
        self.enter(Some(Phase::Timers));
        let (now, watermark) = self
            .handle
            .with_state(|state| (state.now, state.timers.watermark()));
        while let Some(callback) = self
            .handle
            .with_state(|state| state.timers.pop_due(now, watermark))
        {
            self.invoke(callback);
        }
    }

    fn run_pending(&self) {
        self.enter(Some(Phase::Pending));
        let batch = self
            .handle
            .with_state(|state| mem::take(&mut state.pending));
        for callback in batch {
            self.invoke(callback);
        }
    }

    fn run_poll(&mut self) -> Result<(), LoopError> {
        self.enter(Some(Phase::Poll));
        let timeout = self.poll_timeout();
        let mut ready: Vec<Completion> = self.wait(timeout).into_iter().collect();
        while let Ok(completion) = self.completions.try_recv() {
            ready.push(completion);
        }
        for completion in ready {
            self.dispatch(completion)?;
        }
        Ok(())
    }

    fn poll_timeout(&self) -> PollTimeout {
        self.handle.with_state(|state| {
            if state.has_ready_work() {
                PollTimeout::NonBlocking
            } else if let Some(deadline) = state.timers.next_deadline() {
                PollTimeout::Until(deadline)
            } else if state.has_io() {
                PollTimeout::Forever
            } else {
                PollTimeout::NonBlocking
            }
        })
    }

    /// Drive the I/O runtime until one completion arrives or `timeout` expires.
    fn wait(&mut self, timeout: PollTimeout) -> Option<Completion> {
        let completions = &mut self.completions;
        let local = self.handle.local();
        self.runtime.block_on(local.run_until(async move {
            match timeout {
                PollTimeout::NonBlocking => {
                    task::yield_now().await;
                    None
                }
                PollTimeout::Until(deadline) => {
                    time::timeout_at(time::Instant::from_std(deadline), completions.recv())
                        .await
                        .ok()
                        .flatten()
                }
                PollTimeout::Forever => completions.recv().await,
            }
        }))
    }

    fn dispatch(&self, completion: Completion) -> Result<(), LoopError> {
        match completion {
            Completion::Ready(callback) => {
                self.handle.end_request();
                self.invoke(callback);
            }
            Completion::Settled(reaction) => {
                self.handle.end_request();
                self.handle.push_microtask(reaction);
                self.drain_microtasks();
            }
            Completion::Failed(error) => {
                self.handle.end_request();
                return Err(error);
            }
            Completion::Connected(socket) => {
                tracing::trace!(%socket, "connected");
                if let Some(callback) = self.handle.take_connect_handler(socket) {
                    self.invoke(callback);
                }
            }
            Completion::SocketError(socket, error) => {
                tracing::trace!(%socket, "socket error deferred to pending: {error}");
                self.handle.defer(Box::new(move |handle: &LoopHandle| {
                    handle.emit_socket_error(socket, error);
                }));
            }
            Completion::PeerClosed(socket) => {
                tracing::trace!(%socket, "peer closed");
                self.handle.destroy(socket);
            }
            Completion::Listening(server, local_addr) => {
                if let Some(callback) = self.handle.take_listening_handler(server, local_addr) {
                    self.invoke(Box::new(move |handle: &LoopHandle| {
                        callback(handle, local_addr);
                    }));
                }
            }
            Completion::Accepted(server, stream) => {
                if let Some((socket, on_connection)) = self.handle.adopt_connection(server, stream)
                {
                    tracing::trace!(%server, %socket, "accepted");
                    self.invoke(Box::new(move |handle: &LoopHandle| {
                        on_connection(handle, socket);
                    }));
                }
            }
            Completion::ServerError(server, error) => {
                self.handle.defer(Box::new(move |handle: &LoopHandle| {
                    handle.emit_server_error(server, error);
                }));
            }
        }
        Ok(())
    }

    fn run_check(&self) {
        self.enter(Some(Phase::Check));
        let batch = self
            .handle
            .with_state(|state| mem::take(&mut state.immediates));
        for callback in batch {
            self.invoke(callback);
        }
    }

    /// Unlike CHECK, closes queued while this phase runs are handled in the same pass.
    fn run_close(&self) {
        self.enter(Some(Phase::Close));
        while let Some(closing) = self.handle.with_state(|state| state.closing.pop_front()) {
            let callback = self.handle.with_state(|state| match closing {
                Closing::Socket(socket) => state.finish_socket_close(socket),
                Closing::Server(server) => state.finish_server_close(server),
            });
            if let Some(callback) = callback {
                self.invoke(callback);
            }
        }
    }
}
