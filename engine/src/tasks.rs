//! I/O tasks that run on the loop's `LocalSet` and report back through the
//! completion channel. They never touch loop state directly.

use std::io;
use std::net::SocketAddr;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::LoopError;
use crate::handle::Callback;
use crate::ids::{ServerId, SocketId};

/// Something the I/O side finished, delivered to the POLL phase.
pub(crate) enum Completion {
    /// A file read finished; run the callback in POLL.
    Ready(Callback),
    /// A spawned future settled; its reaction runs as a microtask.
    Settled(Callback),
    /// A request failed in a way nobody handles.
    Failed(LoopError),
    Connected(SocketId),
    SocketError(SocketId, io::Error),
    /// The peer closed its end of the connection.
    PeerClosed(SocketId),
    Listening(ServerId, SocketAddr),
    Accepted(ServerId, TcpStream),
    ServerError(ServerId, io::Error),
}

pub(crate) type CompletionSender = UnboundedSender<Completion>;

pub(crate) async fn connect(socket: SocketId, addr: SocketAddr, completions: CompletionSender) {
    match TcpStream::connect(addr).await {
        Ok(stream) => {
            if completions.send(Completion::Connected(socket)).is_ok() {
                watch(socket, stream, completions).await;
            }
        }
        Err(error) => {
            let _ = completions.send(Completion::SocketError(socket, error));
        }
    }
}

/// Hold an open stream until the peer closes it. Inbound data is discarded.
pub(crate) async fn watch(socket: SocketId, mut stream: TcpStream, completions: CompletionSender) {
    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => {
                let _ = completions.send(Completion::PeerClosed(socket));
                return;
            }
            Ok(_) => {}
            Err(error) => {
                let _ = completions.send(Completion::SocketError(socket, error));
                return;
            }
        }
    }
}

pub(crate) async fn listen(server: ServerId, addr: SocketAddr, completions: CompletionSender) {
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(error) => {
            let _ = completions.send(Completion::ServerError(server, error));
            return;
        }
    };
    let local_addr = match listener.local_addr() {
        Ok(local_addr) => local_addr,
        Err(error) => {
            let _ = completions.send(Completion::ServerError(server, error));
            return;
        }
    };
    if completions
        .send(Completion::Listening(server, local_addr))
        .is_err()
    {
        return;
    }

    loop {
        match listener.accept().await {
            Ok((stream, _peer)) => {
                if completions
                    .send(Completion::Accepted(server, stream))
                    .is_err()
                {
                    return;
                }
            }
            Err(error) => {
                let _ = completions.send(Completion::ServerError(server, error));
                return;
            }
        }
    }
}
