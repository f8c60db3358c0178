//! The scheduled script.
//!
//! Every line except the `MAIN` and `INFO` ones is printed from a callback, so
//! its tag names the phase the loop was in when the line was written.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use phaseloop_engine::{EventLoop, LoopError, LoopHandle};
use phaseloop_types::{Tag, error_code};
use url::Url;

use crate::fetch::fetch_text;
use crate::stamp::Stamper;

#[derive(Debug, Clone)]
pub struct FetchTarget {
    pub url: Url,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct DemoOptions {
    /// `Some` when `--fetch` was given.
    pub fetch: Option<FetchTarget>,
    /// Address expected to refuse connections.
    pub refused_addr: SocketAddr,
    /// Where the local server binds. The port is normally 0.
    pub listen_addr: SocketAddr,
    /// File read during POLL. The binary passes its own executable.
    pub source_path: PathBuf,
}

/// Build a loop, schedule the script on it, and run it to completion.
pub fn run(options: DemoOptions, stamper: &Rc<Stamper>) -> Result<(), LoopError> {
    let mut event_loop = EventLoop::new()?;
    schedule(&event_loop.handle(), options, stamper);
    event_loop.run()
}

/// The main body: stamp the `MAIN` lines and queue everything else.
pub fn schedule(handle: &LoopHandle, options: DemoOptions, stamper: &Rc<Stamper>) {
    stamper.stamp(Tag::Main, "start of script");

    let out = Rc::clone(stamper);
    handle.set_timeout(Duration::ZERO, move |_| {
        out.stamp(
            Tag::Timers,
            "setTimeout(0) from main (may run before/after main setImmediate)",
        );
    });

    let out = Rc::clone(stamper);
    handle.set_immediate(move |_| {
        out.stamp(
            Tag::Check,
            "setImmediate() from main (may run before/after main setTimeout)",
        );
    });

    read_source(handle, options.source_path, stamper);
    provoke_connect_error(handle, options.refused_addr, stamper);
    open_and_close_connection(handle, options.listen_addr, stamper);

    if let Some(target) = options.fetch {
        stamper.stamp(Tag::Info, "starting fetch (~1s)…");
        start_fetch(handle, target, stamper);
    }

    stamper.stamp(Tag::Info, "idle/prepare is internal (annotated only)");
    stamper.stamp(Tag::Main, "end of script");
}

fn read_source(handle: &LoopHandle, path: PathBuf, stamper: &Rc<Stamper>) {
    let out = Rc::clone(stamper);
    handle.read_file(path, move |handle, contents| {
        tracing::trace!(bytes = contents.len(), "source read");
        out.stamp(Tag::Poll, "fs.readFile callback (file I/O done)");

        let micro = Rc::clone(&out);
        handle.queue_microtask(move |_| {
            micro.stamp(Tag::Micro, "Promise.then after POLL callback");
        });

        let check = Rc::clone(&out);
        handle.set_immediate(move |_| {
            check.stamp(Tag::Check, "setImmediate scheduled inside POLL callback");
        });

        handle.set_timeout(Duration::ZERO, move |_| {
            out.stamp(Tag::Timers, "setTimeout(0) scheduled inside POLL callback");
        });
    });
}

fn provoke_connect_error(handle: &LoopHandle, addr: SocketAddr, stamper: &Rc<Stamper>) {
    let socket = handle.connect(addr);
    let out = Rc::clone(stamper);
    handle.on_error(socket, move |handle, err| {
        out.stamp(
            Tag::Pending,
            format!(
                "TCP connect error (likely in Pending Callbacks) ({})",
                error_code(&err)
            ),
        );
        handle.destroy(socket);
    });
}

fn open_and_close_connection(handle: &LoopHandle, addr: SocketAddr, stamper: &Rc<Stamper>) {
    let on_accept = Rc::clone(stamper);
    let server = handle.listen(addr, move |handle, socket| {
        let out = Rc::clone(&on_accept);
        handle.on_close(socket, move |_| {
            out.stamp(Tag::Close, "server socket \"close\" (abrupt destroy)");
        });
        handle.destroy(socket);
    });

    let out = Rc::clone(stamper);
    handle.on_listening(server, move |handle, bound| {
        out.stamp(Tag::Poll, format!("server listening on port {}", bound.port()));

        let client = handle.connect(connectable(bound));
        let connected = Rc::clone(&out);
        handle.on_connect(client, move |_| {
            connected.stamp(Tag::Poll, "client \"connect\" (I/O in POLL)");
        });
        handle.on_close(client, move |handle| {
            out.stamp(Tag::Close, "client socket \"close\"");
            handle.close_server(server, move |_| {
                out.stamp(Tag::Close, "server \"close\"");
            });
        });
    });
}

/// A wildcard bind address is not something a client can dial.
fn connectable(bound: SocketAddr) -> SocketAddr {
    match bound.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), bound.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), bound.port())
        }
        _ => bound,
    }
}

fn start_fetch(handle: &LoopHandle, target: FetchTarget, stamper: &Rc<Stamper>) {
    let out = Rc::clone(stamper);
    handle.spawn(
        fetch_text(target.url, target.timeout),
        move |handle, result| match result {
            Ok(_body) => {
                out.stamp(
                    Tag::Fetch,
                    ".then microtask (runs right after POLL resolves the promise)",
                );
                let check = Rc::clone(&out);
                handle.set_immediate(move |_| {
                    check.stamp(Tag::Fetch, "setImmediate inside .then (CHECK, same iteration)");
                });
                handle.set_timeout(Duration::ZERO, move |_| {
                    out.stamp(Tag::Fetch, "setTimeout(0) inside .then (TIMERS, next iteration)");
                });
            }
            Err(err) => out.stamp(Tag::Fetch, format!("error {err}")),
        },
    );
}
