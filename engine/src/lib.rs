//! Single-threaded phased event loop.
//!
//! The loop runs user callbacks one at a time, run-to-completion, and groups
//! them into phases that repeat in a fixed order every iteration:
//!
//! ```text
//!  ┌─> TIMERS   due timers (deadline <= cached loop time)
//!  │   PENDING  I/O error callbacks deferred from the previous POLL
//!  │   (idle/prepare: internal, no user callbacks)
//!  │   POLL     wait for I/O completions and run their callbacks
//!  │   CHECK    immediates queued before the phase started
//!  └── CLOSE    close callbacks of destroyed sockets and closed servers
//! ```
//!
//! The microtask queue is drained completely after the main body and after
//! every callback, whatever phase it ran in.
//!
//! Network and file I/O run as tasks on a current-thread tokio runtime and
//! `LocalSet`. That runtime is only driven during POLL, so I/O completions are
//! observed there and nowhere else, and no callback ever runs concurrently with
//! another.
//!
//! # Usage
//!
//! ```ignore
//! use std::time::Duration;
//! use phaseloop_engine::EventLoop;
//!
//! let mut event_loop = EventLoop::new()?;
//! let handle = event_loop.handle();
//! handle.set_timeout(Duration::ZERO, |_| println!("timer"));
//! handle.set_immediate(|_| println!("immediate"));
//! event_loop.run()?;
//! ```

mod error;
mod event_loop;
mod handle;
mod ids;
mod state;
mod tasks;
mod timers;

pub use error::LoopError;
pub use event_loop::EventLoop;
pub use handle::LoopHandle;
pub use ids::{ServerId, SocketId, TimerId};
pub use phaseloop_types::Phase;
