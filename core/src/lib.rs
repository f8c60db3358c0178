//! The event-loop phase demo.
//!
//! [`demo::schedule`] is the script: it queues timers, immediates, a file read,
//! a refused connection, a local client/server pair and optionally an HTTP
//! fetch on a [`phaseloop_engine::EventLoop`], and every callback writes one
//! [`phaseloop_types::TraceLine`] through a [`Stamper`]. Which phase a line
//! is printed from is visible in its tag.

pub mod demo;
mod fetch;
mod stamp;

pub use demo::{DemoOptions, FetchTarget};
pub use fetch::{FetchError, fetch_text};
pub use stamp::{Clock, SharedBuffer, Stamper};
