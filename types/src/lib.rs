//! Core domain types for phaseloop.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies:
//! the event-loop phases, the tags that head every trace line, the trace line
//! format itself, and Node-style symbolic codes for I/O errors.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod errno;
mod phase;
mod trace;

pub use errno::error_code;
pub use phase::{Phase, Tag, UnknownTagError};
pub use trace::{ELAPSED_WIDTH, TAG_WIDTH, TraceLine, TraceParseError};
