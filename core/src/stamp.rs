use std::cell::RefCell;
use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::Instant;

use phaseloop_types::{Tag, TraceLine};

/// Start-of-run reference point for the elapsed column.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
}

impl Clock {
    #[must_use]
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Whole milliseconds since [`Clock::start`]. Never decreases.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Writes trace lines, one per call, to a sink.
///
/// Lines are flushed as they are written so the output interleaves correctly
/// with anything else the process prints.
pub struct Stamper {
    clock: Clock,
    out: RefCell<Box<dyn Write>>,
}

impl fmt::Debug for Stamper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stamper")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl Stamper {
    pub fn new(clock: Clock, out: impl Write + 'static) -> Self {
        Self {
            clock,
            out: RefCell::new(Box::new(out)),
        }
    }

    #[must_use]
    pub fn stdout(clock: Clock) -> Self {
        Self::new(clock, io::stdout())
    }

    pub fn stamp(&self, tag: Tag, message: impl Into<String>) {
        let line = TraceLine::new(self.clock.elapsed_ms(), tag, message);
        let mut out = self.out.borrow_mut();
        if let Err(err) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            tracing::debug!("failed to write trace line: {err}");
        }
    }
}

/// In-memory sink that can be read while a [`Stamper`] still owns a clone.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Rc<RefCell<Vec<u8>>>,
}

impl SharedBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.borrow()).into_owned()
    }

    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
