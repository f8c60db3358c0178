//! The trace line format shared by the logger and anything that reads traces back.
//!
//! A rendered line looks like `"  12ms  POLL  : client \"connect\""`: elapsed
//! milliseconds right-aligned to [`ELAPSED_WIDTH`], two spaces, the tag padded to
//! [`TAG_WIDTH`], a colon, and the free-text message.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::phase::{Tag, UnknownTagError};

/// Minimum width of the elapsed-milliseconds column.
pub const ELAPSED_WIDTH: usize = 4;

/// Minimum width of the tag column. `PENDING` is the only tag that overflows it.
pub const TAG_WIDTH: usize = 6;

/// One line of trace output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceLine {
    pub elapsed_ms: u64,
    pub tag: Tag,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceParseError {
    #[error("trace line does not start with elapsed milliseconds")]
    Elapsed,
    #[error("elapsed milliseconds are not followed by `ms` and whitespace")]
    Unit,
    #[error("trace line has no tag")]
    MissingTag,
    #[error(transparent)]
    UnknownTag(#[from] UnknownTagError),
    #[error("tag is not followed by `:`")]
    Separator,
}

impl TraceLine {
    pub fn new(elapsed_ms: u64, tag: Tag, message: impl Into<String>) -> Self {
        Self {
            elapsed_ms,
            tag,
            message: message.into(),
        }
    }

    /// The `"TAG   : message"` part of the line, without the elapsed column.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{:<TAG_WIDTH$}: {}", self.tag.as_str(), self.message)
    }

    /// Parse a rendered line back into its parts.
    ///
    /// Accepts anything matching `^\s*\d+ms\s+[A-Z]+\s*:.*$` whose tag is known.
    pub fn parse(line: &str) -> Result<Self, TraceParseError> {
        let caps = trace_line_regex()
            .captures(line)
            .ok_or(TraceParseError::Elapsed)?;

        let elapsed = caps.name("elapsed").ok_or(TraceParseError::Elapsed)?;
        if caps.name("unit").is_none() {
            return Err(TraceParseError::Unit);
        }
        let tag = caps.name("tag").ok_or(TraceParseError::MissingTag)?;
        let tag = Tag::parse(tag.as_str())?;
        let separator = caps.name("sep").ok_or(TraceParseError::Separator)?;

        let elapsed_ms = elapsed
            .as_str()
            .parse::<u64>()
            .map_err(|_| TraceParseError::Elapsed)?;
        let rest = &line[separator.end()..];
        let message = rest.strip_prefix(' ').unwrap_or(rest);

        Ok(Self::new(elapsed_ms, tag, message))
    }
}

static TRACE_LINE_REGEX: OnceLock<Regex> = OnceLock::new();

/// Each group only matches when the ones before it did, so the first missing
/// group names the part of the line that is malformed.
fn trace_line_regex() -> &'static Regex {
    TRACE_LINE_REGEX.get_or_init(|| {
        Regex::new(r"^\s*(?:(?P<elapsed>\d+)(?:(?P<unit>ms\s+)(?:(?P<tag>[A-Z]+)\s*(?P<sep>:)?)?)?)?")
            .expect("valid trace line regex")
    })
}

impl fmt::Display for TraceLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>ELAPSED_WIDTH$}ms  {:<TAG_WIDTH$}: {}",
            self.elapsed_ms,
            self.tag.as_str(),
            self.message
        )
    }
}
