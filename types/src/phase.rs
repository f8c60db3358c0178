use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// One stage of a loop iteration.
///
/// Iterations always visit the phases in declaration order:
/// `Timers -> Pending -> Poll -> Check -> Close`, then wrap around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    Timers,
    Pending,
    Poll,
    Check,
    Close,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Timers,
        Phase::Pending,
        Phase::Poll,
        Phase::Check,
        Phase::Close,
    ];

    /// The phase that runs after this one. `Close` wraps to the next iteration's `Timers`.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Phase::Timers => Phase::Pending,
            Phase::Pending => Phase::Poll,
            Phase::Poll => Phase::Check,
            Phase::Check => Phase::Close,
            Phase::Close => Phase::Timers,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Phase::Timers => "timers",
            Phase::Pending => "pending",
            Phase::Poll => "poll",
            Phase::Check => "check",
            Phase::Close => "close",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag at the head of every trace line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Main,
    Info,
    Timers,
    Pending,
    Poll,
    Check,
    Close,
    Micro,
    Fetch,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown trace tag: {0}")]
pub struct UnknownTagError(pub String);

impl Tag {
    pub const ALL: [Tag; 9] = [
        Tag::Main,
        Tag::Info,
        Tag::Timers,
        Tag::Pending,
        Tag::Poll,
        Tag::Check,
        Tag::Close,
        Tag::Micro,
        Tag::Fetch,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Tag::Main => "MAIN",
            Tag::Info => "INFO",
            Tag::Timers => "TIMERS",
            Tag::Pending => "PENDING",
            Tag::Poll => "POLL",
            Tag::Check => "CHECK",
            Tag::Close => "CLOSE",
            Tag::Micro => "MICRO",
            Tag::Fetch => "FETCH",
        }
    }

    /// The loop phase a tag names, if it names one.
    #[must_use]
    pub const fn phase(self) -> Option<Phase> {
        match self {
            Tag::Timers => Some(Phase::Timers),
            Tag::Pending => Some(Phase::Pending),
            Tag::Poll => Some(Phase::Poll),
            Tag::Check => Some(Phase::Check),
            Tag::Close => Some(Phase::Close),
            Tag::Main | Tag::Info | Tag::Micro | Tag::Fetch => None,
        }
    }

    /// Whether lines with this tag are emitted by callbacks the loop runs,
    /// as opposed to the synchronous main body.
    #[must_use]
    pub const fn is_scheduled(self) -> bool {
        !matches!(self, Tag::Main | Tag::Info)
    }

    pub fn parse(raw: &str) -> Result<Self, UnknownTagError> {
        Tag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == raw)
            .ok_or_else(|| UnknownTagError(raw.to_string()))
    }
}

impl From<Phase> for Tag {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Timers => Tag::Timers,
            Phase::Pending => Tag::Pending,
            Phase::Poll => Tag::Poll,
            Phase::Check => Tag::Check,
            Phase::Close => Tag::Close,
        }
    }
}

impl FromStr for Tag {
    type Err = UnknownTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tag::parse(s)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
