// src/health/status.rs
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI8, Ordering};

/// Health status of a service or one of its sub-components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i8)]
pub enum Status {
    /// Not evaluated yet, or the verdict could not be determined.
    #[default]
    Unknown = 0,
    Healthy = 1,
    Unhealthy = -1,
}

/// HTTP status code used for raw ordinals that do not decode to a [`Status`].
pub const INVALID_STATUS_CODE: u16 = 500;

impl Status {
    pub const ALL: [Status; 3] = [Status::Unknown, Status::Healthy, Status::Unhealthy];

    /// Folds two statuses into one.
    ///
    /// Unhealthy absorbs everything and Unknown is neutral towards a determined
    /// value, except that a Healthy accumulator followed by an Unknown result
    /// turns Unhealthy.
    pub fn combine(self, other: Status) -> Status {
        match (self, other) {
            (Status::Unhealthy, _) | (_, Status::Unhealthy) => Status::Unhealthy,
            (Status::Healthy, Status::Unknown) => Status::Unhealthy,
            (Status::Healthy, Status::Healthy) | (Status::Unknown, Status::Healthy) => {
                Status::Healthy
            }
            (Status::Unknown, Status::Unknown) => Status::Unknown,
        }
    }

    pub fn from_repr(v: i8) -> Option<Status> {
        match v {
            0 => Some(Status::Unknown),
            1 => Some(Status::Healthy),
            -1 => Some(Status::Unhealthy),
            _ => None,
        }
    }

    pub fn repr(self) -> i8 {
        self as i8
    }

    /// HTTP status code which represents this status.
    pub fn status_code(self) -> u16 {
        match self {
            Status::Unknown => 425,
            Status::Healthy => 200,
            Status::Unhealthy => 503,
        }
    }

    /// Server-side inverse of [`Status::status_code`]. Any code other than
    /// 200 or 425 is treated as unhealthy.
    pub fn from_status_code(code: u16) -> Status {
        match code {
            425 => Status::Unknown,
            200 => Status::Healthy,
            _ => Status::Unhealthy,
        }
    }

    pub fn exit_code(self) -> i32 {
        match self {
            Status::Healthy => 0,
            Status::Unhealthy => 1,
            Status::Unknown => 100,
        }
    }

    /// Terminates the process with [`Status::exit_code`]. Destructors of the
    /// current stack are not run.
    pub fn exit(self) -> ! {
        std::process::exit(self.exit_code())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Healthy => "healthy",
            Status::Unhealthy => "unhealthy",
            Status::Unknown => "unknown",
        }
    }

    /// Parses a status token. Empty or unrecognized tokens yield Unknown.
    pub fn parse(token: &str) -> Status {
        let token = token.trim();
        if token.eq_ignore_ascii_case("healthy") {
            Status::Healthy
        } else if token.eq_ignore_ascii_case("unhealthy") {
            Status::Unhealthy
        } else {
            Status::Unknown
        }
    }

    pub fn is_healthy(self) -> bool {
        self == Status::Healthy
    }
}

/// Maps a raw ordinal to its HTTP status code, using
/// [`INVALID_STATUS_CODE`] when it is out of range.
pub fn status_code_for_repr(v: i8) -> u16 {
    Status::from_repr(v)
        .map(Status::status_code)
        .unwrap_or(INVALID_STATUS_CODE)
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Status::parse(s))
    }
}

/// An atomic [`Status`]. Defaults to [`Status::Unknown`].
#[derive(Debug, Default)]
pub struct AtomicStatus {
    inner: AtomicI8,
}

impl AtomicStatus {
    pub fn new(status: Status) -> Self {
        Self {
            inner: AtomicI8::new(status.repr()),
        }
    }

    pub fn load(&self) -> Status {
        decode(self.inner.load(Ordering::Acquire))
    }

    pub fn store(&self, status: Status) {
        self.inner.store(status.repr(), Ordering::Release);
    }

    /// Stores `status` and returns the previous value.
    pub fn swap(&self, status: Status) -> Status {
        decode(self.inner.swap(status.repr(), Ordering::AcqRel))
    }

    pub fn compare_exchange(&self, current: Status, new: Status) -> Result<Status, Status> {
        self.inner
            .compare_exchange(current.repr(), new.repr(), Ordering::AcqRel, Ordering::Acquire)
            .map(decode)
            .map_err(decode)
    }
}

fn decode(v: i8) -> Status {
    Status::from_repr(v).unwrap_or(Status::Unknown)
}

/// Running accumulator for one evaluation round.
///
/// The result only depends on which statuses were pushed, not on the order
/// they arrived in: it is `combine` folded over Healthy, then Unknown, then
/// Unhealthy results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    healthy: usize,
    unknown: usize,
    unhealthy: usize,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, status: Status) {
        match status {
            Status::Healthy => self.healthy += 1,
            Status::Unknown => self.unknown += 1,
            Status::Unhealthy => self.unhealthy += 1,
        }
    }

    /// True once no further result can change [`Tally::status`].
    pub fn is_settled(&self) -> bool {
        self.unhealthy > 0
    }

    pub fn len(&self) -> usize {
        self.healthy + self.unknown + self.unhealthy
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn status(&self) -> Status {
        let mut acc = Status::Unknown;
        for (status, count) in [
            (Status::Healthy, self.healthy),
            (Status::Unknown, self.unknown),
            (Status::Unhealthy, self.unhealthy),
        ] {
            if count > 0 {
                acc = acc.combine(status);
            }
        }
        acc
    }
}

impl FromIterator<Status> for Tally {
    fn from_iter<I: IntoIterator<Item = Status>>(iter: I) -> Self {
        let mut tally = Tally::new();
        for status in iter {
            tally.push(status);
        }
        tally
    }
}
