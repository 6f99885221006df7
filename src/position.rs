//! Optimistic-concurrency and `$all`-stream position types, per ยง3/ยง6.

/// Optimistic concurrency token supplied by a writer.
///
/// Wire encoding (ยง6): `NoStream = -1`, `Any = -2`, `StreamExists = -4`,
/// `Exact(n) = n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// The stream must not exist yet.
    NoStream,
    /// No optimistic check; write regardless of current version.
    Any,
    /// The stream must already exist, at any version.
    StreamExists,
    /// The stream's current version must equal exactly `n` (n >= 0).
    Exact(u64),
}

impl ExpectedVersion {
    pub fn to_wire(self) -> i64 {
        match self {
            ExpectedVersion::NoStream => -1,
            ExpectedVersion::Any => -2,
            ExpectedVersion::StreamExists => -4,
            ExpectedVersion::Exact(n) => n as i64,
        }
    }

    pub fn from_wire(v: i64) -> Option<Self> {
        match v {
            -1 => Some(ExpectedVersion::NoStream),
            -2 => Some(ExpectedVersion::Any),
            -4 => Some(ExpectedVersion::StreamExists),
            n if n >= 0 => Some(ExpectedVersion::Exact(n as u64)),
            _ => None,
        }
    }
}

/// A point in the `$all` stream: a (commit, prepare) pair of 64-bit signed
/// log positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub commit: i64,
    pub prepare: i64,
}

impl Position {
    /// The very beginning of `$all`.
    pub const START: Position = Position { commit: 0, prepare: 0 };
    /// The current end of `$all`; used to mean "everything written so far".
    pub const END: Position = Position { commit: -1, prepare: -1 };

    pub fn new(commit: i64, prepare: i64) -> Self {
        Self { commit, prepare }
    }
}

/// A read progress marker: either a per-stream event number or an
/// all-streams position, depending on which mode a read/subscription/catch-up
/// operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPosition {
    Stream(u64),
    All(Position),
}
