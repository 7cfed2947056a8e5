use std::cmp::Ordering;
use std::fmt::{self, Display};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Logical coordinates identifying one slice within a named stream.
///
/// A range covers `[start, end)` when `end` is present, or an open-ended
/// extent starting at `start` otherwise. The generation distinguishes
/// successive slices minted for the same stream name after recovery resets:
/// a reset does not reuse the prior identity, it starts a new generation.
///
/// Equality is field-wise; ordering is by start offset, then generation,
/// with the end bound breaking any remaining tie (open-ended sorts before
/// bounded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SliceRange {
    /// First logical offset covered by the slice (inclusive).
    pub start: u64,
    /// Exclusive end offset, or `None` for an open-ended (growable) slice.
    #[serde(default)]
    pub end: Option<u64>,
    /// Generation counter separating successive slices of one stream.
    #[serde(default)]
    pub generation: u64,
}

impl SliceRange {
    /// Create a fully specified range.
    pub fn new(start: u64, end: Option<u64>, generation: u64) -> Self {
        Self {
            start,
            end,
            generation,
        }
    }

    /// Create an open-ended range at generation zero.
    pub fn open_ended(start: u64) -> Self {
        Self::new(start, None, 0)
    }

    /// Create an open-ended range with an explicit generation.
    pub fn open_ended_with_generation(start: u64, generation: u64) -> Self {
        Self::new(start, None, generation)
    }

    /// Whether the range has no fixed end bound.
    pub fn is_open_ended(&self) -> bool {
        self.end.is_none()
    }
}

impl Ord for SliceRange {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start
            .cmp(&other.start)
            .then(self.generation.cmp(&other.generation))
            .then(self.end.cmp(&other.end))
    }
}

impl PartialOrd for SliceRange {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for SliceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{}..{})@g{}", self.start, end, self.generation),
            None => write!(f, "[{}..)@g{}", self.start, self.generation),
        }
    }
}

/// Registry key for a slice: the stream name plus its range.
///
/// The stream name is shared as `Arc<str>` because one name is typically
/// held by the manager registry, the supplier, and every slice minted for
/// the stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamIdentity {
    stream_name: Arc<str>,
    range: SliceRange,
}

impl StreamIdentity {
    pub fn new(stream_name: impl Into<Arc<str>>, range: SliceRange) -> Self {
        Self {
            stream_name: stream_name.into(),
            range,
        }
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    pub fn range(&self) -> SliceRange {
        self.range
    }
}

impl Display for StreamIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.stream_name, self.range)
    }
}
