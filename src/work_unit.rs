//! Work units and resumption markers

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resumption position within a partition.
///
/// Markers are totally ordered: offsets, sequence numbers and epoch
/// timestamps all map onto it. A marker names the position of the *next*
/// record to read, so a unit covering `0..100` ends with marker `100`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Marker(u64);

impl Marker {
    pub const fn new(position: u64) -> Self {
        Self(position)
    }

    pub const fn position(self) -> u64 {
        self.0
    }
}

impl From<u64> for Marker {
    fn from(position: u64) -> Self {
        Self(position)
    }
}

impl std::fmt::Display for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Marker {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}

/// One partition's slice of work for a single run: `[start, end)`.
///
/// Immutable once planned; the runner that claims it owns it until it
/// reports an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkUnit {
    partition: String,
    start: Marker,
    end: Marker,
    metadata: BTreeMap<String, String>,
}

impl WorkUnit {
    pub fn new(
        partition: impl Into<String>,
        start: Marker,
        end: Marker,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        Self {
            partition: partition.into(),
            start,
            end,
            metadata,
        }
    }

    /// Stable identifier, e.g. `orders:100..250`.
    pub fn id(&self) -> String {
        format!("{}:{}..{}", self.partition, self.start, self.end)
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// Marker to resume from (inclusive).
    pub fn start(&self) -> Marker {
        self.start
    }

    /// Source maximum observed at planning time (exclusive).
    pub fn end(&self) -> Marker {
        self.end
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn len(&self) -> u64 {
        self.end.position().saturating_sub(self.start.position())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}
