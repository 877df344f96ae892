//! Sequence Identifiers
//!
//! Every event pushed by the server carries a two-part identifier
//! `"<timestamp>-<sequence>"`. Identifiers are totally ordered by timestamp
//! first, then sequence, and double as the resume point handed back to the
//! server on reconnect.
//!
//! The [`Watermark`] tracks the highest identifier delivered so far and never
//! moves backwards, even when the server redelivers older events after a
//! resume.

use std::fmt;
use std::str::FromStr;

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// =============================================================================
// Sequence Id
// =============================================================================

/// Ordered event identifier (`timestamp-sequence`).
///
/// Field order matters: the derived `Ord` compares `timestamp` before
/// `sequence`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceId {
    timestamp: u64,
    sequence: u64,
}

impl SequenceId {
    /// Create an identifier from its two components.
    #[must_use]
    pub const fn new(timestamp: u64, sequence: u64) -> Self {
        Self {
            timestamp,
            sequence,
        }
    }

    /// Timestamp component (server clock, milliseconds).
    #[must_use]
    pub const fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Sequence component within the timestamp.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.timestamp, self.sequence)
    }
}

/// Error parsing a sequence id from its wire form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid sequence id {input:?}: expected \"<timestamp>-<sequence>\"")]
pub struct SequenceIdError {
    input: String,
}

impl FromStr for SequenceId {
    type Err = SequenceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || SequenceIdError {
            input: s.to_string(),
        };

        let trimmed = s.trim();
        let (timestamp, sequence) = match trimmed.split_once('-') {
            Some((ts, seq)) => (ts, seq),
            None => (trimmed, "0"),
        };

        let timestamp = timestamp.parse::<u64>().map_err(|_| err())?;
        let sequence = sequence.parse::<u64>().map_err(|_| err())?;

        Ok(Self::new(timestamp, sequence))
    }
}

impl Serialize for SequenceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SequenceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Watermark
// =============================================================================

/// Highest sequence id delivered so far. Advance-only.
#[derive(Debug, Default)]
pub struct Watermark {
    current: RwLock<Option<SequenceId>>,
}

impl Watermark {
    /// Create a watermark, optionally seeded from a stored checkpoint.
    #[must_use]
    pub const fn new(initial: Option<SequenceId>) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> Option<SequenceId> {
        *self.current.read()
    }

    /// Move the watermark to `id` if it is not behind the current value.
    ///
    /// Returns `true` when the watermark now equals `id`.
    pub fn advance(&self, id: SequenceId) -> bool {
        let mut current = self.current.write();
        match *current {
            Some(existing) if existing > id => false,
            _ => {
                *current = Some(id);
                true
            }
        }
    }
}
