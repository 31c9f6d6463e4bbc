//! Capture positions
//!
//! A position is the source-specific token that locates a change record:
//! an opaque shard iterator or sequence number for polled streams, or a WAL
//! location for logical replication.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A PostgreSQL log sequence number, written `XXXXXXXX/XXXXXXXX` in hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Lsn(u64);

impl Lsn {
    pub const ZERO: Lsn = Lsn(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid LSN: {0}")]
pub struct ParseLsnError(String);

impl FromStr for Lsn {
    type Err = ParseLsnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hi, lo) = s
            .split_once('/')
            .ok_or_else(|| ParseLsnError(s.to_string()))?;
        let hi = u32::from_str_radix(hi, 16).map_err(|_| ParseLsnError(s.to_string()))?;
        let lo = u32::from_str_radix(lo, 16).map_err(|_| ParseLsnError(s.to_string()))?;
        Ok(Lsn(((hi as u64) << 32) | lo as u64))
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.0 >> 32, self.0 & 0xFFFF_FFFF)
    }
}

/// Location of a change within its capture source
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Position {
    /// Opaque token handed out by the stream service for the next fetch
    ShardIterator(String),
    /// Per-record sequence number assigned by the stream service
    SequenceNumber(String),
    /// Write-ahead log location
    Lsn(Lsn),
}

impl Position {
    /// Compare progress between two positions of the same kind.
    ///
    /// Returns `None` when the positions are not comparable: different kinds,
    /// or shard iterators, which are opaque.
    pub fn progress_cmp(&self, other: &Position) -> Option<Ordering> {
        match (self, other) {
            (Position::Lsn(a), Position::Lsn(b)) => Some(a.cmp(b)),
            (Position::SequenceNumber(a), Position::SequenceNumber(b)) => {
                compare_decimal(a, b)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::ShardIterator(token) => {
                // iterators are long; the tail is enough to tell them apart in logs
                let start = token.len().saturating_sub(12);
                write!(f, "iterator:…{}", token.get(start..).unwrap_or(token))
            }
            Position::SequenceNumber(seq) => write!(f, "seq:{}", seq),
            Position::Lsn(lsn) => write!(f, "lsn:{}", lsn),
        }
    }
}

/// Numeric comparison of arbitrarily long decimal strings.
fn compare_decimal(a: &str, b: &str) -> Option<Ordering> {
    if !a.bytes().all(|c| c.is_ascii_digit()) || !b.bytes().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    Some(a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
}
