//! Capture cursor
//!
//! Tracks how far a capture session has delivered. The cursor only moves
//! forward, and only after the records behind it reached the processor.

use chrono::{DateTime, Utc};

use super::position::Position;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CursorError {
    #[error("Cursor regression: current {current}, attempted {attempted}")]
    Regression { current: String, attempted: String },
}

#[derive(Debug, Clone, Default)]
pub struct Cursor {
    position: Option<Position>,
    last_advanced_at: Option<DateTime<Utc>>,
    advances: u64,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place the cursor at its starting position for a session.
    ///
    /// Anchoring is not counted as an advance.
    pub fn anchor(&mut self, position: Position) {
        self.position = Some(position);
        self.last_advanced_at = Some(Utc::now());
    }

    /// Move the cursor to `next`.
    ///
    /// Returns `Ok(false)` if `next` equals the current position. Positions
    /// that compare lower than the current one are rejected; opaque positions
    /// are accepted as forward moves.
    pub fn advance(&mut self, next: Position) -> Result<bool, CursorError> {
        if let Some(current) = &self.position {
            if *current == next {
                return Ok(false);
            }
            if current.progress_cmp(&next) == Some(std::cmp::Ordering::Greater) {
                return Err(CursorError::Regression {
                    current: current.to_string(),
                    attempted: next.to_string(),
                });
            }
        }
        self.position = Some(next);
        self.last_advanced_at = Some(Utc::now());
        self.advances += 1;
        Ok(true)
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn last_advanced_at(&self) -> Option<DateTime<Utc>> {
        self.last_advanced_at
    }

    /// Number of successful advances since the cursor was created.
    pub fn advances(&self) -> u64 {
        self.advances
    }
}
