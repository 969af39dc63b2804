//! Iterator over the replay span

use super::{ClockError, Cursor, Span};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Walks a [`Span`] one step at a time
///
/// The clock starts positioned on `span.start`. `next()` moves to the
/// following grid step and yields `None` once the span is exhausted; it
/// never wraps around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimClock {
    span: Span,
    cursor: Cursor,
}

impl SimClock {
    /// Create a clock positioned on the start of the span
    pub fn new(span: Span) -> Self {
        Self {
            cursor: span.cursor_at(0),
            span,
        }
    }

    /// Restore a clock at a saved cursor
    pub fn at(span: Span, cursor: Cursor) -> Result<Self, ClockError> {
        span.validate(&cursor)?;
        Ok(Self { span, cursor })
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Current simulated time
    pub fn now(&self) -> DateTime<Utc> {
        self.cursor.time
    }

    /// True once `next()` can no longer advance
    pub fn is_exhausted(&self) -> bool {
        self.cursor.index >= self.span.last_index()
    }

    /// Jump to the latest grid step at or before `time`
    ///
    /// Works in both directions and never walks intermediate steps.
    pub fn goto(&mut self, time: DateTime<Utc>) -> Cursor {
        self.cursor = self.span.cursor_at(self.span.index_at_or_before(time));
        self.cursor
    }

    /// Advance `n` steps; `None` if the span ends first
    ///
    /// On `None` the clock is left on the last step of the span.
    pub fn fast_forward(&mut self, n: u64) -> Option<Cursor> {
        let target = self.cursor.index.checked_add(n)?;
        if target > self.span.last_index() {
            self.cursor = self.span.cursor_at(self.span.last_index());
            return None;
        }
        for _ in 0..n {
            self.next()?;
        }
        Some(self.cursor)
    }

    /// Return to `span.start`
    pub fn reset(&mut self) {
        self.cursor = self.span.cursor_at(0);
    }
}

impl Iterator for SimClock {
    type Item = Cursor;

    fn next(&mut self) -> Option<Cursor> {
        if self.is_exhausted() {
            return None;
        }
        self.cursor = self.span.cursor_at(self.cursor.index + 1);
        Some(self.cursor)
    }
}
