//! Simulation clock
//!
//! A fixed replay span walked in equal steps

mod sim_clock;

pub use sim_clock::SimClock;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Clock errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClockError {
    /// Step must be at least one millisecond
    #[error("Invalid span: step must be positive, got {0}ms")]
    NonPositiveStep(i64),
    /// Span ends before it starts
    #[error("Invalid span: end {end} is before start {start}")]
    EndBeforeStart {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Cursor does not sit on the span grid
    #[error("Cursor ({index}, {time}) is not on the span grid")]
    OffGrid { index: u64, time: DateTime<Utc> },
}

/// The simulated period and its granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SpanRepr", into = "SpanRepr")]
pub struct Span {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step_ms: i64,
}

#[derive(Serialize, Deserialize)]
struct SpanRepr {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step_ms: i64,
}

impl TryFrom<SpanRepr> for Span {
    type Error = ClockError;

    fn try_from(repr: SpanRepr) -> Result<Self, Self::Error> {
        Span::new(repr.start, repr.end, Duration::milliseconds(repr.step_ms))
    }
}

impl From<Span> for SpanRepr {
    fn from(span: Span) -> Self {
        Self {
            start: span.start,
            end: span.end,
            step_ms: span.step_ms,
        }
    }
}

impl Span {
    /// Create a validated span
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<Self, ClockError> {
        let step_ms = step.num_milliseconds();
        if step_ms <= 0 {
            return Err(ClockError::NonPositiveStep(step_ms));
        }
        if end < start {
            return Err(ClockError::EndBeforeStart { start, end });
        }
        Ok(Self {
            start,
            end,
            step_ms,
        })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn step(&self) -> Duration {
        Duration::milliseconds(self.step_ms)
    }

    /// Index of the last grid step that does not pass `end`
    pub fn last_index(&self) -> u64 {
        ((self.end - self.start).num_milliseconds() / self.step_ms) as u64
    }

    /// Number of grid steps in the span
    pub fn len(&self) -> u64 {
        self.last_index() + 1
    }

    /// Always false: a valid span holds at least its start step
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Timestamp of grid step `index`
    pub fn time_at(&self, index: u64) -> DateTime<Utc> {
        self.start + Duration::milliseconds(self.step_ms * index as i64)
    }

    /// Cursor for grid step `index`
    pub fn cursor_at(&self, index: u64) -> Cursor {
        Cursor {
            index,
            time: self.time_at(index),
        }
    }

    /// Index of the latest grid step at or before `time`, clamped to the span
    pub fn index_at_or_before(&self, time: DateTime<Utc>) -> u64 {
        if time <= self.start {
            return 0;
        }
        let offset = (time - self.start).num_milliseconds() / self.step_ms;
        (offset as u64).min(self.last_index())
    }

    /// Check that a cursor lies on this span's grid
    pub fn validate(&self, cursor: &Cursor) -> Result<(), ClockError> {
        if cursor.index > self.last_index() || self.time_at(cursor.index) != cursor.time {
            return Err(ClockError::OffGrid {
                index: cursor.index,
                time: cursor.time,
            });
        }
        Ok(())
    }
}

/// Position within the replay span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub index: u64,
    pub time: DateTime<Utc>,
}
