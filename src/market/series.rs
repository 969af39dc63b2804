//! Time-ordered, timestamp-deduplicated series with look-ahead guarded queries

use super::types::{Timestamped, Window};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ascending series of timestamped items, one item per timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<T>", into = "Vec<T>")]
#[serde(bound(
    serialize = "T: Serialize + Clone + Timestamped",
    deserialize = "T: Deserialize<'de> + Timestamped"
))]
pub struct Series<T: Timestamped> {
    items: Vec<T>,
}

impl<T: Timestamped> Default for Series<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Timestamped> From<Vec<T>> for Series<T> {
    fn from(items: Vec<T>) -> Self {
        Self::from_unsorted(items)
    }
}

impl<T: Timestamped + Clone> From<Series<T>> for Vec<T> {
    fn from(series: Series<T>) -> Self {
        series.items
    }
}

impl<T: Timestamped> Series<T> {
    /// Sort by time and keep the last item seen for each timestamp
    pub fn from_unsorted(mut items: Vec<T>) -> Self {
        items.sort_by_key(|item| item.time());
        let mut deduped: Vec<T> = Vec::with_capacity(items.len());
        for item in items {
            match deduped.last_mut() {
                Some(last) if last.time() == item.time() => *last = item,
                _ => deduped.push(item),
            }
        }
        Self { items: deduped }
    }

    /// Merge more items into the series
    pub fn extend(&mut self, more: Vec<T>) {
        let mut items = std::mem::take(&mut self.items);
        items.extend(more);
        *self = Self::from_unsorted(items);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    /// Items strictly before `as_of`
    pub fn before(&self, as_of: DateTime<Utc>) -> &[T] {
        let end = self.items.partition_point(|item| item.time() < as_of);
        &self.items[..end]
    }

    /// Latest item at or before `time`
    pub fn at_or_before(&self, time: DateTime<Utc>) -> Option<&T> {
        let end = self.items.partition_point(|item| item.time() <= time);
        end.checked_sub(1).map(|i| &self.items[i])
    }

    /// Slice selected by `window`, never including anything at or after `as_of`
    pub fn window(&self, window: Window, as_of: DateTime<Utc>) -> &[T] {
        select(self.before(as_of), window)
    }

    /// Slice selected by `window` among items stamped at or before `cutoff`
    pub fn window_through(&self, window: Window, cutoff: DateTime<Utc>) -> &[T] {
        let end = self.items.partition_point(|item| item.time() <= cutoff);
        select(&self.items[..end], window)
    }
}

/// Apply `window` to an already look-ahead clipped slice
fn select<T: Timestamped>(visible: &[T], window: Window) -> &[T] {
    match window {
        Window::Latest { offset, count } => {
            let end = visible.len().saturating_sub(offset);
            let start = end.saturating_sub(count);
            &visible[start..end]
        }
        Window::From { time, count } => {
            let end = visible.partition_point(|item| item.time() <= time);
            let start = end.saturating_sub(count);
            &visible[start..end]
        }
        Window::Range { from, to } => {
            let start = visible.partition_point(|item| item.time() < from);
            let end = visible.partition_point(|item| item.time() <= to);
            if start >= end {
                return &[];
            }
            &visible[start..end]
        }
    }
}
