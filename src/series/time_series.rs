// Time-indexed sample buffer
//
// One channel of samples, kept sorted by timestamp and trimmed to a maximum
// time range measured back from the newest sample. Appends at the end are the
// fast path; out-of-order samples are repositioned with a binary search.

use serde::{Deserialize, Serialize};
use std::collections::vec_deque;
use std::collections::VecDeque;

/// One timestamped observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample<V> {
    pub timestamp: f64,
    pub value: V,
}

impl<V> Sample<V> {
    pub fn new(timestamp: f64, value: V) -> Self {
        Self { timestamp, value }
    }
}

/// Sorted, time-bounded buffer for a single channel
#[derive(Debug, Clone)]
pub struct TimeSeries<V> {
    name: String,
    group: Option<String>,
    samples: VecDeque<Sample<V>>,
    max_range_x: f64,
}

impl<V: Clone> TimeSeries<V> {
    /// Create an empty, unbounded series
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: None,
            samples: VecDeque::new(),
            max_range_x: f64::INFINITY,
        }
    }

    /// Create an empty series that belongs to a named group
    pub fn with_group(name: impl Into<String>, group: Option<String>) -> Self {
        Self {
            group,
            ..Self::new(name)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn max_range_x(&self) -> f64 {
        self.max_range_x
    }

    /// Change the retention window and evict everything now out of range.
    ///
    /// Negative ranges are clamped to zero (only samples sharing the newest
    /// timestamp survive); NaN leaves the window unchanged.
    pub fn set_maximum_range_x(&mut self, range: f64) {
        if range.is_nan() {
            return;
        }
        self.max_range_x = range.max(0.0);
        self.trim();
    }

    /// Insert a sample keeping timestamp order, then evict expired samples.
    ///
    /// Returns `false` when the sample was rejected because its timestamp is
    /// not finite.
    pub fn push(&mut self, sample: Sample<V>) -> bool {
        if !sample.timestamp.is_finite() {
            log::debug!(
                "Dropping sample with non-finite timestamp on channel {}",
                self.name
            );
            return false;
        }

        match self.samples.back() {
            Some(last) if sample.timestamp < last.timestamp => {
                // Equal timestamps keep arrival order
                let pos = self
                    .samples
                    .partition_point(|s| s.timestamp <= sample.timestamp);
                self.samples.insert(pos, sample);
            }
            _ => self.samples.push_back(sample),
        }

        self.trim();
        true
    }

    /// Convenience wrapper around [`push`](Self::push)
    pub fn push_point(&mut self, timestamp: f64, value: V) -> bool {
        self.push(Sample::new(timestamp, value))
    }

    fn trim(&mut self) {
        let Some(latest) = self.samples.back().map(|s| s.timestamp) else {
            return;
        };
        let cutoff = latest - self.max_range_x;
        while self
            .samples
            .front()
            .is_some_and(|front| front.timestamp < cutoff)
        {
            self.samples.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn get(&self, index: usize) -> Option<&Sample<V>> {
        self.samples.get(index)
    }

    pub fn front(&self) -> Option<&Sample<V>> {
        self.samples.front()
    }

    pub fn back(&self) -> Option<&Sample<V>> {
        self.samples.back()
    }

    /// Ordered iteration over every retained sample
    pub fn iter(&self) -> vec_deque::Iter<'_, Sample<V>> {
        self.samples.iter()
    }

    /// Ordered iteration starting at `index`
    pub fn iter_from(&self, index: usize) -> vec_deque::Iter<'_, Sample<V>> {
        let start = index.min(self.samples.len());
        self.samples.range(start..)
    }

    /// Samples with `t0 <= timestamp <= t1`
    pub fn range(&self, t0: f64, t1: f64) -> vec_deque::Iter<'_, Sample<V>> {
        let lo = self.samples.partition_point(|s| s.timestamp < t0);
        let hi = self.samples.partition_point(|s| s.timestamp <= t1);
        self.samples.range(lo..hi.max(lo))
    }

    /// Index of the first sample whose timestamp is at least `t`
    pub fn first_at_or_after(&self, t: f64) -> usize {
        self.samples.partition_point(|s| s.timestamp < t)
    }

    /// Index of the first sample whose timestamp is strictly greater than `t`
    pub fn partition_after(&self, t: f64) -> usize {
        self.samples.partition_point(|s| s.timestamp <= t)
    }

    /// Index of the sample nearest to `t`; ties go to the earlier sample
    pub fn index_of(&self, t: f64) -> Option<usize> {
        if self.samples.is_empty() || t.is_nan() {
            return None;
        }
        let pos = self.samples.partition_point(|s| s.timestamp < t);
        if pos == 0 {
            return Some(0);
        }
        if pos == self.samples.len() {
            return Some(pos - 1);
        }
        let before = t - self.samples[pos - 1].timestamp;
        let after = self.samples[pos].timestamp - t;
        Some(if before <= after { pos - 1 } else { pos })
    }

    /// Sample nearest to `t`
    pub fn nearest(&self, t: f64) -> Option<&Sample<V>> {
        self.index_of(t).and_then(|i| self.samples.get(i))
    }

    /// Index of the first sample whose timestamp equals `t` exactly
    pub fn index_at_exact(&self, t: f64) -> Option<usize> {
        let pos = self.samples.partition_point(|s| s.timestamp < t);
        match self.samples.get(pos) {
            Some(s) if s.timestamp == t => Some(pos),
            _ => None,
        }
    }

    /// Oldest and newest timestamps
    pub fn range_x(&self) -> Option<(f64, f64)> {
        match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp)),
            _ => None,
        }
    }

    /// Move every sample out of the buffer, leaving it empty
    pub(crate) fn drain_samples(&mut self) -> vec_deque::Drain<'_, Sample<V>> {
        self.samples.drain(..)
    }
}

impl TimeSeries<f64> {
    /// Minimum and maximum value over the finite samples
    pub fn range_y(&self) -> Option<(f64, f64)> {
        self.samples
            .iter()
            .map(|s| s.value)
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Value of the sample nearest to `t`
    pub fn value_at(&self, t: f64) -> Option<f64> {
        self.nearest(t).map(|s| s.value)
    }
}

impl<'a, V> IntoIterator for &'a TimeSeries<V> {
    type Item = &'a Sample<V>;
    type IntoIter = vec_deque::Iter<'a, Sample<V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
