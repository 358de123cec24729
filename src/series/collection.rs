// Series collection shared between a producer and the consumer
//
// Channels are partitioned into numeric, text and structured namespaces. A
// channel name belongs to exactly one namespace; reusing it under another kind
// is reported as a configuration error instead of being merged.
//
// When a collection is shared across execution contexts it lives inside a
// `SharedDataMap`, whose only access path is the guard returned by `lock()`.
// One lock per collection, held for a whole logical batch.

use super::time_series::{Sample, TimeSeries};
use super::types::{DataError, DataResult, SampleValue, SeriesKind};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

pub type PlotData = TimeSeries<f64>;
pub type StringSeries = TimeSeries<String>;
pub type StructuredSeries = TimeSeries<serde_json::Value>;

/// Named channels of every value kind
#[derive(Debug, Clone)]
pub struct PlotDataMap {
    numeric: BTreeMap<String, PlotData>,
    strings: BTreeMap<String, StringSeries>,
    structured: BTreeMap<String, StructuredSeries>,
    max_range_x: f64,
}

impl Default for PlotDataMap {
    fn default() -> Self {
        Self::new()
    }
}

impl PlotDataMap {
    pub fn new() -> Self {
        Self {
            numeric: BTreeMap::new(),
            strings: BTreeMap::new(),
            structured: BTreeMap::new(),
            max_range_x: f64::INFINITY,
        }
    }

    /// Collection whose channels are created with the given retention window
    pub fn with_maximum_range_x(range: f64) -> Self {
        let mut map = Self::new();
        map.set_maximum_range_x(range);
        map
    }

    pub fn max_range_x(&self) -> f64 {
        self.max_range_x
    }

    /// Apply a retention window to every channel and to channels created later
    pub fn set_maximum_range_x(&mut self, range: f64) {
        if range.is_nan() {
            return;
        }
        self.max_range_x = range.max(0.0);
        for series in self.numeric.values_mut() {
            series.set_maximum_range_x(range);
        }
        for series in self.strings.values_mut() {
            series.set_maximum_range_x(range);
        }
        for series in self.structured.values_mut() {
            series.set_maximum_range_x(range);
        }
    }

    /// Kind of the channel registered under `name`, if any
    pub fn kind_of(&self, name: &str) -> Option<SeriesKind> {
        if self.numeric.contains_key(name) {
            Some(SeriesKind::Numeric)
        } else if self.strings.contains_key(name) {
            Some(SeriesKind::Text)
        } else if self.structured.contains_key(name) {
            Some(SeriesKind::Structured)
        } else {
            None
        }
    }

    fn ensure_kind(&self, name: &str, requested: SeriesKind) -> DataResult<()> {
        match self.kind_of(name) {
            Some(existing) if existing != requested => Err(DataError::KindConflict {
                name: name.to_string(),
                existing,
                requested,
            }),
            _ => Ok(()),
        }
    }

    pub fn get_or_create_numeric(
        &mut self,
        name: &str,
        group: Option<&str>,
    ) -> DataResult<&mut PlotData> {
        self.ensure_kind(name, SeriesKind::Numeric)?;
        let range = self.max_range_x;
        Ok(self
            .numeric
            .entry(name.to_string())
            .or_insert_with(|| new_series(name, group, range)))
    }

    pub fn get_or_create_strings(
        &mut self,
        name: &str,
        group: Option<&str>,
    ) -> DataResult<&mut StringSeries> {
        self.ensure_kind(name, SeriesKind::Text)?;
        let range = self.max_range_x;
        Ok(self
            .strings
            .entry(name.to_string())
            .or_insert_with(|| new_series(name, group, range)))
    }

    pub fn get_or_create_structured(
        &mut self,
        name: &str,
        group: Option<&str>,
    ) -> DataResult<&mut StructuredSeries> {
        self.ensure_kind(name, SeriesKind::Structured)?;
        let range = self.max_range_x;
        Ok(self
            .structured
            .entry(name.to_string())
            .or_insert_with(|| new_series(name, group, range)))
    }

    /// Append one sample, creating the channel on first use.
    ///
    /// Returns whether the buffer accepted the sample.
    pub fn add_sample(
        &mut self,
        name: &str,
        group: Option<&str>,
        timestamp: f64,
        value: SampleValue,
    ) -> DataResult<bool> {
        let accepted = match value {
            SampleValue::Numeric(v) => self
                .get_or_create_numeric(name, group)?
                .push(Sample::new(timestamp, v)),
            SampleValue::Text(v) => self
                .get_or_create_strings(name, group)?
                .push(Sample::new(timestamp, v)),
            SampleValue::Structured(v) => self
                .get_or_create_structured(name, group)?
                .push(Sample::new(timestamp, v)),
        };
        Ok(accepted)
    }

    pub fn numeric(&self, name: &str) -> Option<&PlotData> {
        self.numeric.get(name)
    }

    pub fn numeric_mut(&mut self, name: &str) -> Option<&mut PlotData> {
        self.numeric.get_mut(name)
    }

    pub fn strings(&self, name: &str) -> Option<&StringSeries> {
        self.strings.get(name)
    }

    pub fn structured(&self, name: &str) -> Option<&StructuredSeries> {
        self.structured.get(name)
    }

    pub fn numeric_series(&self) -> impl Iterator<Item = &PlotData> {
        self.numeric.values()
    }

    pub fn string_series(&self) -> impl Iterator<Item = &StringSeries> {
        self.strings.values()
    }

    pub fn structured_series(&self) -> impl Iterator<Item = &StructuredSeries> {
        self.structured.values()
    }

    /// Detach a numeric channel so it can be written while other channels are
    /// borrowed; hand it back with [`insert_numeric`](Self::insert_numeric).
    pub fn take_numeric(&mut self, name: &str) -> Option<PlotData> {
        self.numeric.remove(name)
    }

    pub fn insert_numeric(&mut self, series: PlotData) -> DataResult<()> {
        self.ensure_kind(series.name(), SeriesKind::Numeric)?;
        self.numeric.insert(series.name().to_string(), series);
        Ok(())
    }

    /// Remove one channel of any kind
    pub fn remove(&mut self, name: &str) -> DataResult<()> {
        let removed = self.numeric.remove(name).is_some()
            || self.strings.remove(name).is_some()
            || self.structured.remove(name).is_some();
        if removed {
            Ok(())
        } else {
            Err(DataError::ChannelNotFound(name.to_string()))
        }
    }

    /// Remove every channel that belongs to `group`, returning their names
    pub fn remove_group(&mut self, group: &str) -> Vec<String> {
        let mut removed = Vec::new();
        retain_outside_group(&mut self.numeric, group, &mut removed);
        retain_outside_group(&mut self.strings, group, &mut removed);
        retain_outside_group(&mut self.structured, group, &mut removed);
        removed.sort();
        removed
    }

    /// Names of all groups referenced by at least one channel
    pub fn groups(&self) -> BTreeSet<&str> {
        self.numeric
            .values()
            .filter_map(|s| s.group())
            .chain(self.strings.values().filter_map(|s| s.group()))
            .chain(self.structured.values().filter_map(|s| s.group()))
            .collect()
    }

    /// Sorted names of every channel
    pub fn channel_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .numeric
            .keys()
            .chain(self.strings.keys())
            .chain(self.structured.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names
    }

    /// Number of channels of all kinds
    pub fn len(&self) -> usize {
        self.numeric.len() + self.strings.len() + self.structured.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of retained samples across every channel
    pub fn sample_count(&self) -> usize {
        self.numeric.values().map(TimeSeries::len).sum::<usize>()
            + self.strings.values().map(TimeSeries::len).sum::<usize>()
            + self.structured.values().map(TimeSeries::len).sum::<usize>()
    }

    /// Drop every channel of every kind
    pub fn clear(&mut self) {
        self.numeric.clear();
        self.strings.clear();
        self.structured.clear();
    }

    /// Move all samples of `other` into this collection.
    ///
    /// Channels of `other` stay registered but end up empty, so a producer can
    /// keep writing into them. A channel whose name is already used here with
    /// another kind is skipped and reported after everything else was moved.
    pub fn absorb(&mut self, other: &mut PlotDataMap) -> DataResult<usize> {
        let mut moved = 0;
        let mut first_error = None;

        for (name, source) in other.numeric.iter_mut() {
            match self.get_or_create_numeric(name, source.group()) {
                Ok(target) => moved += move_samples(source, target),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        for (name, source) in other.strings.iter_mut() {
            match self.get_or_create_strings(name, source.group()) {
                Ok(target) => moved += move_samples(source, target),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        for (name, source) in other.structured.iter_mut() {
            match self.get_or_create_structured(name, source.group()) {
                Ok(target) => moved += move_samples(source, target),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(moved),
        }
    }
}

fn new_series<V: Clone>(name: &str, group: Option<&str>, range: f64) -> TimeSeries<V> {
    let mut series = TimeSeries::with_group(name, group.map(str::to_string));
    series.set_maximum_range_x(range);
    series
}

fn move_samples<V: Clone>(source: &mut TimeSeries<V>, target: &mut TimeSeries<V>) -> usize {
    let mut moved = 0;
    for sample in source.drain_samples() {
        if target.push(sample) {
            moved += 1;
        }
    }
    moved
}

fn retain_outside_group<V>(
    channels: &mut BTreeMap<String, TimeSeries<V>>,
    group: &str,
    removed: &mut Vec<String>,
) where
    V: Clone,
{
    channels.retain(|name, series| {
        let inside = series.group() == Some(group);
        if inside {
            removed.push(name.clone());
        }
        !inside
    });
}

/// A series collection co-located with the single lock that guards it.
///
/// Producers and the consumer hold clones of the same handle. There is no way
/// to reach the collection except through the guard, so every traversal or
/// mutation happens inside a critical section.
#[derive(Debug, Clone, Default)]
pub struct SharedDataMap {
    inner: Arc<Mutex<PlotDataMap>>,
}

impl SharedDataMap {
    pub fn new(map: PlotDataMap) -> Self {
        Self {
            inner: Arc::new(Mutex::new(map)),
        }
    }

    /// Acquire the collection lock; it is released when the guard drops
    pub fn lock(&self) -> MutexGuard<'_, PlotDataMap> {
        self.inner.lock()
    }

    /// Acquire the lock, giving up after `timeout`
    pub fn try_lock_for(&self, timeout: Duration) -> Option<MutexGuard<'_, PlotDataMap>> {
        self.inner.try_lock_for(timeout)
    }

    /// Consistent copy of the whole collection
    pub fn snapshot(&self) -> PlotDataMap {
        self.lock().clone()
    }

    /// Change the retention window of every channel in one critical section
    pub fn set_maximum_range_x(&self, range: f64) {
        self.lock().set_maximum_range_x(range);
    }

    /// Whether two handles refer to the same collection
    pub fn ptr_eq(&self, other: &SharedDataMap) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
