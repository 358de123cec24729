// Time-series data model
//
// - `time_series`: sorted, time-bounded buffer for one channel
// - `collection`: channel maps partitioned by value kind, plus the lock-guarded
//   `SharedDataMap` used across execution contexts
// - `types`: value kinds and wiring errors

pub mod collection;
pub mod time_series;
pub mod types;

pub use collection::{PlotData, PlotDataMap, SharedDataMap, StringSeries, StructuredSeries};
pub use time_series::{Sample, TimeSeries};
pub use types::{DataError, DataResult, SampleValue, SeriesKind};
