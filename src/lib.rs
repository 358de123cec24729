//! Seriesflow
//!
//! Bounded time-series buffers fed by pluggable streaming sources, with
//! incremental numeric transforms (scale, derivative, moving average,
//! outlier removal, integral, quaternion to roll/pitch/yaw) computed on the
//! buffered data.

pub mod config;
pub mod series;
pub mod streaming;
pub mod transforms;

pub use config::{ConfigError, EngineSettings, PipelineConfig};
pub use series::{PlotData, PlotDataMap, SharedDataMap, TimeSeries};
pub use streaming::{DataStreamer, StreamController, StreamError};
pub use transforms::{TransformError, TransformFactory, TransformFunction, TransformPipeline};
