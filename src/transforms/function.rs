//! Transform Function Contract
//!
//! A transform reads a fixed number of numeric input channels and appends to a
//! fixed number of output channels. Calls are incremental: every invocation
//! consumes the input samples that arrived since the previous one, and
//! `reset()` rewinds the transform so the whole buffered history is processed
//! again.

use super::types::{TransformError, TransformResult};
use crate::series::{PlotData, Sample};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Uniform interface for every transform kind
pub trait TransformFunction: Send {
    /// Registry name of this transform kind
    fn name(&self) -> &'static str;

    fn num_inputs(&self) -> usize;

    fn num_outputs(&self) -> usize;

    /// Apply parameters from a configuration description.
    ///
    /// `null` keeps the current configuration.
    fn configure(&mut self, params: &Value) -> TransformResult<()> {
        if params.is_null() || params.as_object().is_some_and(|m| m.is_empty()) {
            Ok(())
        } else {
            Err(TransformError::invalid_params(
                self.name(),
                "transform takes no parameters",
            ))
        }
    }

    /// Clear every piece of internal state, including the input cursor
    fn reset(&mut self);

    /// Consume pending input samples and append the results to `outputs`.
    ///
    /// `inputs.len()` and `outputs.len()` match `num_inputs()` and
    /// `num_outputs()`; the pipeline checks arity before calling.
    fn calculate(&mut self, inputs: &[&PlotData], outputs: &mut [PlotData]);
}

/// Deserialize transform parameters, rejecting unknown fields.
///
/// Returns `None` for `null` so callers keep their current configuration.
pub(crate) fn parse_params<P>(name: &str, params: &Value) -> TransformResult<Option<P>>
where
    P: DeserializeOwned,
{
    if params.is_null() {
        return Ok(None);
    }
    serde_json::from_value(params.clone())
        .map(Some)
        .map_err(|e| TransformError::invalid_params(name, e.to_string()))
}

/// Tracks how far into an input channel a transform has read.
///
/// Several samples may share a timestamp, so the cursor remembers how many of
/// those it has already consumed instead of skipping them all.
#[derive(Debug, Clone, Copy)]
pub struct InputCursor {
    last_timestamp: f64,
    consumed_at_last: usize,
}

impl Default for InputCursor {
    fn default() -> Self {
        Self {
            last_timestamp: f64::NEG_INFINITY,
            consumed_at_last: 0,
        }
    }
}

impl InputCursor {
    /// Index of the first sample not consumed yet.
    ///
    /// Samples inserted behind the cursor after it moved past them are not
    /// revisited; a reset is needed for that.
    pub fn start_index(&self, series: &PlotData) -> usize {
        let lo = series.first_at_or_after(self.last_timestamp);
        let hi = series.partition_after(self.last_timestamp);
        lo + self.consumed_at_last.min(hi - lo)
    }

    pub fn advance(&mut self, timestamp: f64) {
        if timestamp == self.last_timestamp {
            self.consumed_at_last += 1;
        } else {
            self.last_timestamp = timestamp;
            self.consumed_at_last = 1;
        }
    }

    pub fn last_timestamp(&self) -> f64 {
        self.last_timestamp
    }
}

/// Single-input, single-output transform evaluated one sample at a time
pub trait SampleTransform: Send {
    const NAME: &'static str;

    fn configure(&mut self, params: &Value) -> TransformResult<()>;

    /// Output for `sample`, or `None` when the sample yields nothing
    fn next_point(&mut self, sample: &Sample<f64>) -> Option<Sample<f64>>;

    fn reset(&mut self);
}

/// Drives a [`SampleTransform`] over a channel
#[derive(Debug, Default)]
pub struct Siso<T> {
    inner: T,
    cursor: InputCursor,
}

impl<T: SampleTransform> Siso<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            cursor: InputCursor::default(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: SampleTransform> TransformFunction for Siso<T> {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn configure(&mut self, params: &Value) -> TransformResult<()> {
        self.inner.configure(params)
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.cursor = InputCursor::default();
    }

    fn calculate(&mut self, inputs: &[&PlotData], outputs: &mut [PlotData]) {
        let (Some(input), Some(output)) = (inputs.first(), outputs.first_mut()) else {
            return;
        };

        let start = self.cursor.start_index(input);
        for sample in input.iter_from(start) {
            self.cursor.advance(sample.timestamp);
            match self.inner.next_point(sample) {
                Some(point) if point.value.is_finite() => {
                    output.push(point);
                }
                Some(_) => log::debug!("{}: dropping non-finite output", T::NAME),
                None => {}
            }
        }
    }
}
