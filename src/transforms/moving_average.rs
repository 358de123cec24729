//! Trailing moving average over a time window

use super::function::{parse_params, SampleTransform, Siso};
use super::types::{TransformError, TransformResult};
use crate::series::Sample;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MovingAverageConfig {
    /// Window length in seconds
    pub window: f64,
    /// Emit at the window center instead of its trailing edge
    pub center: bool,
}

impl Default for MovingAverageConfig {
    fn default() -> Self {
        Self {
            window: 1.0,
            center: false,
        }
    }
}

/// Mean of every sample with timestamp in `[t - window, t]`
#[derive(Debug, Default)]
pub struct MovingAverage {
    config: MovingAverageConfig,
    window: VecDeque<Sample<f64>>,
    sum: f64,
}

impl MovingAverage {
    pub fn new(config: MovingAverageConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &MovingAverageConfig {
        &self.config
    }

    /// Drop samples older than `start`.
    ///
    /// The sum is rebuilt from the remaining samples instead of subtracting
    /// the evicted ones, so cancellation error cannot accumulate.
    fn evict_before(&mut self, start: f64) {
        let before = self.window.len();
        while self.window.front().is_some_and(|front| front.timestamp < start) {
            self.window.pop_front();
        }
        if self.window.len() != before {
            self.sum = self.window.iter().map(|s| s.value).sum();
        }
    }
}

impl SampleTransform for MovingAverage {
    const NAME: &'static str = "moving_average";

    fn configure(&mut self, params: &Value) -> TransformResult<()> {
        if let Some(config) = parse_params::<MovingAverageConfig>(Self::NAME, params)? {
            if !(config.window.is_finite() && config.window > 0.0) {
                return Err(TransformError::invalid_params(
                    Self::NAME,
                    format!("window must be positive, got {}", config.window),
                ));
            }
            self.config = config;
        }
        Ok(())
    }

    fn next_point(&mut self, sample: &Sample<f64>) -> Option<Sample<f64>> {
        if !sample.value.is_finite() {
            return None;
        }
        self.window.push_back(sample.clone());
        self.sum += sample.value;
        self.evict_before(sample.timestamp - self.config.window);

        let mean = self.sum / self.window.len() as f64;
        let timestamp = if self.config.center {
            sample.timestamp - self.config.window / 2.0
        } else {
            sample.timestamp
        };
        Some(Sample::new(timestamp, mean))
    }

    fn reset(&mut self) {
        self.window.clear();
        self.sum = 0.0;
    }
}

pub type MovingAverageTransform = Siso<MovingAverage>;
