//! Outlier removal against trailing window statistics

use super::function::{parse_params, SampleTransform, Siso};
use super::types::{TransformError, TransformResult};
use crate::series::Sample;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutlierConfig {
    /// Window length in seconds
    pub window: f64,
    /// Rejection threshold in standard deviations
    pub threshold: f64,
    /// Below this many accepted samples in the window everything is accepted
    pub min_samples: usize,
    /// Consecutive rejections after which the next sample restarts the
    /// window. Zero disables the restart.
    pub max_consecutive: usize,
    /// Lower bound applied to the standard deviation
    pub min_std: f64,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            window: 1.0,
            threshold: 3.0,
            min_samples: 3,
            max_consecutive: 5,
            min_std: 1e-9,
        }
    }
}

impl OutlierConfig {
    fn validate(&self) -> Result<(), String> {
        if !(self.window.is_finite() && self.window > 0.0) {
            return Err(format!("window must be positive, got {}", self.window));
        }
        if !(self.threshold.is_finite() && self.threshold > 0.0) {
            return Err(format!("threshold must be positive, got {}", self.threshold));
        }
        if !(self.min_std.is_finite() && self.min_std >= 0.0) {
            return Err(format!("min_std must be non-negative, got {}", self.min_std));
        }
        Ok(())
    }
}

/// Drops samples that deviate more than `threshold` standard deviations
/// from the mean of the samples accepted within the trailing window.
#[derive(Debug, Default)]
pub struct OutlierRemoval {
    config: OutlierConfig,
    accepted: VecDeque<Sample<f64>>,
    consecutive_rejections: usize,
}

impl OutlierRemoval {
    pub fn new(config: OutlierConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn consecutive_rejections(&self) -> usize {
        self.consecutive_rejections
    }

    fn mean_std(&self) -> (f64, f64) {
        let n = self.accepted.len() as f64;
        let mean = self.accepted.iter().map(|s| s.value).sum::<f64>() / n;
        let var = self
            .accepted
            .iter()
            .map(|s| (s.value - mean).powi(2))
            .sum::<f64>()
            / n;
        (mean, var.sqrt())
    }

    fn accept(&mut self, sample: &Sample<f64>) -> Option<Sample<f64>> {
        self.accepted.push_back(sample.clone());
        self.consecutive_rejections = 0;
        Some(sample.clone())
    }
}

impl SampleTransform for OutlierRemoval {
    const NAME: &'static str = "outlier_removal";

    fn configure(&mut self, params: &Value) -> TransformResult<()> {
        if let Some(config) = parse_params::<OutlierConfig>(Self::NAME, params)? {
            config
                .validate()
                .map_err(|reason| TransformError::invalid_params(Self::NAME, reason))?;
            self.config = config;
        }
        Ok(())
    }

    fn next_point(&mut self, sample: &Sample<f64>) -> Option<Sample<f64>> {
        if !sample.value.is_finite() {
            return None;
        }

        let start = sample.timestamp - self.config.window;
        while self.accepted.front().is_some_and(|s| s.timestamp < start) {
            self.accepted.pop_front();
        }

        if self.config.max_consecutive > 0
            && self.consecutive_rejections >= self.config.max_consecutive
        {
            log::debug!(
                "{}: level shift at t={}, restarting window",
                Self::NAME,
                sample.timestamp
            );
            self.accepted.clear();
            return self.accept(sample);
        }

        if self.accepted.len() < self.config.min_samples.max(1) {
            return self.accept(sample);
        }

        let (mean, std) = self.mean_std();
        let limit = self.config.threshold * std.max(self.config.min_std);
        if (sample.value - mean).abs() > limit {
            self.consecutive_rejections += 1;
            None
        } else {
            self.accept(sample)
        }
    }

    fn reset(&mut self) {
        self.accepted.clear();
        self.consecutive_rejections = 0;
    }
}

pub type OutlierRemovalTransform = Siso<OutlierRemoval>;
