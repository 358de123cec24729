//! Linear scaling of values and timestamps

use super::function::{parse_params, SampleTransform, Siso};
use super::types::TransformResult;
use crate::series::Sample;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameters of [`Scale`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScaleConfig {
    /// Multiplier applied to every value
    pub factor: f64,
    /// Added after multiplication
    pub offset: f64,
    /// Added to every timestamp
    pub time_offset: f64,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            factor: 1.0,
            offset: 0.0,
            time_offset: 0.0,
        }
    }
}

/// `value * factor + offset`, stateless apart from its configuration
#[derive(Debug, Default)]
pub struct Scale {
    config: ScaleConfig,
}

impl Scale {
    pub fn new(config: ScaleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScaleConfig {
        &self.config
    }
}

impl SampleTransform for Scale {
    const NAME: &'static str = "scale";

    fn configure(&mut self, params: &Value) -> TransformResult<()> {
        if let Some(config) = parse_params(Self::NAME, params)? {
            self.config = config;
        }
        Ok(())
    }

    fn next_point(&mut self, sample: &Sample<f64>) -> Option<Sample<f64>> {
        if !sample.value.is_finite() {
            return None;
        }
        Some(Sample::new(
            sample.timestamp + self.config.time_offset,
            sample.value * self.config.factor + self.config.offset,
        ))
    }

    fn reset(&mut self) {}
}

pub type ScaleTransform = Siso<Scale>;
