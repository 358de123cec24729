//! Running integral over time

use super::function::{parse_params, SampleTransform, Siso};
use super::types::{TransformError, TransformResult};
use crate::series::Sample;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Accumulation rule between two consecutive samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationMethod {
    /// `(v[i-1] + v[i]) / 2 * dt`
    #[default]
    Trapezoidal,
    /// `v[i] * dt`
    Rectangular,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IntegralConfig {
    pub method: IntegrationMethod,
    /// Fixed sample interval; the measured interval is used when unset
    pub dt: Option<f64>,
}

/// Running sum `acc[i] = acc[i-1] + contribution(v[i-1], v[i], dt)`.
///
/// The first sample after a reset emits `(t0, 0.0)`. Samples with a
/// non-positive interval or a non-finite value contribute nothing and are not
/// emitted.
#[derive(Debug, Default)]
pub struct Integral {
    config: IntegralConfig,
    prev: Option<Sample<f64>>,
    accumulated: f64,
}

impl Integral {
    pub fn new(config: IntegralConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn accumulated(&self) -> f64 {
        self.accumulated
    }
}

impl SampleTransform for Integral {
    const NAME: &'static str = "integral";

    fn configure(&mut self, params: &Value) -> TransformResult<()> {
        if let Some(config) = parse_params::<IntegralConfig>(Self::NAME, params)? {
            if let Some(dt) = config.dt {
                if !(dt.is_finite() && dt > 0.0) {
                    return Err(TransformError::invalid_params(
                        Self::NAME,
                        format!("dt must be positive, got {}", dt),
                    ));
                }
            }
            self.config = config;
        }
        Ok(())
    }

    fn next_point(&mut self, sample: &Sample<f64>) -> Option<Sample<f64>> {
        if !sample.value.is_finite() {
            return None;
        }
        let Some(prev) = self.prev.replace(sample.clone()) else {
            return Some(Sample::new(sample.timestamp, self.accumulated));
        };

        let dt = self
            .config
            .dt
            .unwrap_or(sample.timestamp - prev.timestamp);
        if !(dt > 0.0) {
            return None;
        }

        self.accumulated += match self.config.method {
            IntegrationMethod::Trapezoidal => (prev.value + sample.value) * dt / 2.0,
            IntegrationMethod::Rectangular => sample.value * dt,
        };
        Some(Sample::new(sample.timestamp, self.accumulated))
    }

    fn reset(&mut self) {
        self.prev = None;
        self.accumulated = 0.0;
    }
}

pub type IntegralTransform = Siso<Integral>;
