//! First derivative by backward difference

use super::function::{parse_params, SampleTransform, Siso};
use super::types::{TransformError, TransformResult};
use crate::series::Sample;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DerivativeConfig {
    /// Fixed sample interval; the measured interval is used when unset
    pub dt: Option<f64>,
}

/// `(v[i] - v[i-1]) / (t[i] - t[i-1])`, emitted at `t[i]`.
///
/// The first sample has no derivative. A zero or negative interval, or a
/// non-finite operand, yields no output for that sample.
#[derive(Debug, Default)]
pub struct FirstDerivative {
    config: DerivativeConfig,
    prev: Option<Sample<f64>>,
}

impl FirstDerivative {
    pub fn new(config: DerivativeConfig) -> Self {
        Self { config, prev: None }
    }
}

impl SampleTransform for FirstDerivative {
    const NAME: &'static str = "first_derivative";

    fn configure(&mut self, params: &Value) -> TransformResult<()> {
        if let Some(config) = parse_params::<DerivativeConfig>(Self::NAME, params)? {
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
        let prev = self.prev.replace(sample.clone())?;

        let dt = self
            .config
            .dt
            .unwrap_or(sample.timestamp - prev.timestamp);
        if !(dt > 0.0) {
            return None;
        }
        Some(Sample::new(
            sample.timestamp,
            (sample.value - prev.value) / dt,
        ))
    }

    fn reset(&mut self) {
        self.prev = None;
    }
}

pub type DerivativeTransform = Siso<FirstDerivative>;
