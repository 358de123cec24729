//! Quaternion to Roll/Pitch/Yaw
//!
//! Joins four channels `x, y, z, w` on exact timestamps and emits three Euler
//! angle channels. Angles are unwrapped against the previous output so they
//! stay continuous when the raw extraction jumps across ±π.

use super::function::{parse_params, InputCursor, TransformFunction};
use super::types::{TransformError, TransformResult};
use crate::series::PlotData;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// Squared norms below this are treated as degenerate
const MIN_NORM_SQUARED: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuaternionConfig {
    /// Multiplier applied to the output angles (`180/π` for degrees)
    pub scale: f64,
    /// Unwrap angles into a continuous signal
    pub wrap: bool,
    /// Use the first sample after a reset as the zero orientation
    pub zero_reference: bool,
}

impl Default for QuaternionConfig {
    fn default() -> Self {
        Self {
            scale: 1.0,
            wrap: true,
            zero_reference: false,
        }
    }
}

/// Roll, pitch and yaw in radians
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EulerAngles {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl EulerAngles {
    fn to_array(self) -> [f64; 3] {
        [self.roll, self.pitch, self.yaw]
    }
}

/// Euler angles of the rotation `(x, y, z, w)`.
///
/// Returns `None` for non-finite or near-zero quaternions. The input does not
/// need to be normalized.
pub fn quaternion_to_euler(x: f64, y: f64, z: f64, w: f64) -> Option<EulerAngles> {
    let norm_sq = x * x + y * y + z * z + w * w;
    if !norm_sq.is_finite() || norm_sq < MIN_NORM_SQUARED {
        return None;
    }
    let norm = norm_sq.sqrt();
    let (x, y, z, w) = (x / norm, y / norm, z / norm, w / norm);

    let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));

    let sin_pitch = 2.0 * (w * y - z * x);
    let pitch = if sin_pitch.abs() >= 1.0 {
        FRAC_PI_2.copysign(sin_pitch)
    } else {
        sin_pitch.asin()
    };

    let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));

    Some(EulerAngles { roll, pitch, yaw })
}

/// Shift `angle` by the multiple of 2π that brings it within π of `previous`
fn unwrap_angle(angle: f64, previous: f64) -> f64 {
    let k = ((angle - previous) / TAU).round();
    let unwrapped = angle - k * TAU;
    // round() sends exact half turns away from zero; keep the delta in [-π, π]
    if unwrapped - previous > PI {
        unwrapped - TAU
    } else if unwrapped - previous < -PI {
        unwrapped + TAU
    } else {
        unwrapped
    }
}

#[derive(Debug, Default)]
pub struct QuaternionToRpy {
    config: QuaternionConfig,
    cursor: InputCursor,
    /// Last emitted angles, after offset and unwrap, before scaling
    previous: Option<[f64; 3]>,
    offsets: [f64; 3],
    zero_pending: bool,
}

impl QuaternionToRpy {
    pub fn new(config: QuaternionConfig) -> Self {
        Self {
            zero_pending: config.zero_reference,
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &QuaternionConfig {
        &self.config
    }

    /// Capture the next processed sample as the zero orientation
    pub fn request_zero(&mut self) {
        self.zero_pending = true;
    }

    /// Change the output scale; affects samples processed from now on
    pub fn set_scale(&mut self, scale: f64) {
        self.config.scale = scale;
    }

    fn process(&mut self, angles: EulerAngles) -> [f64; 3] {
        let raw = angles.to_array();
        if self.zero_pending {
            self.offsets = raw;
            self.previous = None;
            self.zero_pending = false;
        }

        let mut out = [0.0; 3];
        for axis in 0..3 {
            let mut angle = raw[axis] - self.offsets[axis];
            if self.config.wrap {
                if let Some(prev) = self.previous {
                    angle = unwrap_angle(angle, prev[axis]);
                }
            }
            out[axis] = angle;
        }
        self.previous = Some(out);
        out.map(|a| a * self.config.scale)
    }
}

impl TransformFunction for QuaternionToRpy {
    fn name(&self) -> &'static str {
        "quaternion_to_rpy"
    }

    fn num_inputs(&self) -> usize {
        4
    }

    fn num_outputs(&self) -> usize {
        3
    }

    fn configure(&mut self, params: &Value) -> TransformResult<()> {
        if let Some(config) = parse_params::<QuaternionConfig>(self.name(), params)? {
            if !config.scale.is_finite() || config.scale == 0.0 {
                return Err(TransformError::invalid_params(
                    self.name(),
                    format!("scale must be finite and non-zero, got {}", config.scale),
                ));
            }
            self.zero_pending = config.zero_reference;
            self.config = config;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.cursor = InputCursor::default();
        self.previous = None;
        self.offsets = [0.0; 3];
        self.zero_pending = self.config.zero_reference;
    }

    fn calculate(&mut self, inputs: &[&PlotData], outputs: &mut [PlotData]) {
        let [x, y, z, w] = inputs else {
            return;
        };
        if outputs.len() < 3 {
            return;
        }

        let start = x.first_at_or_after(self.cursor.last_timestamp());
        for sample in x.iter_from(start) {
            let t = sample.timestamp;
            if t <= self.cursor.last_timestamp() {
                continue;
            }

            let partners = [y, z, w]
                .map(|series| series.index_at_exact(t).and_then(|i| series.get(i)));
            let [Some(qy), Some(qz), Some(qw)] = partners else {
                // Wait for the partner channels unless they have moved past t
                let pending = [y, z, w]
                    .iter()
                    .any(|series| series.back().map_or(true, |s| s.timestamp < t));
                if pending {
                    break;
                }
                self.cursor.advance(t);
                continue;
            };
            self.cursor.advance(t);

            let Some(angles) = quaternion_to_euler(sample.value, qy.value, qz.value, qw.value)
            else {
                log::debug!("quaternion_to_rpy: skipping degenerate quaternion at t={}", t);
                continue;
            };
            let rpy = self.process(angles);
            for (output, value) in outputs.iter_mut().zip(rpy) {
                output.push_point(t, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn yaw_quaternion(yaw: f64) -> (f64, f64, f64, f64) {
        (0.0, 0.0, (yaw / 2.0).sin(), (yaw / 2.0).cos())
    }

    fn channels(points: &[(f64, (f64, f64, f64, f64))]) -> [PlotData; 4] {
        let mut series = [
            PlotData::new("x"),
            PlotData::new("y"),
            PlotData::new("z"),
            PlotData::new("w"),
        ];
        for &(t, (x, y, z, w)) in points {
            series[0].push_point(t, x);
            series[1].push_point(t, y);
            series[2].push_point(t, z);
            series[3].push_point(t, w);
        }
        series
    }

    fn run(transform: &mut QuaternionToRpy, inputs: &[PlotData; 4], outputs: &mut [PlotData]) {
        let refs: Vec<&PlotData> = inputs.iter().collect();
        transform.calculate(&refs, outputs);
    }

    fn new_outputs() -> Vec<PlotData> {
        vec![
            PlotData::new("roll"),
            PlotData::new("pitch"),
            PlotData::new("yaw"),
        ]
    }

    #[test]
    fn test_identity_is_zero() {
        let angles = quaternion_to_euler(0.0, 0.0, 0.0, 1.0).unwrap();
        assert_eq!(angles.to_array(), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_unnormalized_input() {
        let (x, y, z, w) = yaw_quaternion(0.5);
        let angles = quaternion_to_euler(3.0 * x, 3.0 * y, 3.0 * z, 3.0 * w).unwrap();
        assert!((angles.yaw - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_rejected() {
        assert!(quaternion_to_euler(0.0, 0.0, 0.0, 0.0).is_none());
        assert!(quaternion_to_euler(f64::NAN, 0.0, 0.0, 1.0).is_none());
    }

    #[test]
    fn test_pitch_clamped_at_gimbal_lock() {
        let s = std::f64::consts::FRAC_1_SQRT_2;
        let angles = quaternion_to_euler(0.0, s, 0.0, s).unwrap();
        assert!((angles.pitch - FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn test_yaw_continuous_across_pi() {
        let points: Vec<_> = (0..40)
            .map(|i| {
                let yaw = 2.8 + 0.05 * i as f64;
                (i as f64 * 0.01, yaw_quaternion(yaw))
            })
            .collect();
        let inputs = channels(&points);
        let mut outputs = new_outputs();
        let mut transform = QuaternionToRpy::default();
        run(&mut transform, &inputs, &mut outputs);

        let yaw: Vec<f64> = outputs[2].iter().map(|s| s.value).collect();
        assert_eq!(yaw.len(), 40);
        for pair in yaw.windows(2) {
            assert!((pair[1] - pair[0] - 0.05).abs() < 1e-9);
        }
        assert!(yaw[39] > PI);
    }

    #[test]
    fn test_without_wrap_jumps() {
        let inputs = channels(&[(0.0, yaw_quaternion(3.1)), (1.0, yaw_quaternion(3.2))]);
        let mut outputs = new_outputs();
        let mut transform = QuaternionToRpy::default();
        transform.configure(&json!({ "wrap": false })).unwrap();
        run(&mut transform, &inputs, &mut outputs);

        let last = outputs[2].back().unwrap().value;
        assert!((last - (3.2 - TAU)).abs() < 1e-9);
    }

    #[test]
    fn test_scale_to_degrees() {
        let inputs = channels(&[(0.0, yaw_quaternion(FRAC_PI_2))]);
        let mut outputs = new_outputs();
        let mut transform = QuaternionToRpy::new(QuaternionConfig {
            scale: 180.0 / PI,
            ..Default::default()
        });
        run(&mut transform, &inputs, &mut outputs);
        assert!((outputs[2].back().unwrap().value - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_reference() {
        let inputs = channels(&[(0.0, yaw_quaternion(1.0)), (1.0, yaw_quaternion(1.5))]);
        let mut outputs = new_outputs();
        let mut transform = QuaternionToRpy::default();
        transform
            .configure(&json!({ "zero_reference": true }))
            .unwrap();
        run(&mut transform, &inputs, &mut outputs);

        let yaw: Vec<f64> = outputs[2].iter().map(|s| s.value).collect();
        assert!(yaw[0].abs() < 1e-12);
        assert!((yaw[1] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_request_zero_mid_stream() {
        let mut inputs = channels(&[(0.0, yaw_quaternion(0.2))]);
        let mut outputs = new_outputs();
        let mut transform = QuaternionToRpy::default();
        run(&mut transform, &inputs, &mut outputs);

        transform.request_zero();
        let (x, y, z, w) = yaw_quaternion(0.7);
        for (series, v) in inputs.iter_mut().zip([x, y, z, w]) {
            series.push_point(1.0, v);
        }
        run(&mut transform, &inputs, &mut outputs);
        assert!(outputs[2].back().unwrap().value.abs() < 1e-12);
    }

    #[test]
    fn test_waits_for_partner_channels() {
        let mut inputs = channels(&[(0.0, yaw_quaternion(0.1))]);
        inputs[0].push_point(1.0, 0.0);
        let mut outputs = new_outputs();
        let mut transform = QuaternionToRpy::default();
        run(&mut transform, &inputs, &mut outputs);
        assert_eq!(outputs[2].len(), 1);

        let (_, y, z, w) = yaw_quaternion(0.2);
        inputs[1].push_point(1.0, y);
        inputs[2].push_point(1.0, z);
        inputs[3].push_point(1.0, w);
        run(&mut transform, &inputs, &mut outputs);
        assert_eq!(outputs[2].len(), 2);
    }

    #[test]
    fn test_non_increasing_timestamps_ignored() {
        let inputs = channels(&[
            (0.0, yaw_quaternion(0.1)),
            (0.0, yaw_quaternion(0.2)),
            (1.0, yaw_quaternion(0.3)),
        ]);
        let mut outputs = new_outputs();
        let mut transform = QuaternionToRpy::default();
        run(&mut transform, &inputs, &mut outputs);
        assert_eq!(outputs[2].len(), 2);
    }

    #[test]
    fn test_reset_reprocesses() {
        let inputs = channels(&[(0.0, yaw_quaternion(0.4)), (1.0, yaw_quaternion(0.6))]);
        let mut transform = QuaternionToRpy::default();
        let mut first = new_outputs();
        run(&mut transform, &inputs, &mut first);
        transform.reset();
        let mut second = new_outputs();
        run(&mut transform, &inputs, &mut second);

        let a: Vec<_> = first[2].iter().cloned().collect();
        let b: Vec<_> = second[2].iter().cloned().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_scale() {
        let mut transform = QuaternionToRpy::default();
        assert!(transform.configure(&json!({ "scale": 0.0 })).is_err());
        assert!(transform.configure(&json!({ "degrees": true })).is_err());
    }
}
