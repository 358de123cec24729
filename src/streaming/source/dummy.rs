// Synthetic data streamer
//
// Generates sine/cosine channels, an IMU orientation rotating about the
// vertical axis and a text status channel. Useful for demos and for
// exercising transforms without hardware.

use crate::series::{PlotDataMap, SampleValue};
use crate::streaming::args::parse_args;
use crate::streaming::streamer::{DataStreamer, StreamerBase, StreamerContext};
use crate::streaming::types::{StreamError, StreamResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use tokio::time::{interval, Duration, MissedTickBehavior};

pub const DUMMY_STREAMER: &str = "dummy";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DummyConfig {
    /// Samples per second and channel
    pub rate_hz: f64,
    /// Number of sine/cosine channel pairs
    pub channels: usize,
    /// Also publish an orientation quaternion in the `imu` group
    pub quaternion: bool,
    /// Yaw rate of the synthetic orientation, in radians per second
    pub yaw_rate: f64,
    /// Timestamps start at zero instead of the wall clock
    pub relative_time: bool,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            rate_hz: 50.0,
            channels: 2,
            quaternion: true,
            yaw_rate: 1.0,
            relative_time: false,
        }
    }
}

impl DummyConfig {
    fn validate(&self) -> StreamResult<()> {
        if !(self.rate_hz.is_finite() && self.rate_hz > 0.0) {
            return Err(StreamError::InvalidConfig(format!(
                "rate_hz must be positive, got {}",
                self.rate_hz
            )));
        }
        if !self.yaw_rate.is_finite() {
            return Err(StreamError::InvalidConfig("yaw_rate must be finite".to_string()));
        }
        Ok(())
    }
}

fn add(map: &mut PlotDataMap, name: &str, group: &str, timestamp: f64, value: SampleValue) -> usize {
    match map.add_sample(name, Some(group), timestamp, value) {
        Ok(true) => 1,
        Ok(false) => 0,
        Err(e) => {
            log::debug!("Dummy streamer: {}", e);
            0
        }
    }
}

/// Writes one tick of synthetic samples at time `t` (seconds since start).
///
/// Returns the number of samples accepted.
fn write_tick(config: &DummyConfig, map: &mut PlotDataMap, timestamp: f64, t: f64, tick: u64) -> usize {
    let mut written = 0;
    for i in 0..config.channels {
        let freq = 0.2 * (i + 1) as f64;
        let phase = TAU * freq * t;
        written += add(map, &format!("dummy/sin_{}", i), "dummy", timestamp, phase.sin().into());
        written += add(map, &format!("dummy/cos_{}", i), "dummy", timestamp, phase.cos().into());
    }

    if config.quaternion {
        let half_yaw = config.yaw_rate * t / 2.0;
        let components = [
            ("imu/quat/x", 0.0),
            ("imu/quat/y", 0.0),
            ("imu/quat/z", half_yaw.sin()),
            ("imu/quat/w", half_yaw.cos()),
        ];
        for (name, value) in components {
            written += add(map, name, "imu", timestamp, SampleValue::Numeric(value));
        }
    }

    if tick % config.rate_hz.ceil().max(1.0) as u64 == 0 {
        written += add(
            map,
            "dummy/status",
            "dummy",
            timestamp,
            SampleValue::Text(format!("tick {}", tick)),
        );
    }
    written
}

async fn produce(config: DummyConfig, ctx: StreamerContext) -> StreamResult<()> {
    let period = Duration::from_secs_f64(1.0 / config.rate_hz);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let started = std::time::Instant::now();
    let epoch = if config.relative_time {
        0.0
    } else {
        chrono::Utc::now().timestamp_micros() as f64 / 1e6
    };
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            biased;

            _ = ctx.cancelled() => {
                log::debug!("Dummy streamer cancelled after {} ticks", tick);
                return Ok(());
            }

            _ = ticker.tick() => {
                let t = started.elapsed().as_secs_f64();
                if ctx
                    .write_batch(|map| write_tick(&config, map, epoch + t, t, tick))
                    .is_none()
                {
                    return Ok(());
                }
                tick += 1;
            }
        }
    }
}

pub struct DummyStreamer {
    base: StreamerBase,
    config: DummyConfig,
}

impl DummyStreamer {
    pub fn new() -> Self {
        Self {
            base: StreamerBase::new(DUMMY_STREAMER),
            config: DummyConfig::default(),
        }
    }

    pub fn config(&self) -> &DummyConfig {
        &self.config
    }
}

impl Default for DummyStreamer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataStreamer for DummyStreamer {
    fn base(&self) -> &StreamerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StreamerBase {
        &mut self.base
    }

    async fn start(&mut self, args: &[String]) -> StreamResult<()> {
        self.base.begin_start()?;

        let config = match parse_args::<DummyConfig>(args).and_then(|c| c.validate().map(|_| c)) {
            Ok(config) => config,
            Err(e) => {
                self.base.abort_start(&e);
                return Err(e);
            }
        };

        log::info!(
            "Dummy streamer: {} channel pairs at {} Hz",
            config.channels,
            config.rate_hz
        );
        self.config = config.clone();
        let ctx = self.base.context();
        self.base.launch(produce(config, ctx));
        Ok(())
    }
}
