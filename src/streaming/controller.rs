// Stream controller - consumer side of a streaming session
//
// The controller manages:
// - Streamer lifecycle (start, shutdown)
// - Draining streamer events
// - Merging streamer data into the host collection
// - Running the transform pipeline on the host collection

use crate::config::EngineSettings;
use crate::series::PlotDataMap;
use crate::streaming::streamer::{DataStreamer, StreamerEvents};
use crate::streaming::types::{StreamResult, StreamerEvent};
use crate::transforms::TransformPipeline;

/// What a single [`StreamController::poll`] observed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollSummary {
    pub events: usize,
    pub samples_merged: usize,
    pub samples_computed: usize,
    pub buffers_cleared: bool,
    pub groups_removed: Vec<String>,
    /// The source reported its end
    pub closed: bool,
    pub notifications: Option<usize>,
    pub running: bool,
}

/// Owns a streamer, the host copy of its data and the transforms run on it
pub struct StreamController {
    pub id: String,
    streamer: Box<dyn DataStreamer>,
    pipeline: TransformPipeline,
    data: PlotDataMap,
    events: StreamerEvents,
    settings: EngineSettings,
}

impl StreamController {
    pub fn new(
        mut streamer: Box<dyn DataStreamer>,
        pipeline: TransformPipeline,
        settings: EngineSettings,
    ) -> Self {
        let settings = settings.validated();
        streamer
            .base_mut()
            .set_shutdown_grace(settings.shutdown_grace());
        streamer.set_maximum_range_x(settings.buffer_size_secs);
        let events = streamer.events();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            streamer,
            pipeline,
            data: PlotDataMap::with_maximum_range_x(settings.buffer_size_secs),
            events,
            settings,
        }
    }

    pub async fn start(&mut self, args: &[String]) -> StreamResult<()> {
        log::info!(
            "Starting stream controller {} for '{}'",
            self.id,
            self.streamer.name()
        );
        self.streamer.start(args).await
    }

    pub async fn shutdown(&mut self) -> StreamResult<()> {
        log::info!("Stopping stream controller {}", self.id);
        self.streamer.shutdown().await
    }

    pub fn is_running(&self) -> bool {
        self.streamer.is_running()
    }

    /// Drain events, merge new samples and run the transforms once.
    ///
    /// Events are drained while the streamer's lock is held, so a
    /// `BuffersCleared` is always handled before the samples written after
    /// it are merged.
    pub fn poll(&mut self) -> PollSummary {
        let mut summary = PollSummary::default();
        let shared = self.streamer.data_map();

        {
            let mut source = shared.lock();
            for event in self.events.try_iter() {
                summary.events += 1;
                match event {
                    StreamerEvent::BuffersCleared => {
                        self.pipeline.reset(&mut self.data);
                        self.data.clear();
                        summary.buffers_cleared = true;
                    }
                    StreamerEvent::GroupRemoved { group } => {
                        let removed = self.data.remove_group(&group);
                        self.pipeline.reset_consumers_of(&removed, &mut self.data);
                        summary.groups_removed.push(group);
                    }
                    StreamerEvent::Closed => summary.closed = true,
                    StreamerEvent::NotificationsChanged { count } => {
                        summary.notifications = Some(count)
                    }
                    StreamerEvent::DataReceived | StreamerEvent::RunStatusChanged { .. } => {}
                }
            }

            match self.data.absorb(&mut source) {
                Ok(moved) => summary.samples_merged = moved,
                Err(e) => log::warn!("Merging data from '{}': {}", self.streamer.name(), e),
            }
        }

        summary.samples_computed = self.pipeline.calculate(&mut self.data);
        summary.running = self.streamer.is_running();
        summary
    }

    /// Host copy of the data, including transform outputs
    pub fn data(&self) -> &PlotDataMap {
        &self.data
    }

    pub fn pipeline(&self) -> &TransformPipeline {
        &self.pipeline
    }

    /// Replace the pipeline; the previous outputs are removed
    pub fn set_pipeline(&mut self, pipeline: TransformPipeline) {
        self.pipeline.reset(&mut self.data);
        for name in self.pipeline.output_channels() {
            let _ = self.data.remove(name);
        }
        self.pipeline = pipeline;
    }

    pub fn streamer(&self) -> &dyn DataStreamer {
        self.streamer.as_ref()
    }

    pub fn streamer_mut(&mut self) -> &mut dyn DataStreamer {
        self.streamer.as_mut()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Change the retention window of the streamer and host collections
    pub fn set_buffer_size(&mut self, secs: f64) {
        self.settings.buffer_size_secs = secs;
        self.settings = self.settings.clone().validated();
        self.streamer
            .set_maximum_range_x(self.settings.buffer_size_secs);
        self.data
            .set_maximum_range_x(self.settings.buffer_size_secs);
        log::info!("Buffer size set to {}s", self.settings.buffer_size_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::source::{CsvReplayStreamer, DummyStreamer};
    use crate::transforms::{TransformFactory, TransformSpec};
    use std::io::Write;
    use std::time::Duration;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_poll_merges_and_transforms() {
        let factory = TransformFactory::with_builtins();
        let pipeline = TransformPipeline::build(
            &factory,
            &[TransformSpec::new(
                "quaternion_to_rpy",
                ["imu/quat/x", "imu/quat/y", "imu/quat/z", "imu/quat/w"],
                ["imu/roll", "imu/pitch", "imu/yaw"],
            )],
        )
        .unwrap();

        let mut controller = StreamController::new(
            Box::new(DummyStreamer::new()),
            pipeline,
            EngineSettings::default(),
        );
        controller
            .start(&args(&["rate_hz=500", "relative_time=true"]))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let summary = controller.poll();
        assert!(summary.samples_merged > 0);
        assert!(summary.samples_computed > 0);
        assert!(summary.running);
        assert!(controller.data().numeric("imu/yaw").is_some());

        controller.shutdown().await.unwrap();
        assert!(!controller.is_running());

        // Nothing is written after shutdown, so one more poll drains the streamer
        let last = controller.poll();
        assert!(!last.running);
        assert!(controller
            .streamer()
            .data_map()
            .lock()
            .numeric("dummy/sin_0")
            .is_some_and(|s| s.is_empty()));
    }

    #[tokio::test]
    async fn test_buffers_cleared_resets_host() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "x\n1\n2\n3\n").unwrap();

        let factory = TransformFactory::with_builtins();
        let pipeline =
            TransformPipeline::build(&factory, &[TransformSpec::new("integral", ["csv/x"], ["area"])])
                .unwrap();
        let mut controller = StreamController::new(
            Box::new(CsvReplayStreamer::new()),
            pipeline,
            EngineSettings::default(),
        );
        controller
            .start(&[
                format!("path={}", file.path().display()),
                "loop_playback=true".to_string(),
                "rate_limit_ms=2".to_string(),
            ])
            .await
            .unwrap();

        let mut cleared = false;
        for _ in 0..200 {
            let summary = controller.poll();
            if summary.buffers_cleared {
                cleared = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        controller.shutdown().await.unwrap();
        assert!(cleared);
        // The host copy never holds more than one pass of the file
        assert!(controller.data().numeric("csv/x").map_or(0, |s| s.len()) <= 3);
    }

    #[test]
    fn test_group_removal_resets_derived_channels() {
        let factory = TransformFactory::with_builtins();
        let pipeline = TransformPipeline::build(
            &factory,
            &[
                TransformSpec::new("integral", ["imu/x"], ["imu/x_sum"]),
                TransformSpec::new("integral", ["gps/lat"], ["gps/lat_sum"]),
            ],
        )
        .unwrap();
        let mut controller = StreamController::new(
            Box::new(DummyStreamer::new()),
            pipeline,
            EngineSettings::default(),
        );
        let ctx = controller.streamer().base().context();

        ctx.write_batch(|map| {
            for i in 0..4 {
                let t = i as f64;
                map.add_sample("imu/x", Some("imu"), t, 1.0.into()).unwrap();
                map.add_sample("gps/lat", Some("gps"), t, 1.0.into()).unwrap();
            }
        });
        controller.poll();
        assert_eq!(controller.data().numeric("imu/x_sum").unwrap().len(), 4);

        ctx.remove_group("imu");
        let summary = controller.poll();
        assert_eq!(summary.groups_removed, vec!["imu".to_string()]);
        assert!(controller.data().numeric("imu/x").is_none());
        assert!(controller.data().numeric("imu/x_sum").unwrap().is_empty());
        assert_eq!(controller.data().numeric("gps/lat_sum").unwrap().len(), 4);

        // A restarted group integrates from zero again
        ctx.write_batch(|map| {
            map.add_sample("imu/x", Some("imu"), 10.0, 1.0.into()).unwrap();
            map.add_sample("imu/x", Some("imu"), 11.0, 1.0.into()).unwrap();
        });
        controller.poll();
        let sums: Vec<f64> = controller
            .data()
            .numeric("imu/x_sum")
            .unwrap()
            .iter()
            .map(|s| s.value)
            .collect();
        assert_eq!(sums, vec![0.0, 1.0]);
    }

    #[test]
    fn test_set_buffer_size_clamps() {
        let mut controller = StreamController::new(
            Box::new(DummyStreamer::new()),
            TransformPipeline::empty(),
            EngineSettings::default(),
        );
        controller.set_buffer_size(1.0);
        assert_eq!(controller.settings().buffer_size_secs, 10.0);
        assert_eq!(controller.data().max_range_x(), 10.0);
    }
}
