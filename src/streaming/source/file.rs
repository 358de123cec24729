// CSV replay streamer
//
// Loads a CSV file when started and replays its rows at a configurable rate,
// useful for:
// - Testing transforms against recorded sessions
// - Demos without a live source
//
// Every column except the time column becomes a channel. Cells that parse as
// numbers are numeric samples, anything else is text.

use crate::series::{PlotDataMap, SampleValue};
use crate::streaming::args::parse_args;
use crate::streaming::streamer::{DataStreamer, StreamerBase, StreamerContext};
use crate::streaming::types::{StreamError, StreamResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::time::{sleep, Duration};

pub const CSV_REPLAY_STREAMER: &str = "csv_replay";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CsvReplayConfig {
    pub path: PathBuf,
    /// Delay between batches in milliseconds
    pub rate_limit_ms: u64,
    /// Rows written per batch
    pub rows_per_batch: usize,
    /// Column holding timestamps in seconds; row index times `period`
    /// otherwise
    pub time_column: Option<String>,
    pub period: f64,
    /// Restart from the first row at EOF, clearing buffers
    pub loop_playback: bool,
    /// Channel name prefix and group
    pub prefix: String,
}

impl Default for CsvReplayConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            rate_limit_ms: 10,
            rows_per_batch: 1,
            time_column: None,
            period: 0.01,
            loop_playback: false,
            prefix: "csv".to_string(),
        }
    }
}

impl CsvReplayConfig {
    fn validate(&self) -> StreamResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(StreamError::InvalidConfig("path is required".to_string()));
        }
        if self.rows_per_batch == 0 {
            return Err(StreamError::InvalidConfig(
                "rows_per_batch must be positive".to_string(),
            ));
        }
        if !(self.period.is_finite() && self.period > 0.0) {
            return Err(StreamError::InvalidConfig(format!(
                "period must be positive, got {}",
                self.period
            )));
        }
        Ok(())
    }
}

/// One parsed CSV row
#[derive(Debug, Clone, PartialEq)]
struct Row {
    timestamp: f64,
    values: Vec<SampleValue>,
}

/// The whole file, loaded before playback starts
#[derive(Debug, Clone, Default)]
struct Recording {
    channels: Vec<String>,
    rows: Vec<Row>,
}

fn parse_cell(cell: &str) -> SampleValue {
    let cell = cell.trim();
    match cell.parse::<f64>() {
        Ok(v) => SampleValue::Numeric(v),
        Err(_) => SampleValue::Text(cell.to_string()),
    }
}

fn load_recording(path: &Path, config: &CsvReplayConfig) -> StreamResult<Recording> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| StreamError::Connection(format!("Failed to open {}: {}", path.display(), e)))?;

    let headers = reader
        .headers()
        .map_err(|e| StreamError::Parse(format!("Failed to read CSV header: {}", e)))?
        .clone();

    let time_index = match &config.time_column {
        Some(column) => Some(headers.iter().position(|h| h == column.as_str()).ok_or_else(|| {
            StreamError::InvalidConfig(format!("Time column '{}' not found", column))
        })?),
        None => None,
    };

    let channels: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != time_index)
        .map(|(_, name)| format!("{}/{}", config.prefix, name))
        .collect();

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| StreamError::Parse(format!("CSV row {}: {}", index + 1, e)))?;

        let timestamp = match time_index {
            Some(col) => match record.get(col).map(str::parse::<f64>) {
                Some(Ok(t)) if t.is_finite() => t,
                _ => {
                    log::warn!("Skipping CSV row {}: invalid timestamp", index + 1);
                    continue;
                }
            },
            None => index as f64 * config.period,
        };

        let values = record
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != time_index)
            .map(|(_, cell)| parse_cell(cell))
            .collect();
        rows.push(Row { timestamp, values });
    }

    Ok(Recording { channels, rows })
}

fn write_rows(recording: &Recording, rows: &[Row], group: &str, map: &mut PlotDataMap) -> usize {
    let mut written = 0;
    for row in rows {
        for (name, value) in recording.channels.iter().zip(&row.values) {
            // Empty cells carry no sample
            if matches!(value, SampleValue::Text(s) if s.is_empty()) {
                continue;
            }
            match map.add_sample(name, Some(group), row.timestamp, value.clone()) {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(e) => log::debug!("CSV replay: {}", e),
            }
        }
    }
    written
}

async fn produce(
    recording: Recording,
    config: CsvReplayConfig,
    ctx: StreamerContext,
) -> StreamResult<()> {
    let delay = Duration::from_millis(config.rate_limit_ms);

    loop {
        for batch in recording.rows.chunks(config.rows_per_batch) {
            if ctx
                .write_batch(|map| write_rows(&recording, batch, &config.prefix, map))
                .is_none()
            {
                return Ok(());
            }

            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Ok(()),
                _ = sleep(delay) => {}
            }
        }

        if !config.loop_playback || recording.rows.is_empty() {
            log::info!("CSV replay reached end of {}", config.path.display());
            return Ok(());
        }

        log::debug!("CSV replay looping {}", config.path.display());
        if !ctx.clear_buffers() {
            return Ok(());
        }
    }
}

pub struct CsvReplayStreamer {
    base: StreamerBase,
}

impl CsvReplayStreamer {
    pub fn new() -> Self {
        Self {
            base: StreamerBase::new(CSV_REPLAY_STREAMER),
        }
    }

    async fn open(args: &[String]) -> StreamResult<(Recording, CsvReplayConfig)> {
        let config: CsvReplayConfig = parse_args(args)?;
        config.validate()?;

        let path = config.path.clone();
        let load_config = config.clone();
        let recording = tokio::task::spawn_blocking(move || load_recording(&path, &load_config))
            .await
            .map_err(|e| StreamError::Io(std::io::Error::other(e)))??;

        log::info!(
            "Loaded {}: {} channels, {} rows",
            config.path.display(),
            recording.channels.len(),
            recording.rows.len()
        );
        Ok((recording, config))
    }
}

impl Default for CsvReplayStreamer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataStreamer for CsvReplayStreamer {
    fn base(&self) -> &StreamerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StreamerBase {
        &mut self.base
    }

    async fn start(&mut self, args: &[String]) -> StreamResult<()> {
        self.base.begin_start()?;

        let (recording, config) = match Self::open(args).await {
            Ok(opened) => opened,
            Err(e) => {
                self.base.abort_start(&e);
                return Err(e);
            }
        };

        let ctx = self.base.context();
        self.base.launch(produce(recording, config, ctx));
        Ok(())
    }
}
