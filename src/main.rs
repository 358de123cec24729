use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use seriesflow::config::{EngineSettings, PipelineConfig};
use seriesflow::series::PlotDataMap;
use seriesflow::streaming::{available_streamers, create_streamer, ParserFactory, StreamController};
use seriesflow::transforms::{TransformFactory, TransformPipeline};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

mod cli;

use cli::Cli;

#[derive(Serialize)]
struct ChannelSummary {
    name: String,
    kind: String,
    samples: usize,
    first_timestamp: Option<f64>,
    last_timestamp: Option<f64>,
    last_value: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct RunSummary {
    session: String,
    streamer: String,
    polls: u64,
    samples_merged: usize,
    samples_computed: usize,
    channels: Vec<ChannelSummary>,
}

fn summarize_channels(map: &PlotDataMap) -> Vec<ChannelSummary> {
    let mut channels = Vec::new();
    for series in map.numeric_series() {
        channels.push(ChannelSummary {
            name: series.name().to_string(),
            kind: "numeric".to_string(),
            samples: series.len(),
            first_timestamp: series.front().map(|s| s.timestamp),
            last_timestamp: series.back().map(|s| s.timestamp),
            last_value: series.back().map(|s| serde_json::json!(s.value)),
        });
    }
    for series in map.string_series() {
        channels.push(ChannelSummary {
            name: series.name().to_string(),
            kind: "text".to_string(),
            samples: series.len(),
            first_timestamp: series.front().map(|s| s.timestamp),
            last_timestamp: series.back().map(|s| s.timestamp),
            last_value: series.back().map(|s| serde_json::json!(s.value)),
        });
    }
    for series in map.structured_series() {
        channels.push(ChannelSummary {
            name: series.name().to_string(),
            kind: "structured".to_string(),
            samples: series.len(),
            first_timestamp: series.front().map(|s| s.timestamp),
            last_timestamp: series.back().map(|s| s.timestamp),
            last_value: series.back().map(|s| s.value.clone()),
        });
    }
    channels.sort_by(|a, b| a.name.cmp(&b.name));
    channels
}

fn print_listing(factory: &TransformFactory) {
    println!("Streamers:");
    for name in available_streamers() {
        println!("  {}", name);
    }
    println!("Transforms:");
    for name in factory.names() {
        println!("  {}", name);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let factory = TransformFactory::with_builtins();
    if cli.list {
        print_listing(&factory);
        return Ok(());
    }

    let mut settings = EngineSettings::from_env().context("Reading environment settings")?;
    if let Some(secs) = cli.buffer_size {
        settings.buffer_size_secs = secs;
    }
    let settings = settings.validated();

    let pipeline = match &cli.pipeline {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Loading pipeline {}", path.display()))?
            .build(&factory)
            .context("Building transform pipeline")?,
        None => TransformPipeline::empty(),
    };

    if let Some(duration) = cli.duration {
        if !(duration.is_finite() && duration > 0.0) {
            bail!("--duration must be a positive number of seconds");
        }
    }

    let mut streamer = create_streamer(&cli.streamer)?;
    streamer.set_available_parsers(Arc::new(ParserFactory::with_builtins()));

    let mut controller = StreamController::new(streamer, pipeline, settings.clone());
    controller
        .start(&cli.args)
        .await
        .with_context(|| format!("Starting streamer '{}'", cli.streamer))?;

    let deadline = cli
        .duration
        .map(|secs| tokio::time::Instant::now() + Duration::from_secs_f64(secs));
    let mut tick = tokio::time::interval(settings.poll_interval());
    let mut polls = 0u64;
    let mut merged = 0usize;
    let mut computed = 0usize;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted");
                break;
            }
            _ = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            } => {
                log::info!("Duration elapsed");
                break;
            }
            _ = tick.tick() => {
                let summary = controller.poll();
                polls += 1;
                merged += summary.samples_merged;
                computed += summary.samples_computed;
                log::debug!("Poll {}: {:?}", polls, summary);

                if let Some(count) = summary.notifications.filter(|&c| c > 0) {
                    log::warn!("{} notifications from '{}'", count, cli.streamer);
                }
                if summary.closed || !summary.running {
                    log::info!("Streamer '{}' finished", cli.streamer);
                    break;
                }
            }
        }
    }

    controller.shutdown().await?;
    let last = controller.poll();
    merged += last.samples_merged;
    computed += last.samples_computed;

    let report = RunSummary {
        session: controller.id.clone(),
        streamer: cli.streamer.clone(),
        polls,
        samples_merged: merged,
        samples_computed: computed,
        channels: summarize_channels(controller.data()),
    };
    let json = serde_json::to_string_pretty(&report)?;
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(json.as_bytes())
        .and_then(|_| handle.write_all(b"\n"))
        .context("Writing summary to stdout")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    run(cli).await
}
