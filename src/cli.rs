use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "seriesflow",
    version,
    about = "Stream live time-series data and compute derived channels",
    long_about = "Runs one streamer, buffers its channels for a bounded time window and\n\
                  applies a transform pipeline to them. Prints a channel summary on exit."
)]
pub struct Cli {
    /// Streamer to run (dummy, udp, csv_replay)
    #[arg(long, default_value = "dummy")]
    pub streamer: String,

    /// Streamer argument as key=value; repeat for several
    #[arg(long = "arg", value_name = "KEY=VALUE")]
    pub args: Vec<String>,

    /// JSON file describing the transform pipeline
    #[arg(long)]
    pub pipeline: Option<PathBuf>,

    /// Buffer size in seconds (minimum 10)
    #[arg(long, env = "SERIESFLOW_BUFFER_SIZE")]
    pub buffer_size: Option<f64>,

    /// Stop after this many seconds; runs until Ctrl-C otherwise
    #[arg(long)]
    pub duration: Option<f64>,

    /// List streamers and transforms, then exit
    #[arg(long)]
    pub list: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
