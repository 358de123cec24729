// Common types for the streaming module

use crate::series::DataError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for streaming operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors that can occur during streaming operations
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Streamer already running")]
    AlreadyRunning,

    #[error("Network error: {0}")]
    Network(String),

    #[error("No parser available for encoding '{0}'")]
    NoParser(String),

    #[error("Data error: {0}")]
    Data(#[from] DataError),
}

/// Lifecycle state of a streamer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl StreamState {
    /// Whether a producer task may be alive in this state
    pub fn is_active(&self) -> bool {
        !matches!(self, StreamState::Stopped)
    }
}

/// One-way notifications from a streamer to its consumer.
///
/// Events are queued on a channel and drained by the consumer; nothing is
/// invoked on the producer's task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamerEvent {
    /// Every buffered sample of the streamer was discarded
    BuffersCleared,
    /// All channels of `group` were removed
    GroupRemoved { group: String },
    /// New samples were written
    DataReceived,
    /// The source ended; no more data will arrive
    Closed,
    RunStatusChanged { streamer: String, running: bool },
    NotificationsChanged { count: usize },
}

/// Counters kept for a streaming session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamStats {
    pub batches_written: u64,
    pub batches_refused: u64,
    pub parse_errors: u64,
}
