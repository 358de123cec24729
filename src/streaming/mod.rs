// Live data streaming module
//
// Streamers run one producer task each and write into a shared series
// collection; the host drains their events and merges their data.
//
// Architecture:
// - `streamer`: Plugin contract, shared base state and the producer context
// - `source`: Concrete streamers (dummy, udp, csv_replay)
// - `parser`: Message parsers looked up by encoding
// - `args`: `key=value` start argument parsing
// - `controller`: Consumer side, merging data and running transforms

pub mod args;
pub mod controller;
pub mod parser;
pub mod source;
pub mod streamer;
pub mod types;

pub use args::parse_args;
pub use controller::{PollSummary, StreamController};
pub use parser::{JsonParser, MessageParser, ParserFactory, ParserOptions};
pub use source::{available_streamers, create_streamer};
pub use streamer::{DataStreamer, NotificationAction, StreamerBase, StreamerContext, StreamerEvents};
pub use types::{StreamError, StreamResult, StreamState, StreamStats, StreamerEvent};
