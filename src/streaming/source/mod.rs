// Pluggable streamer implementations
//
// New streamers are added by:
// 1. Implementing the DataStreamer trait on top of StreamerBase
// 2. Registering the name in `create_streamer` and `available_streamers`
//
// Current implementations:
// - dummy: synthetic signals, orientation quaternion and status text
// - udp: datagrams decoded by a registered message parser
// - csv_replay: rows of a CSV file replayed at a fixed rate

mod dummy;
mod file;
mod udp;

use crate::streaming::streamer::DataStreamer;
use crate::streaming::types::{StreamError, StreamResult};

pub use dummy::{DummyConfig, DummyStreamer, DUMMY_STREAMER};
pub use file::{CsvReplayConfig, CsvReplayStreamer, CSV_REPLAY_STREAMER};
pub use udp::{UdpConfig, UdpStreamer, UDP_STREAMER};

/// Create a stopped streamer by name
pub fn create_streamer(name: &str) -> StreamResult<Box<dyn DataStreamer>> {
    match name {
        DUMMY_STREAMER => Ok(Box::new(DummyStreamer::new())),
        UDP_STREAMER => Ok(Box::new(UdpStreamer::new())),
        CSV_REPLAY_STREAMER => Ok(Box::new(CsvReplayStreamer::new())),
        _ => Err(StreamError::InvalidConfig(format!(
            "Unknown streamer '{}', expected one of: {}",
            name,
            available_streamers().join(", ")
        ))),
    }
}

/// Names accepted by [`create_streamer`]
pub fn available_streamers() -> Vec<&'static str> {
    vec![DUMMY_STREAMER, UDP_STREAMER, CSV_REPLAY_STREAMER]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_known_streamers() {
        for name in available_streamers() {
            let streamer = create_streamer(name).unwrap();
            assert_eq!(streamer.name(), name);
            assert!(!streamer.is_running());
        }
    }

    #[test]
    fn test_unknown_streamer() {
        assert!(matches!(
            create_streamer("serial"),
            Err(StreamError::InvalidConfig(_))
        ));
    }
}
