// Start argument parsing
//
// Streamers receive opaque `key=value` strings from the host. Values that
// read as JSON scalars or arrays (`42`, `0.5`, `true`, `[1,2]`) keep that
// type, everything else is taken as a string. The resulting object is
// deserialized into the streamer's typed config.

use crate::streaming::types::{StreamError, StreamResult};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Parse `key=value` arguments into `T`.
///
/// Later occurrences of a key override earlier ones. Keys absent from the
/// arguments fall back to `T`'s serde defaults.
pub fn parse_args<T: DeserializeOwned>(args: &[String]) -> StreamResult<T> {
    let mut object = Map::new();
    for arg in args {
        let (key, raw) = arg
            .split_once('=')
            .ok_or_else(|| StreamError::InvalidConfig(format!("Expected key=value, got '{}'", arg)))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(StreamError::InvalidConfig(format!(
                "Missing key in argument '{}'",
                arg
            )));
        }
        object.insert(key.to_string(), parse_value(raw.trim()));
    }

    serde_json::from_value(Value::Object(object))
        .map_err(|e| StreamError::InvalidConfig(e.to_string()))
}

fn parse_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Number(_) | Value::Bool(_) | Value::Array(_))) => value,
        _ => Value::String(raw.to_string()),
    }
}
