// Message parsers
//
// Decode raw payloads received by a streamer into samples of a series
// collection. Parsers are looked up by encoding name in a `ParserFactory`
// that the host hands to streamers; a streamer without a factory has no
// parsing capability.

use crate::series::{DataError, PlotDataMap, SampleValue, SeriesKind};
use crate::streaming::types::{StreamError, StreamResult};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Settings a streamer passes when it creates a parser
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParserOptions {
    /// Prepended to every channel name; also used as the channel group
    pub prefix: String,
    /// Field carrying the sample timestamp in seconds
    pub timestamp_field: Option<String>,
}

impl ParserOptions {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            timestamp_field: None,
        }
    }

    pub fn with_timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = Some(field.into());
        self
    }
}

/// Decodes one message into channels of a collection
pub trait MessageParser: Send {
    fn encoding(&self) -> &str;

    /// Write the samples found in `payload` into `map`.
    ///
    /// `timestamp` is the receive time, used unless the message carries its
    /// own. Returns the number of samples written.
    fn parse_message(
        &mut self,
        payload: &[u8],
        timestamp: f64,
        map: &mut PlotDataMap,
    ) -> StreamResult<usize>;
}

pub type ParserConstructor = Box<dyn Fn(&ParserOptions) -> Box<dyn MessageParser> + Send + Sync>;

/// Factory for creating parsers by encoding name
#[derive(Default)]
pub struct ParserFactory {
    constructors: BTreeMap<String, ParserConstructor>,
}

impl ParserFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory with the `json` parser registered
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        factory.register(JsonParser::ENCODING, |options| {
            Box::new(JsonParser::new(options.clone()))
        });
        factory
    }

    pub fn register<F>(&mut self, encoding: impl Into<String>, constructor: F)
    where
        F: Fn(&ParserOptions) -> Box<dyn MessageParser> + Send + Sync + 'static,
    {
        let encoding = encoding.into();
        if self
            .constructors
            .insert(encoding.clone(), Box::new(constructor))
            .is_some()
        {
            log::warn!("Parser for '{}' registered twice, replacing previous", encoding);
        }
    }

    pub fn create(
        &self,
        encoding: &str,
        options: &ParserOptions,
    ) -> StreamResult<Box<dyn MessageParser>> {
        self.constructors
            .get(encoding)
            .map(|constructor| constructor(options))
            .ok_or_else(|| StreamError::NoParser(encoding.to_string()))
    }

    pub fn contains(&self, encoding: &str) -> bool {
        self.constructors.contains_key(encoding)
    }

    pub fn encodings(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl std::fmt::Debug for ParserFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserFactory")
            .field("encodings", &self.encodings())
            .finish()
    }
}

/// Flattens a JSON object into one channel per leaf.
///
/// `{"imu": {"acc": [1.0, 2.0]}, "mode": "auto"}` with prefix `udp` yields
/// `udp/imu/acc/0`, `udp/imu/acc/1` (numeric) and `udp/mode` (text). Booleans
/// become 0/1, nulls are ignored.
#[derive(Debug, Clone)]
pub struct JsonParser {
    options: ParserOptions,
}

impl JsonParser {
    pub const ENCODING: &'static str = "json";

    pub fn new(options: ParserOptions) -> Self {
        Self { options }
    }

    fn channel_name(&self, path: &str) -> String {
        if self.options.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.options.prefix, path)
        }
    }

    fn group(&self) -> Option<&str> {
        (!self.options.prefix.is_empty()).then_some(self.options.prefix.as_str())
    }

    /// Collect one `(channel, value)` pair per leaf of `value`
    fn flatten(&self, path: String, value: &Value, leaves: &mut Vec<(String, SampleValue)>) {
        let sample = match value {
            Value::Null => return,
            Value::Bool(b) => SampleValue::Numeric(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => match n.as_f64() {
                Some(v) => SampleValue::Numeric(v),
                None => return,
            },
            Value::String(s) => SampleValue::Text(s.clone()),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.flatten(join(&path, &i.to_string()), item, leaves);
                }
                return;
            }
            Value::Object(fields) => {
                for (key, item) in fields {
                    self.flatten(join(&path, key), item, leaves);
                }
                return;
            }
        };
        leaves.push((self.channel_name(&path), sample));
    }
}

/// Reject the message if any leaf would change the kind of a channel
fn check_kinds(leaves: &[(String, SampleValue)], map: &PlotDataMap) -> StreamResult<()> {
    let mut seen: HashMap<&str, SeriesKind> = HashMap::new();
    for (name, value) in leaves {
        let requested = value.kind();
        let existing = map
            .kind_of(name)
            .or_else(|| seen.get(name.as_str()).copied());
        if let Some(existing) = existing.filter(|&kind| kind != requested) {
            return Err(DataError::KindConflict {
                name: name.clone(),
                existing,
                requested,
            }
            .into());
        }
        seen.insert(name.as_str(), requested);
    }
    Ok(())
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", path, key)
    }
}

impl MessageParser for JsonParser {
    fn encoding(&self) -> &str {
        Self::ENCODING
    }

    fn parse_message(
        &mut self,
        payload: &[u8],
        timestamp: f64,
        map: &mut PlotDataMap,
    ) -> StreamResult<usize> {
        let mut message: Value = serde_json::from_slice(payload)
            .map_err(|e| StreamError::Parse(format!("Invalid JSON message: {}", e)))?;

        let Some(fields) = message.as_object_mut() else {
            return Err(StreamError::Parse(
                "JSON message must be an object".to_string(),
            ));
        };

        let mut timestamp = timestamp;
        if let Some(field) = &self.options.timestamp_field {
            match fields.remove(field) {
                Some(Value::Number(n)) => {
                    timestamp = n.as_f64().unwrap_or(timestamp);
                }
                Some(other) => {
                    return Err(StreamError::Parse(format!(
                        "Timestamp field '{}' is not a number: {}",
                        field, other
                    )));
                }
                None => {}
            }
        }

        // All or nothing: a conflicting leaf leaves the collection untouched
        let mut leaves = Vec::new();
        self.flatten(String::new(), &message, &mut leaves);
        check_kinds(&leaves, map)?;

        let group = self.group().map(str::to_string);
        let mut written = 0;
        for (name, sample) in leaves {
            if map.add_sample(&name, group.as_deref(), timestamp, sample)? {
                written += 1;
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::SeriesKind;

    fn parse(parser: &mut JsonParser, payload: &str, map: &mut PlotDataMap) -> StreamResult<usize> {
        parser.parse_message(payload.as_bytes(), 10.0, map)
    }

    #[test]
    fn test_flatten_nested_object() {
        let mut parser = JsonParser::new(ParserOptions::new("udp"));
        let mut map = PlotDataMap::new();
        let written = parse(
            &mut parser,
            r#"{"imu": {"acc": [1.0, 2.5]}, "mode": "auto", "armed": true, "x": null}"#,
            &mut map,
        )
        .unwrap();

        assert_eq!(written, 4);
        assert_eq!(map.numeric("udp/imu/acc/1").unwrap().back().unwrap().value, 2.5);
        assert_eq!(map.numeric("udp/armed").unwrap().back().unwrap().value, 1.0);
        assert_eq!(map.kind_of("udp/mode"), Some(SeriesKind::Text));
        assert_eq!(map.numeric("udp/imu/acc/0").unwrap().group(), Some("udp"));
        assert!(map.kind_of("udp/x").is_none());
    }

    #[test]
    fn test_timestamp_field_overrides_receive_time() {
        let mut parser =
            JsonParser::new(ParserOptions::new("").with_timestamp_field("stamp"));
        let mut map = PlotDataMap::new();
        parse(&mut parser, r#"{"stamp": 3.5, "v": 1}"#, &mut map).unwrap();

        let series = map.numeric("v").unwrap();
        assert_eq!(series.back().unwrap().timestamp, 3.5);
        assert!(map.numeric("stamp").is_none());
    }

    #[test]
    fn test_invalid_messages() {
        let mut parser = JsonParser::new(ParserOptions::new("p"));
        let mut map = PlotDataMap::new();
        assert!(matches!(
            parse(&mut parser, "not json", &mut map),
            Err(StreamError::Parse(_))
        ));
        assert!(matches!(
            parse(&mut parser, "[1, 2]", &mut map),
            Err(StreamError::Parse(_))
        ));
    }

    #[test]
    fn test_kind_conflict_reported() {
        let mut parser = JsonParser::new(ParserOptions::new(""));
        let mut map = PlotDataMap::new();
        parse(&mut parser, r#"{"v": 1}"#, &mut map).unwrap();
        assert!(matches!(
            parse(&mut parser, r#"{"v": "text"}"#, &mut map),
            Err(StreamError::Data(_))
        ));
    }

    #[test]
    fn test_conflicting_message_writes_nothing() {
        let mut parser = JsonParser::new(ParserOptions::new(""));
        let mut map = PlotDataMap::new();
        parse(&mut parser, r#"{"v": 1}"#, &mut map).unwrap();

        let result = parse(&mut parser, r#"{"a": 5, "v": "text"}"#, &mut map);
        assert!(matches!(result, Err(StreamError::Data(_))));
        assert!(map.kind_of("a").is_none());
        assert_eq!(map.numeric("v").unwrap().len(), 1);
    }

    #[test]
    fn test_conflict_within_one_message() {
        let mut parser = JsonParser::new(ParserOptions::new(""));
        let mut map = PlotDataMap::new();
        let result = parse(&mut parser, r#"{"a": [1], "a/0": "x", "b": 2}"#, &mut map);
        assert!(matches!(result, Err(StreamError::Data(_))));
        assert!(map.is_empty());
    }

    #[test]
    fn test_factory() {
        let factory = ParserFactory::with_builtins();
        assert_eq!(factory.encodings(), vec!["json"]);
        assert!(factory.create("json", &ParserOptions::default()).is_ok());
        assert!(matches!(
            factory.create("protobuf", &ParserOptions::default()),
            Err(StreamError::NoParser(_))
        ));
        assert!(ParserFactory::new().is_empty());
    }
}
