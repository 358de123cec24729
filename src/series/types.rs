// Common types for the series module

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for series collection operations
pub type DataResult<T> = Result<T, DataError>;

/// Errors raised while wiring channels into a series collection
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataError {
    #[error("Channel '{name}' already exists as {existing} series, cannot use it as {requested}")]
    KindConflict {
        name: String,
        existing: SeriesKind,
        requested: SeriesKind,
    },

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),
}

/// Value kind stored by a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    Numeric,
    Text,
    Structured,
}

impl std::fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeriesKind::Numeric => write!(f, "numeric"),
            SeriesKind::Text => write!(f, "text"),
            SeriesKind::Structured => write!(f, "structured"),
        }
    }
}

/// A value written by a producer, tagged with its kind
#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    Numeric(f64),
    Text(String),
    Structured(serde_json::Value),
}

impl SampleValue {
    pub fn kind(&self) -> SeriesKind {
        match self {
            SampleValue::Numeric(_) => SeriesKind::Numeric,
            SampleValue::Text(_) => SeriesKind::Text,
            SampleValue::Structured(_) => SeriesKind::Structured,
        }
    }
}

impl From<f64> for SampleValue {
    fn from(value: f64) -> Self {
        SampleValue::Numeric(value)
    }
}

impl From<String> for SampleValue {
    fn from(value: String) -> Self {
        SampleValue::Text(value)
    }
}

impl From<&str> for SampleValue {
    fn from(value: &str) -> Self {
        SampleValue::Text(value.to_string())
    }
}
