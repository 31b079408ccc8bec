use chrono::{DateTime, NaiveDateTime};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum LogType {
    Gesture,
    UnknownSighting,
    #[default]
    Unknown,
    Other(String),
}

impl LogType {
    pub fn as_str(&self) -> &str {
        match self {
            LogType::Gesture => "gesture",
            LogType::UnknownSighting => "unknown_sighting",
            LogType::Unknown => "",
            LogType::Other(other) => other,
        }
    }
}

impl From<&str> for LogType {
    fn from(value: &str) -> Self {
        match value {
            "gesture" => LogType::Gesture,
            "unknown_sighting" => LogType::UnknownSighting,
            "" => LogType::Unknown,
            other => LogType::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LogType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LogType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(LogType::from(value.as_str()))
    }
}

/// One record of the `logs` collection, written by the recognition side.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LogEntry {
    /// As written by the producer: "date time" text, or epoch millis
    /// when a writer let the server fill it in.
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub action: String,
    #[serde(rename = "type", default)]
    pub log_type: LogType,
}

fn deserialize_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!("invalid log timestamp: {}", other))),
    }
}

impl LogEntry {
    pub const TIMESTAMP_FORMAT: &'static str = "%Y-%m-%d %H:%M:%S";

    /// The timestamp as written by the producer ("date time"), if it parses.
    pub fn parsed_timestamp(&self) -> Option<NaiveDateTime> {
        let timestamp = self.timestamp.trim();
        if let Ok(millis) = timestamp.parse::<i64>() {
            return DateTime::from_timestamp_millis(millis).map(|ts| ts.naive_utc());
        }
        NaiveDateTime::parse_from_str(timestamp, Self::TIMESTAMP_FORMAT).ok()
    }
}
