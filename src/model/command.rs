use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Marker the store replaces with its own clock when the value is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerValue {
    #[serde(rename = ".sv")]
    pub sv: String,
}

impl ServerValue {
    pub fn timestamp() -> Self {
        Self {
            sv: "timestamp".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandTimestamp {
    Server(ServerValue),
    Millis(i64),
}

/// Request for the external actuator to toggle the state behind `device_key`.
///
/// Commands are only ever appended, the dashboard never reads them back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "deviceKey")]
    pub device_key: String,
    pub timestamp: CommandTimestamp,
}

impl Command {
    pub fn toggle(device_key: impl Into<String>) -> Self {
        Self {
            device_key: device_key.into(),
            timestamp: CommandTimestamp::Server(ServerValue::timestamp()),
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
