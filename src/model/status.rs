use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fmt,
    ops::{Deref, DerefMut},
};

use crate::DeviceType;

/// Key of the authorization flag inside the `status` collection.
pub const AUTHORIZED_KEY: &str = "isAuthorized";
/// Key of the recognized user inside the `status` collection.
pub const CURRENT_USER_KEY: &str = "currentUser";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum StatusValue {
    On,
    #[default]
    Off,
    Abierto,
    Cerrado,
    Other(String),
}

impl StatusValue {
    pub fn as_str(&self) -> &str {
        match self {
            StatusValue::On => "ON",
            StatusValue::Off => "OFF",
            StatusValue::Abierto => "ABIERTO",
            StatusValue::Cerrado => "CERRADO",
            StatusValue::Other(other) => other,
        }
    }

    /// Value a status entry starts with when its device is created.
    pub fn default_for(device_type: &DeviceType) -> Self {
        if device_type.is_servo_like() {
            StatusValue::Cerrado
        } else {
            StatusValue::Off
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, StatusValue::On)
    }

    pub fn is_open(&self) -> bool {
        matches!(self, StatusValue::Abierto)
    }
}

impl From<&str> for StatusValue {
    fn from(value: &str) -> Self {
        match value {
            "ON" => StatusValue::On,
            "OFF" => StatusValue::Off,
            "ABIERTO" => StatusValue::Abierto,
            "CERRADO" => StatusValue::Cerrado,
            other => StatusValue::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for StatusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for StatusValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StatusValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(StatusValue::from(value.as_str()))
    }
}

/// Set externally by the face/gesture recognition, read-only for the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthorizationFlag {
    #[serde(rename = "isAuthorized", default)]
    pub is_authorized: bool,
    #[serde(rename = "currentUser", default)]
    pub current_user: String,
}

/// Current state per status key.
#[derive(Default, Clone, Debug, PartialEq)]
pub struct StatusTable(BTreeMap<String, StatusValue>);

impl Deref for StatusTable {
    type Target = BTreeMap<String, StatusValue>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for StatusTable {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl StatusTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits the full value of the `status` collection into the status
    /// entries and the authorization flag. Non string entries are ignored.
    pub fn from_snapshot(value: Option<&Value>) -> (Self, AuthorizationFlag) {
        let mut table = Self::new();
        let mut flag = AuthorizationFlag::default();
        let Some(Value::Object(map)) = value else {
            return (table, flag);
        };
        for (key, entry) in map {
            match (key.as_str(), entry) {
                (AUTHORIZED_KEY, Value::Bool(authorized)) => flag.is_authorized = *authorized,
                (AUTHORIZED_KEY, _) => {
                    log::warn!("Ignoring non boolean {} value: {}", AUTHORIZED_KEY, entry)
                }
                (CURRENT_USER_KEY, Value::String(user)) => flag.current_user = user.clone(),
                (CURRENT_USER_KEY, _) => {}
                (_, Value::String(state)) => {
                    table.0.insert(key.clone(), StatusValue::from(state.as_str()));
                }
                _ => log::debug!("Ignoring status entry [{}]: {}", key, entry),
            }
        }
        (table, flag)
    }

    /// Current value for a status key, `OFF` when the entry is missing.
    pub fn value_for(&self, state_key: &str) -> StatusValue {
        self.0.get(state_key).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_snapshot_split() {
        let (table, flag) = StatusTable::from_snapshot(Some(&json!({
            "isAuthorized": true,
            "currentUser": "Ana",
            "ledLiving": "ON",
            "porton": "ABIERTO",
            "counter": 3
        })));
        assert!(flag.is_authorized);
        assert_eq!(flag.current_user, "Ana");
        assert_eq!(table.len(), 2);
        assert_eq!(table.value_for("porton"), StatusValue::Abierto);
        assert_eq!(table.value_for("missing"), StatusValue::Off);
    }

    #[test]
    fn test_empty_snapshot() {
        let (table, flag) = StatusTable::from_snapshot(None);
        assert!(table.is_empty());
        assert_eq!(flag, AuthorizationFlag::default());
    }

    #[test]
    fn test_default_for_type() {
        assert_eq!(StatusValue::default_for(&DeviceType::Servo), StatusValue::Cerrado);
        assert_eq!(StatusValue::default_for(&DeviceType::Lcd), StatusValue::Off);
        assert_eq!(
            StatusValue::default_for(&DeviceType::Other("relay".into())),
            StatusValue::Off
        );
    }
}
