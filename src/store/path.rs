use std::fmt;

use super::StoreError;

pub const STATUS: &str = "status";
pub const COMMANDS: &str = "commands";
pub const DEVICES: &str = "devices";
pub const AVAILABLE_GESTURES: &str = "available_gestures";
pub const AVAILABLE_PINS: &str = "available_pins";
pub const LOGS: &str = "logs";

/// Logical locations inside the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorePath {
    Status,
    StatusEntry(String),
    Commands,
    Devices,
    Device(String),
    AvailableGestures,
    AvailablePins,
    Logs,
}

impl StorePath {
    pub fn collection(&self) -> &'static str {
        match self {
            StorePath::Status | StorePath::StatusEntry(_) => STATUS,
            StorePath::Commands => COMMANDS,
            StorePath::Devices | StorePath::Device(_) => DEVICES,
            StorePath::AvailableGestures => AVAILABLE_GESTURES,
            StorePath::AvailablePins => AVAILABLE_PINS,
            StorePath::Logs => LOGS,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            StorePath::StatusEntry(key) | StorePath::Device(key) => Some(key),
            _ => None,
        }
    }

    pub fn segments(&self) -> Vec<&str> {
        match self.key() {
            Some(key) => vec![self.collection(), key],
            None => vec![self.collection()],
        }
    }

    /// Collections that take appended children with generated keys.
    pub fn is_append_only(&self) -> bool {
        matches!(self, StorePath::Commands | StorePath::Logs)
    }

    /// Checks that a key can address a single child: not empty and free of
    /// characters the store uses for paths or patterns.
    pub fn validate(&self) -> Result<(), StoreError> {
        match self.key() {
            Some(key) if key.is_empty() => {
                Err(StoreError::InvalidPath(format!("{}/<empty key>", self.collection())))
            }
            Some(key) if key.contains(['/', '.', '#', '$', '[', ']', '+']) => {
                Err(StoreError::InvalidPath(self.to_string()))
            }
            _ => Ok(()),
        }
    }

    pub fn parse(path: &str) -> Result<Self, StoreError> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let parsed = match segments.as_slice() {
            [STATUS] => StorePath::Status,
            [STATUS, key] => StorePath::StatusEntry((*key).to_owned()),
            [COMMANDS] => StorePath::Commands,
            [DEVICES] => StorePath::Devices,
            [DEVICES, id] => StorePath::Device((*id).to_owned()),
            [AVAILABLE_GESTURES] => StorePath::AvailableGestures,
            [AVAILABLE_PINS] => StorePath::AvailablePins,
            [LOGS] => StorePath::Logs,
            _ => return Err(StoreError::InvalidPath(path.to_owned())),
        };
        parsed.validate()?;
        Ok(parsed)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments().join("/"))
    }
}
