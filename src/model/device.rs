use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::{
    collections::BTreeMap,
    fmt,
    ops::{Deref, DerefMut},
};

/// Wire value of the `gesture` field when no gesture is bound to a device.
pub const GESTURE_NOT_ASSIGNED: &str = "No Asignado";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum DeviceType {
    #[default]
    Led,
    Servo,
    Lcd,
    Other(String),
}

impl DeviceType {
    pub fn as_str(&self) -> &str {
        match self {
            DeviceType::Led => "led",
            DeviceType::Servo => "servo",
            DeviceType::Lcd => "lcd",
            DeviceType::Other(other) => other,
        }
    }

    /// Servo-like devices report open/closed instead of on/off.
    pub fn is_servo_like(&self) -> bool {
        matches!(self, DeviceType::Servo)
    }
}

impl From<&str> for DeviceType {
    fn from(value: &str) -> Self {
        match value {
            "led" => DeviceType::Led,
            "servo" => DeviceType::Servo,
            "lcd" => DeviceType::Lcd,
            other => DeviceType::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DeviceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DeviceType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(DeviceType::from(value.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServoParams {
    #[serde(default)]
    pub angle_open: i32,
    #[serde(default)]
    pub angle_closed: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LcdParams {
    #[serde(default)]
    pub i2c_address: String,
    #[serde(default)]
    pub line1_on: String,
    #[serde(default)]
    pub line2_on: String,
    #[serde(default)]
    pub line1_off: String,
    #[serde(default)]
    pub line2_off: String,
}

/// Type specific device parameters, keyed by [`DeviceType`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceParams {
    Servo(ServoParams),
    Lcd(LcdParams),
    #[default]
    None,
}

impl DeviceParams {
    /// Reads the `params` object of a device record for the given type.
    ///
    /// Unknown or malformed fields fall back to their defaults; types
    /// without parameters ignore whatever is stored.
    pub fn from_value(device_type: &DeviceType, value: Option<&Value>) -> Self {
        let value = match value {
            Some(v) if v.is_object() => v.clone(),
            _ => Value::Object(Map::new()),
        };
        match device_type {
            DeviceType::Servo => match serde_json::from_value::<ServoParams>(value) {
                Ok(params) => DeviceParams::Servo(params),
                Err(err) => {
                    log::warn!("Invalid servo params, using defaults: {}", err);
                    DeviceParams::Servo(ServoParams::default())
                }
            },
            DeviceType::Lcd => match serde_json::from_value::<LcdParams>(value) {
                Ok(params) => DeviceParams::Lcd(params),
                Err(err) => {
                    log::warn!("Invalid lcd params, using defaults: {}", err);
                    DeviceParams::Lcd(LcdParams::default())
                }
            },
            _ => DeviceParams::None,
        }
    }

    pub fn to_value(&self) -> Value {
        let value = match self {
            DeviceParams::Servo(params) => serde_json::to_value(params),
            DeviceParams::Lcd(params) => serde_json::to_value(params),
            DeviceParams::None => return Value::Object(Map::new()),
        };
        value.unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

/// A device record as it is stored under `devices/<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state_key: String,
    #[serde(rename = "type", default)]
    pub device_type: DeviceType,
    #[serde(default, deserialize_with = "deserialize_pin")]
    pub pin: u32,
    #[serde(default = "default_gesture")]
    pub gesture: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i2c_address: Option<String>,
}

fn default_gesture() -> String {
    GESTURE_NOT_ASSIGNED.to_owned()
}

// Pins come either as numbers or as the string value of a dropdown.
fn deserialize_pin<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| de::Error::custom(format!("invalid pin number: {}", n))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid pin: {}", s))),
        Value::Null => Ok(0),
        other => Err(de::Error::custom(format!("invalid pin: {}", other))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub state_key: String,
    pub device_type: DeviceType,
    pub pin: u32,
    pub gesture: Option<String>,
    pub params: DeviceParams,
}

impl Device {
    pub fn from_record(id: impl Into<String>, record: DeviceRecord) -> Self {
        let mut params = DeviceParams::from_value(&record.device_type, Some(&record.params));
        // older records keep the lcd address next to the params
        if let (DeviceParams::Lcd(lcd), Some(address)) = (&mut params, record.i2c_address) {
            if lcd.i2c_address.is_empty() {
                lcd.i2c_address = address;
            }
        }
        let gesture = match record.gesture.as_str() {
            "" | GESTURE_NOT_ASSIGNED => None,
            _ => Some(record.gesture),
        };
        Self {
            id: id.into(),
            name: record.name,
            state_key: record.state_key,
            device_type: record.device_type,
            pin: record.pin,
            gesture,
            params,
        }
    }

    pub fn from_value(id: impl Into<String>, value: &Value) -> Result<Self, serde_json::Error> {
        let record = DeviceRecord::deserialize(value)?;
        Ok(Self::from_record(id, record))
    }

    pub fn to_record(&self) -> DeviceRecord {
        DeviceRecord {
            name: self.name.clone(),
            state_key: self.state_key.clone(),
            device_type: self.device_type.clone(),
            pin: self.pin,
            gesture: self.gesture_label().to_owned(),
            params: self.params.to_value(),
            i2c_address: self.i2c_address().map(str::to_owned),
        }
    }

    pub fn gesture_label(&self) -> &str {
        self.gesture.as_deref().unwrap_or(GESTURE_NOT_ASSIGNED)
    }

    pub fn i2c_address(&self) -> Option<&str> {
        match &self.params {
            DeviceParams::Lcd(lcd) => Some(lcd.i2c_address.as_str()),
            _ => None,
        }
    }

    pub fn has_state_key(&self) -> bool {
        !self.state_key.is_empty()
    }
}

/// All configured devices, ordered by device id.
#[derive(Default, Clone, Debug, PartialEq)]
pub struct DeviceRegistry(BTreeMap<String, Device>);

impl Deref for DeviceRegistry {
    type Target = BTreeMap<String, Device>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for DeviceRegistry {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry from the full value of the `devices` collection.
    /// Records that cannot be read are skipped.
    pub fn from_snapshot(value: Option<&Value>) -> Self {
        let mut registry = Self::new();
        let Some(Value::Object(map)) = value else {
            return registry;
        };
        for (id, record) in map {
            match Device::from_value(id.as_str(), record) {
                Ok(device) => {
                    registry.0.insert(id.clone(), device);
                }
                Err(err) => log::warn!("Skipping malformed device record [{}]: {}", id, err),
            }
        }
        registry
    }

    pub fn find_by_state_key(&self, state_key: &str) -> Option<&Device> {
        self.0.values().find(|device| device.state_key == state_key)
    }
}
