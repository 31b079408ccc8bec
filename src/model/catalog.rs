use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::HashSet, ops::Deref};

/// Gesture names offered in the editor, in store order without duplicates.
///
/// The store keeps them either as an array or as a map whose values are the names.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct GestureCatalog(Vec<String>);

impl Deref for GestureCatalog {
    type Target = Vec<String>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl GestureCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(value: Option<&Value>) -> Self {
        let names: Box<dyn Iterator<Item = &Value> + '_> = match value {
            Some(Value::Array(list)) => Box::new(list.iter()),
            Some(Value::Object(map)) => Box::new(map.values()),
            _ => return Self::new(),
        };
        let mut seen = HashSet::new();
        Self(
            names
                .filter_map(Value::as_str)
                .filter(|name| !name.is_empty() && seen.insert(*name))
                .map(str::to_owned)
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinOption {
    pub name: String,
    pub pin: u32,
}

/// Named hardware pins, ordered by pin number.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct PinCatalog(Vec<PinOption>);

impl Deref for PinCatalog {
    type Target = Vec<PinOption>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PinCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(value: Option<&Value>) -> Self {
        let Some(Value::Object(map)) = value else {
            return Self::new();
        };
        let mut pins: Vec<PinOption> = map
            .iter()
            .filter_map(|(name, pin)| {
                let pin = match pin {
                    Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
                    Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                };
                if pin.is_none() {
                    log::debug!("Ignoring pin [{}] without a valid number", name);
                }
                pin.map(|pin| PinOption {
                    name: name.clone(),
                    pin,
                })
            })
            .collect();
        pins.sort_by(|a, b| a.pin.cmp(&b.pin).then_with(|| a.name.cmp(&b.name)));
        Self(pins)
    }

    pub fn name_of(&self, pin: u32) -> Option<&str> {
        self.0
            .iter()
            .find(|option| option.pin == pin)
            .map(|option| option.name.as_str())
    }
}
