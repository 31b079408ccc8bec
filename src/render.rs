use crate::{
    AppData, AuthorizationFlag, DeviceType, PinOption, StatusValue, GESTURE_NOT_ASSIGNED,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardStyle {
    On,
    Off,
    Open,
    Closed,
}

impl CardStyle {
    pub fn css_class(&self) -> &'static str {
        match self {
            CardStyle::On => "state-on",
            CardStyle::Off => "state-off",
            CardStyle::Open => "state-open",
            CardStyle::Closed => "state-closed",
        }
    }
}

/// Servo-like devices are open only on `ABIERTO`, everything else is on only on `ON`.
pub fn card_style(device_type: &DeviceType, state: &StatusValue) -> CardStyle {
    match (device_type.is_servo_like(), state) {
        (true, state) if state.is_open() => CardStyle::Open,
        (true, _) => CardStyle::Closed,
        (false, state) if state.is_on() => CardStyle::On,
        (false, _) => CardStyle::Off,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCard {
    pub device_id: String,
    pub name: String,
    pub state_key: String,
    pub device_type: DeviceType,
    pub pin: u32,
    pub pin_name: Option<String>,
    pub gesture: String,
    pub state: StatusValue,
    pub style: CardStyle,
}

/// One card per device with a status key, in device id order.
pub fn render_cards(data: &AppData) -> Vec<DeviceCard> {
    data.devices
        .values()
        .filter(|device| device.has_state_key())
        .map(|device| {
            let state = data.status.value_for(&device.state_key);
            DeviceCard {
                device_id: device.id.clone(),
                name: device.name.clone(),
                state_key: device.state_key.clone(),
                device_type: device.device_type.clone(),
                pin: device.pin,
                pin_name: data.pins.name_of(device.pin).map(str::to_owned),
                gesture: device.gesture_label().to_owned(),
                style: card_style(&device.device_type, &state),
                state,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub authorized: bool,
    pub text: String,
    pub css_class: &'static str,
}

pub fn render_banner(flag: &AuthorizationFlag) -> Banner {
    if flag.is_authorized {
        Banner {
            authorized: true,
            text: format!("Autorizado: {} (gestos activos)", flag.current_user),
            css_class: "authorized",
        }
    } else {
        Banner {
            authorized: false,
            text: "Modo remoto (gestos inactivos)".to_owned(),
            css_class: "unauthorized",
        }
    }
}

/// Dropdown contents for the device editor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EditorOptions {
    pub gestures: Vec<String>,
    pub pins: Vec<PinOption>,
}

pub fn render_editor_options(data: &AppData) -> EditorOptions {
    let mut gestures = vec![GESTURE_NOT_ASSIGNED.to_owned()];
    gestures.extend(
        data.gestures
            .iter()
            .filter(|gesture| gesture.as_str() != GESTURE_NOT_ASSIGNED)
            .cloned(),
    );
    EditorOptions {
        gestures,
        pins: data.pins.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_style_table() {
        let servo = DeviceType::Servo;
        let led = DeviceType::Led;
        assert_eq!(card_style(&servo, &StatusValue::Abierto), CardStyle::Open);
        assert_eq!(card_style(&servo, &StatusValue::Cerrado), CardStyle::Closed);
        assert_eq!(card_style(&servo, &StatusValue::On), CardStyle::Closed);
        assert_eq!(card_style(&led, &StatusValue::On), CardStyle::On);
        assert_eq!(card_style(&led, &StatusValue::Abierto), CardStyle::Off);
        assert_eq!(
            card_style(&DeviceType::Lcd, &StatusValue::Other("??".into())),
            CardStyle::Off
        );
    }

    #[test]
    fn test_banner() {
        let banner = render_banner(&AuthorizationFlag {
            is_authorized: true,
            current_user: "Ana".to_string(),
        });
        assert!(banner.authorized);
        assert!(banner.text.contains("Ana"));
        let banner = render_banner(&AuthorizationFlag::default());
        assert_eq!(banner.css_class, "unauthorized");
    }
}
