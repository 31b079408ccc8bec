use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
    Device, DeviceParams, DeviceType, LcdParams, RemoteStore, ServoParams, StatusValue,
    StoreError, StorePath, GESTURE_NOT_ASSIGNED,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Nombre y clave de estado son obligatorios (falta el nombre)")]
    MissingName,
    #[error("Nombre y clave de estado son obligatorios (falta la clave de estado)")]
    MissingStateKey,
    #[error("La clave de estado \"{0}\" no puede contener / . # $ [ ] +")]
    InvalidStateKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditorError {
    #[error("The device editor is not open")]
    NotOpen,
    #[error("The state key of an existing device cannot be changed")]
    StateKeyLocked,
    #[error("Only existing devices can be deleted")]
    NothingToDelete,
    #[error("Unknown device [{0}]")]
    UnknownDevice(String),
}

/// A single independent write to the remote store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreWrite {
    Set {
        path: StorePath,
        value: Value,
    },
    Update {
        path: StorePath,
        fields: Map<String, Value>,
    },
    Remove {
        path: StorePath,
    },
    Push {
        path: StorePath,
        value: Value,
    },
}

impl StoreWrite {
    pub fn path(&self) -> &StorePath {
        match self {
            StoreWrite::Set { path, .. }
            | StoreWrite::Update { path, .. }
            | StoreWrite::Remove { path }
            | StoreWrite::Push { path, .. } => path,
        }
    }

    pub async fn apply<S: RemoteStore>(self, store: &S) -> Result<(), StoreError> {
        match self {
            StoreWrite::Set { path, value } => store.set(path, value).await,
            StoreWrite::Update { path, fields } => store.update(path, fields).await,
            StoreWrite::Remove { path } => store.remove(path).await,
            StoreWrite::Push { path, value } => store.push(path, value).await.map(|_| ()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorMode {
    Create,
    /// The state key is fixed once a device exists.
    Edit {
        device_id: String,
        state_key: String,
    },
}

/// Which type specific parameter panel the modal shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamsPanel {
    Servo,
    Lcd,
    None,
}

impl From<&DeviceType> for ParamsPanel {
    fn from(device_type: &DeviceType) -> Self {
        match device_type {
            DeviceType::Servo => ParamsPanel::Servo,
            DeviceType::Lcd => ParamsPanel::Lcd,
            _ => ParamsPanel::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormInput {
    Name(String),
    StateKey(String),
    DeviceType(DeviceType),
    Pin(u32),
    Gesture(Option<String>),
    AngleOpen(i32),
    AngleClosed(i32),
    I2cAddress(String),
    Line1On(String),
    Line2On(String),
    Line1Off(String),
    Line2Off(String),
}

/// Current values of the modal inputs.
///
/// Both parameter panels keep their values while hidden, only the one
/// matching the selected type is saved.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EditorForm {
    pub name: String,
    state_key: String,
    pub device_type: DeviceType,
    pub pin: u32,
    pub gesture: Option<String>,
    pub servo: ServoParams,
    pub lcd: LcdParams,
}

impl EditorForm {
    pub fn for_device(device: &Device) -> Self {
        let mut form = Self {
            name: device.name.clone(),
            state_key: device.state_key.clone(),
            device_type: device.device_type.clone(),
            pin: device.pin,
            gesture: device.gesture.clone(),
            ..Default::default()
        };
        match &device.params {
            DeviceParams::Servo(servo) => form.servo = servo.clone(),
            DeviceParams::Lcd(lcd) => form.lcd = lcd.clone(),
            DeviceParams::None => {}
        }
        form
    }

    pub fn state_key(&self) -> &str {
        &self.state_key
    }

    pub fn params(&self) -> DeviceParams {
        match self.device_type {
            DeviceType::Servo => DeviceParams::Servo(self.servo.clone()),
            DeviceType::Lcd => DeviceParams::Lcd(self.lcd.clone()),
            _ => DeviceParams::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorSession {
    mode: EditorMode,
    form: EditorForm,
}

impl EditorSession {
    pub fn create(default_pin: Option<u32>) -> Self {
        Self {
            mode: EditorMode::Create,
            form: EditorForm {
                pin: default_pin.unwrap_or_default(),
                ..Default::default()
            },
        }
    }

    pub fn edit(device: &Device) -> Self {
        Self {
            mode: EditorMode::Edit {
                device_id: device.id.clone(),
                state_key: device.state_key.clone(),
            },
            form: EditorForm::for_device(device),
        }
    }

    pub fn mode(&self) -> &EditorMode {
        &self.mode
    }

    pub fn form(&self) -> &EditorForm {
        &self.form
    }

    pub fn state_key_editable(&self) -> bool {
        matches!(self.mode, EditorMode::Create)
    }

    pub fn visible_panel(&self) -> ParamsPanel {
        ParamsPanel::from(&self.form.device_type)
    }

    pub fn apply(&mut self, input: FormInput) -> Result<(), EditorError> {
        let form = &mut self.form;
        match input {
            FormInput::Name(name) => form.name = name,
            FormInput::StateKey(key) => {
                if !matches!(self.mode, EditorMode::Create) {
                    return Err(EditorError::StateKeyLocked);
                }
                form.state_key = key;
            }
            FormInput::DeviceType(device_type) => form.device_type = device_type,
            FormInput::Pin(pin) => form.pin = pin,
            FormInput::Gesture(gesture) => {
                form.gesture = gesture.filter(|g| !g.is_empty() && g != GESTURE_NOT_ASSIGNED)
            }
            FormInput::AngleOpen(angle) => form.servo.angle_open = angle,
            FormInput::AngleClosed(angle) => form.servo.angle_closed = angle,
            FormInput::I2cAddress(address) => form.lcd.i2c_address = address,
            FormInput::Line1On(line) => form.lcd.line1_on = line,
            FormInput::Line2On(line) => form.lcd.line2_on = line,
            FormInput::Line1Off(line) => form.lcd.line1_off = line,
            FormInput::Line2Off(line) => form.lcd.line2_off = line,
        }
        Ok(())
    }

    /// Status key the saved record will carry: the original one when editing.
    pub fn effective_state_key(&self) -> &str {
        match &self.mode {
            EditorMode::Create => self.form.state_key.trim(),
            EditorMode::Edit { state_key, .. } => state_key,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.form.name.trim().is_empty() {
            return Err(ValidationError::MissingName);
        }
        let state_key = self.effective_state_key();
        if state_key.is_empty() {
            return Err(ValidationError::MissingStateKey);
        }
        // existing keys are kept as they are
        if matches!(self.mode, EditorMode::Create)
            && StorePath::StatusEntry(state_key.to_owned()).validate().is_err()
        {
            return Err(ValidationError::InvalidStateKey(state_key.to_owned()));
        }
        Ok(())
    }

    fn record_fields(&self) -> Map<String, Value> {
        let form = &self.form;
        let params = form.params();
        let mut fields = Map::new();
        fields.insert("name".into(), Value::from(form.name.trim()));
        fields.insert("state_key".into(), Value::from(self.effective_state_key()));
        fields.insert("type".into(), Value::from(form.device_type.as_str()));
        fields.insert("pin".into(), Value::from(form.pin));
        fields.insert(
            "gesture".into(),
            Value::from(form.gesture.as_deref().unwrap_or(GESTURE_NOT_ASSIGNED)),
        );
        fields.insert("params".into(), params.to_value());
        let i2c_address = match &params {
            DeviceParams::Lcd(lcd) => Value::from(lcd.i2c_address.as_str()),
            _ => Value::Null,
        };
        fields.insert("i2c_address".into(), i2c_address);
        fields
    }

    /// Writes that persist the form.
    ///
    /// Creating pushes a new device record and sets its status entry to the
    /// closed/off value of its type. Editing patches the existing record.
    pub fn save_plan(&self) -> Result<Vec<StoreWrite>, ValidationError> {
        self.validate()?;
        let mut fields = self.record_fields();
        let plan = match &self.mode {
            EditorMode::Create => {
                fields.retain(|_, value| !value.is_null());
                let default_state = StatusValue::default_for(&self.form.device_type);
                vec![
                    StoreWrite::Push {
                        path: StorePath::Devices,
                        value: Value::Object(fields),
                    },
                    StoreWrite::Set {
                        path: StorePath::StatusEntry(self.effective_state_key().to_owned()),
                        value: Value::from(default_state.as_str()),
                    },
                ]
            }
            EditorMode::Edit { device_id, .. } => vec![StoreWrite::Update {
                path: StorePath::Device(device_id.clone()),
                fields,
            }],
        };
        Ok(plan)
    }

    /// Writes that remove the edited device and its status entry.
    pub fn delete_plan(&self) -> Result<Vec<StoreWrite>, EditorError> {
        let EditorMode::Edit {
            device_id,
            state_key,
        } = &self.mode
        else {
            return Err(EditorError::NothingToDelete);
        };
        let mut plan = vec![StoreWrite::Remove {
            path: StorePath::Device(device_id.clone()),
        }];
        // an empty key would address the whole status collection
        if !state_key.is_empty() {
            plan.push(StoreWrite::Remove {
                path: StorePath::StatusEntry(state_key.clone()),
            });
        }
        Ok(plan)
    }

    pub fn view(&self) -> EditorView {
        EditorView {
            title: match self.mode {
                EditorMode::Create => "Nuevo dispositivo",
                EditorMode::Edit { .. } => "Editar dispositivo",
            },
            form: self.form.clone(),
            state_key_enabled: self.state_key_editable(),
            panel: self.visible_panel(),
            can_delete: !self.state_key_editable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorView {
    pub title: &'static str,
    pub form: EditorForm,
    pub state_key_enabled: bool,
    pub panel: ParamsPanel,
    pub can_delete: bool,
}

/// The device modal: closed, or open on one device or a blank template.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Editor {
    #[default]
    Closed,
    Open(EditorSession),
}

impl Editor {
    pub fn open_create(&mut self, default_pin: Option<u32>) {
        log::debug!("Editor: create");
        *self = Editor::Open(EditorSession::create(default_pin));
    }

    pub fn open_edit(&mut self, device: &Device) {
        log::debug!("Editor: edit [{}]", device.id);
        *self = Editor::Open(EditorSession::edit(device));
    }

    pub fn close(&mut self) {
        *self = Editor::Closed;
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Editor::Open(_))
    }

    pub fn session(&self) -> Option<&EditorSession> {
        match self {
            Editor::Open(session) => Some(session),
            Editor::Closed => None,
        }
    }

    pub fn session_mut(&mut self) -> Result<&mut EditorSession, EditorError> {
        match self {
            Editor::Open(session) => Ok(session),
            Editor::Closed => Err(EditorError::NotOpen),
        }
    }

    pub fn view(&self) -> Option<EditorView> {
        self.session().map(EditorSession::view)
    }
}
