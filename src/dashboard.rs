use thiserror::Error;
use tokio::task::JoinHandle;

use crate::{
    render_banner, render_cards, render_editor_options, AppData, Banner, Command, ConfigError,
    DeviceCard, Editor, EditorError, EditorOptions, EditorView, FormInput, LogEntry, LogPanel,
    LogPanelId, LogPanelView, LogViewMode, RemoteStore, SnapshotUpdate, StoreError, StoreEvent,
    StorePath, StoreWrite,
};

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Editor error: {0}")]
    Editor(#[from] EditorError),
}

/// Blocking user dialogs, the equivalent of the browser's alert and confirm.
pub trait UserPrompt: Send + Sync + 'static {
    fn alert(&self, message: &str);
    fn confirm(&self, message: &str) -> bool;
}

/// A write running in the background.
///
/// Dropping it leaves the write running and its result unobserved, which is
/// how the dashboard issues all writes. Callers that want to know the outcome
/// await [`PendingWrite::confirm`].
#[derive(Debug)]
pub struct PendingWrite {
    handle: JoinHandle<Result<(), StoreError>>,
}

impl PendingWrite {
    /// Applies the writes one after the other. They are independent: a failed
    /// write is logged and the remaining ones are still issued; the first
    /// error is reported.
    pub fn spawn<S: RemoteStore>(store: S, writes: Vec<StoreWrite>) -> Self {
        let handle = tokio::task::spawn(async move {
            let mut first_error = None;
            for write in writes {
                let path = write.path().clone();
                if let Err(err) = write.apply(&store).await {
                    log::warn!("Write to [{}] failed: {}", path, err);
                    first_error.get_or_insert(err);
                }
            }
            first_error.map_or(Ok(()), Err)
        });
        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn confirm(self) -> Result<(), StoreError> {
        self.handle.await?
    }
}

/// Everything the page shows, derived from [`AppData`] and the log panels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardView {
    pub banner: Banner,
    pub cards: Vec<DeviceCard>,
    pub log_panels: Vec<LogPanelView>,
    pub editor: Option<EditorView>,
    pub editor_options: EditorOptions,
}

/// The synchronized view: snapshot, rendered view, device editor and the
/// store the user's actions are written to.
pub struct Dashboard<S: RemoteStore, P: UserPrompt> {
    store: S,
    prompt: P,
    data: AppData,
    editor: Editor,
    log_panels: Vec<LogPanel>,
    view: DashboardView,
}

impl<S: RemoteStore, P: UserPrompt> Dashboard<S, P> {
    pub fn new(store: S, prompt: P, log_mode: LogViewMode) -> Self {
        let data = AppData::new();
        let log_panels = log_mode.panels();
        let view = DashboardView {
            banner: render_banner(&data.authorization),
            cards: render_cards(&data),
            log_panels: log_panels.iter().map(LogPanel::view).collect(),
            editor: None,
            editor_options: render_editor_options(&data),
        };
        Self {
            store,
            prompt,
            data,
            editor: Editor::Closed,
            log_panels,
            view,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn data(&self) -> &AppData {
        &self.data
    }

    pub fn view(&self) -> &DashboardView {
        &self.view
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn log_panels(&self) -> &[LogPanel] {
        &self.log_panels
    }

    /// Replaces the snapshot of the notified collection and re-renders the
    /// regions that depend on it. Log notifications go to
    /// [`Dashboard::handle_log_event`].
    pub fn handle_store_event(&mut self, event: StoreEvent) {
        match event {
            StoreEvent::Value { path, value } => {
                match self.data.replace(&path, value.as_ref()) {
                    SnapshotUpdate::Devices => self.render_cards(),
                    SnapshotUpdate::Status => {
                        self.render_cards();
                        self.view.banner = render_banner(&self.data.authorization);
                    }
                    SnapshotUpdate::Gestures | SnapshotUpdate::Pins => {
                        self.view.editor_options = render_editor_options(&self.data);
                    }
                    SnapshotUpdate::Ignored => {}
                }
            }
            StoreEvent::ChildAdded { path, key, .. } => {
                log::debug!("Unrouted child [{}/{}]", path, key);
            }
        }
    }

    /// Adds a newly appended log entry to the panel whose subscription saw it.
    pub fn handle_log_event(&mut self, panel: LogPanelId, event: StoreEvent) {
        let StoreEvent::ChildAdded { key, value, .. } = event else {
            return;
        };
        let entry = match serde_json::from_value::<LogEntry>(value) {
            Ok(entry) => entry,
            Err(err) => {
                log::warn!("Skipping malformed log entry [{}]: {}", key, err);
                return;
            }
        };
        if let Some(index) = self.log_panels.iter().position(|p| p.id() == panel) {
            if self.log_panels[index].prepend(key, &entry) {
                self.view.log_panels[index] = self.log_panels[index].view();
            }
        }
    }

    fn render_cards(&mut self) {
        self.view.cards = render_cards(&self.data);
    }

    fn render_editor(&mut self) {
        self.view.editor = self.editor.view();
    }

    /// Click on a card body: appends one toggle command for the device's
    /// status key. The card itself changes only once the actuator updates
    /// the status entry.
    pub fn click_card(&self, device_id: &str) -> Option<PendingWrite> {
        let device = self.data.devices.get(device_id)?;
        if !device.has_state_key() {
            return None;
        }
        let value = match Command::toggle(device.state_key.as_str()).to_value() {
            Ok(value) => value,
            Err(err) => {
                log::warn!("Cannot encode command for [{}]: {}", device.state_key, err);
                return None;
            }
        };
        log::debug!("Command for [{}]", device.state_key);
        Some(PendingWrite::spawn(
            self.store.clone(),
            vec![StoreWrite::Push {
                path: StorePath::Commands,
                value,
            }],
        ))
    }

    /// Click on a card's edit control: opens the editor, never sends a command.
    pub fn click_edit(&mut self, device_id: &str) -> Result<(), EditorError> {
        let device = self
            .data
            .devices
            .get(device_id)
            .ok_or_else(|| EditorError::UnknownDevice(device_id.to_owned()))?;
        self.editor.open_edit(device);
        self.render_editor();
        Ok(())
    }

    pub fn open_create(&mut self) {
        let default_pin = self.data.pins.first().map(|option| option.pin);
        self.editor.open_create(default_pin);
        self.render_editor();
    }

    pub fn input(&mut self, input: FormInput) -> Result<(), EditorError> {
        self.editor.session_mut()?.apply(input)?;
        self.render_editor();
        Ok(())
    }

    pub fn cancel_editor(&mut self) {
        self.editor.close();
        self.render_editor();
    }

    /// Saves the open editor. A missing name or status key is reported with
    /// an alert, nothing is written and the editor stays open.
    pub fn save_editor(&mut self) -> Result<Option<PendingWrite>, EditorError> {
        let session = self.editor.session().ok_or(EditorError::NotOpen)?;
        let plan = match session.save_plan() {
            Ok(plan) => plan,
            Err(err) => {
                self.prompt.alert(&err.to_string());
                return Ok(None);
            }
        };
        self.editor.close();
        self.render_editor();
        Ok(Some(PendingWrite::spawn(self.store.clone(), plan)))
    }

    /// Deletes the edited device and its status entry after the user confirms.
    pub fn delete_editing(&mut self) -> Result<Option<PendingWrite>, EditorError> {
        let session = self.editor.session().ok_or(EditorError::NotOpen)?;
        let plan = session.delete_plan()?;
        let name = session.form().name.clone();
        if !self
            .prompt
            .confirm(&format!("¿Eliminar el dispositivo \"{}\"?", name))
        {
            return Ok(None);
        }
        self.editor.close();
        self.render_editor();
        Ok(Some(PendingWrite::spawn(self.store.clone(), plan)))
    }
}
