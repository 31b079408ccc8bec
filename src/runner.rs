use std::path::Path;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::{
    Dashboard, DashboardConfig, DashboardError, DashboardView, FormInput, LogPanelId,
    MemoryStore, RemoteStore, StoreBackendConfig, StoreError, StoreEvent, StorePath,
    SubscriptionHandle, UserPrompt,
};
#[cfg(feature = "mqtt")]
use crate::{run_mqtt_store, MqttStoreEvent, MqttStoreHandle};

/// What the user did on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIntent {
    ClickCard(String),
    ClickEdit(String),
    OpenCreate,
    Input(FormInput),
    Save,
    Delete,
    Cancel,
}

crate::define_event_multiplexer! {
    #[derive(Debug)]
    pub enum DashboardEvent {
        Devices(StoreEvent) => devices,
        Status(StoreEvent) => status,
        Gestures(StoreEvent) => gestures,
        Pins(StoreEvent) => pins,
        Log((LogPanelId, StoreEvent)) => logs,
        Intent(UserIntent) => intents,
    }
}

/// Running dashboard. Dropping it stops the event loop like [`DashboardHandle::stop`]
/// does, without waiting for the loop to finish.
pub struct DashboardHandle {
    intents: mpsc::UnboundedSender<UserIntent>,
    views: watch::Receiver<DashboardView>,
    stop: CancellationToken,
    handle: JoinHandle<()>,
    _stop_on_drop: DropGuard,
}

impl DashboardHandle {
    pub fn send(&self, intent: UserIntent) -> Result<(), DashboardError> {
        self.intents
            .send(intent)
            .map_err(|_| DashboardError::Store(StoreError::ChannelClosed))
    }

    /// Receiver that sees every newly rendered view.
    pub fn views(&self) -> watch::Receiver<DashboardView> {
        self.views.clone()
    }

    pub fn current_view(&self) -> DashboardView {
        self.views.borrow().clone()
    }

    /// Stops the event loop and cancels all store subscriptions.
    pub async fn stop(self) -> Result<(), DashboardError> {
        self.stop.cancel();
        self.handle.await.map_err(StoreError::from)?;
        Ok(())
    }
}

/// Subscribes to every collection the dashboard shows and runs the view in
/// one task: store notifications and user intents are handled one at a time,
/// each followed by publishing the new view.
pub async fn run_dashboard<S: RemoteStore, P: UserPrompt>(
    store: S,
    prompt: P,
    config: &DashboardConfig,
) -> Result<DashboardHandle, DashboardError> {
    let mut dashboard = Dashboard::new(store.clone(), prompt, config.logs);
    let mut subscriptions: Vec<SubscriptionHandle> = Vec::new();

    let devices = store.subscribe_value(StorePath::Devices).await?;
    let status = store.subscribe_value(StorePath::Status).await?;
    let gestures = store.subscribe_value(StorePath::AvailableGestures).await?;
    let pins = store.subscribe_value(StorePath::AvailablePins).await?;
    let [devices, status, gestures, pins] = [devices, status, gestures, pins].map(|sub| {
        subscriptions.push(sub.handle);
        sub.events
    });

    let (log_sender, logs) = mpsc::unbounded_channel();
    for panel in dashboard.log_panels() {
        let id = panel.id();
        let mut subscription = store
            .subscribe_children(StorePath::Logs, panel.query())
            .await?;
        subscriptions.push(subscription.handle.clone());
        let sender = log_sender.clone();
        tokio::task::spawn(async move {
            while let Some(event) = subscription.recv().await {
                if sender.send((id, event)).is_err() {
                    break;
                }
            }
            log::trace!("Log forwarding for {:?} ended", id);
        });
    }
    drop(log_sender);

    let (intent_sender, intents) = mpsc::unbounded_channel();
    let (view_sender, views) = watch::channel(dashboard.view().clone());
    let stop = CancellationToken::new();
    let stop_token = stop.clone();
    let idle_timeout = config.idle_timeout();
    let mut mux = DashboardEventMultiPlexer::new(devices, status, gestures, pins, logs, intents);

    let handle = tokio::task::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = stop_token.cancelled() => {
                    log::trace!("Received stop signal. Exiting...");
                    break;
                }
                event = mux.next(idle_timeout) => event,
            };
            match event {
                DashboardEvent::Devices(event)
                | DashboardEvent::Status(event)
                | DashboardEvent::Gestures(event)
                | DashboardEvent::Pins(event) => dashboard.handle_store_event(event),
                DashboardEvent::Log((panel, event)) => dashboard.handle_log_event(panel, event),
                DashboardEvent::Intent(intent) => handle_intent(&mut dashboard, intent),
                DashboardEvent::Idle => continue,
                DashboardEvent::Closed => {
                    log::trace!("All dashboard sources closed");
                    break;
                }
            }
            view_sender.send_replace(dashboard.view().clone());
        }
        for subscription in subscriptions {
            subscription.cancel();
        }
        log::trace!("Exiting dashboard loop...");
    });

    Ok(DashboardHandle {
        intents: intent_sender,
        views,
        _stop_on_drop: stop.clone().drop_guard(),
        stop,
        handle,
    })
}

/// The store backend a configured dashboard runs on.
pub enum StoreBackend {
    Memory(MemoryStore),
    #[cfg(feature = "mqtt")]
    Mqtt {
        handle: MqttStoreHandle,
        /// Connection state changes of the broker connection.
        events: mpsc::Receiver<MqttStoreEvent>,
    },
}

impl StoreBackend {
    pub async fn stop(self) -> Result<(), StoreError> {
        match self {
            StoreBackend::Memory(_) => Ok(()),
            #[cfg(feature = "mqtt")]
            StoreBackend::Mqtt { handle, .. } => handle.stop().await,
        }
    }
}

/// Starts the configured store backend and a dashboard on top of it.
pub async fn run_from_config<P: UserPrompt>(
    config: &DashboardConfig,
    prompt: P,
) -> Result<(DashboardHandle, StoreBackend), DashboardError> {
    match &config.store {
        StoreBackendConfig::Memory => {
            let store = MemoryStore::new();
            let dashboard = run_dashboard(store.clone(), prompt, config).await?;
            Ok((dashboard, StoreBackend::Memory(store)))
        }
        #[cfg(feature = "mqtt")]
        StoreBackendConfig::Mqtt(mqtt_config) => {
            let (handle, store, events) = run_mqtt_store(mqtt_config)?;
            match run_dashboard(store, prompt, config).await {
                Ok(dashboard) => Ok((dashboard, StoreBackend::Mqtt { handle, events })),
                Err(err) => {
                    if let Err(stop_err) = handle.stop().await {
                        log::warn!("Error stopping mqtt store: {}", stop_err);
                    }
                    Err(err)
                }
            }
        }
    }
}

/// Like [`run_from_config`], reading the config from a yaml file.
pub async fn run_from_config_file<P: UserPrompt>(
    path: impl AsRef<Path>,
    prompt: P,
) -> Result<(DashboardHandle, StoreBackend), DashboardError> {
    let config = DashboardConfig::from_file(path)?;
    run_from_config(&config, prompt).await
}

fn handle_intent<S: RemoteStore, P: UserPrompt>(
    dashboard: &mut Dashboard<S, P>,
    intent: UserIntent,
) {
    let result = match &intent {
        UserIntent::ClickCard(device_id) => {
            // the write runs on its own, its result is not awaited
            if dashboard.click_card(device_id).is_none() {
                log::debug!("No command for card [{}]", device_id);
            }
            Ok(())
        }
        UserIntent::ClickEdit(device_id) => dashboard.click_edit(device_id),
        UserIntent::OpenCreate => {
            dashboard.open_create();
            Ok(())
        }
        UserIntent::Input(input) => dashboard.input(input.clone()),
        UserIntent::Save => dashboard.save_editor().map(|_| ()),
        UserIntent::Delete => dashboard.delete_editing().map(|_| ()),
        UserIntent::Cancel => {
            dashboard.cancel_editor();
            Ok(())
        }
    };
    if let Err(err) = result {
        log::warn!("Ignoring {:?}: {}", intent, err);
    }
}
