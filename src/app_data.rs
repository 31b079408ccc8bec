use serde_json::Value;

use crate::{
    AuthorizationFlag, DeviceRegistry, GestureCatalog, PinCatalog, StatusTable, StorePath,
};

/// Collection a value notification replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotUpdate {
    Devices,
    Status,
    Gestures,
    Pins,
    Ignored,
}

/// In-memory copy of the remote collections the dashboard renders.
///
/// Starts empty; each notification replaces one collection as a whole,
/// there is no merging with what was there before.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppData {
    pub devices: DeviceRegistry,
    pub status: StatusTable,
    pub authorization: AuthorizationFlag,
    pub gestures: GestureCatalog,
    pub pins: PinCatalog,
}

impl AppData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, path: &StorePath, value: Option<&Value>) -> SnapshotUpdate {
        match path {
            StorePath::Devices => {
                self.devices = DeviceRegistry::from_snapshot(value);
                log::debug!("Devices replaced ({} devices)", self.devices.len());
                SnapshotUpdate::Devices
            }
            StorePath::Status => {
                let (status, authorization) = StatusTable::from_snapshot(value);
                self.status = status;
                self.authorization = authorization;
                log::debug!("Status replaced ({} entries)", self.status.len());
                SnapshotUpdate::Status
            }
            StorePath::AvailableGestures => {
                self.gestures = GestureCatalog::from_snapshot(value);
                SnapshotUpdate::Gestures
            }
            StorePath::AvailablePins => {
                self.pins = PinCatalog::from_snapshot(value);
                SnapshotUpdate::Pins
            }
            other => {
                log::debug!("No snapshot kept for [{}]", other);
                SnapshotUpdate::Ignored
            }
        }
    }
}
